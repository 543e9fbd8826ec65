// ============================================
// Voxel - Один сэмпл поля плотности
// ============================================

use serde::{Deserialize, Serialize};

/// Материал воздуха
pub const AIR_MATERIAL: u8 = 0;

/// Сэмпл: плотность (< 0 = твердь) и материал
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Voxel {
    pub density: f32,
    pub material: u8,
}

impl Voxel {
    pub const AIR: Voxel = Voxel { density: 1.0, material: AIR_MATERIAL };

    #[inline]
    pub const fn new(density: f32, material: u8) -> Self {
        Self { density, material }
    }

    #[inline]
    pub const fn solid(material: u8) -> Self {
        Self { density: -1.0, material }
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        self.density < 0.0
    }

    /// Побитовое равенство (для детекции однородности и сравнения реплеев)
    #[inline]
    pub fn same_bits(&self, other: &Voxel) -> bool {
        self.density.to_bits() == other.density.to_bits() && self.material == other.material
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.density.is_finite()
    }
}

impl Default for Voxel {
    fn default() -> Self {
        Voxel::AIR
    }
}

/// Нормализованная плотность из расстояния до поверхности
/// (положительно снаружи). Насыщается на двух шагах сетки.
#[inline]
pub fn normalized_density(distance: f32, step: f32) -> f32 {
    (distance / step).clamp(-2.0, 2.0) * 0.5
}
