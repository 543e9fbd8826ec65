// ============================================
// Basic Generators - Пустой мир, плоскость, планета
// ============================================

use ultraviolet::Vec3;

use crate::math::{VoxelBox, SAMPLE_COUNT};
use crate::voxel::{normalized_density, Voxel};

use super::{sample_grid, GeneratorError, WorldGenerator};

/// Только воздух
pub struct EmptyGenerator;

impl WorldGenerator for EmptyGenerator {
    fn sample(&self, _bounds: VoxelBox, _lod: u8) -> Result<Vec<Voxel>, GeneratorError> {
        Ok(vec![Voxel::AIR; SAMPLE_COUNT])
    }
}

/// Плоская земля: твердь ниже `height`
pub struct FlatGenerator {
    pub height: f32,
    pub material: u8,
}

impl WorldGenerator for FlatGenerator {
    fn sample(&self, bounds: VoxelBox, lod: u8) -> Result<Vec<Voxel>, GeneratorError> {
        Ok(sample_grid(bounds, lod, |p, step| {
            Voxel::new(normalized_density(p.y - self.height, step), self.material)
        }))
    }
}

/// Шар (планета)
pub struct SphereGenerator {
    pub center: Vec3,
    pub radius: f32,
    pub material: u8,
}

impl WorldGenerator for SphereGenerator {
    fn sample(&self, bounds: VoxelBox, lod: u8) -> Result<Vec<Voxel>, GeneratorError> {
        Ok(sample_grid(bounds, lod, |p, step| {
            let d = (p - self.center).mag() - self.radius;
            Voxel::new(normalized_density(d, step), self.material)
        }))
    }
}
