// ============================================
// Coords - Позиции и боксы в пространстве вокселей
// ============================================

use std::ops::{Add, Sub};

use serde::{Deserialize, Serialize};
use ultraviolet::Vec3;

/// Целочисленная позиция сэмпла в мире (единица = шаг LOD 0)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoxelPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl VoxelPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    #[inline]
    pub fn to_vec3(self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }

    #[inline]
    pub fn to_array(self) -> [f32; 3] {
        [self.x as f32, self.y as f32, self.z as f32]
    }

    /// Позиция, содержащая точку (floor)
    pub fn floor(p: Vec3) -> Self {
        Self::new(p.x.floor() as i32, p.y.floor() as i32, p.z.floor() as i32)
    }
}

impl Add for VoxelPos {
    type Output = VoxelPos;
    fn add(self, o: VoxelPos) -> VoxelPos {
        VoxelPos::new(self.x + o.x, self.y + o.y, self.z + o.z)
    }
}

impl Sub for VoxelPos {
    type Output = VoxelPos;
    fn sub(self, o: VoxelPos) -> VoxelPos {
        VoxelPos::new(self.x - o.x, self.y - o.y, self.z - o.z)
    }
}

/// Выровненный по осям бокс: min включительно, max исключительно
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoxelBox {
    pub min: VoxelPos,
    pub max: VoxelPos,
}

impl VoxelBox {
    pub const fn new(min: VoxelPos, max: VoxelPos) -> Self {
        Self { min, max }
    }

    /// Наименьший целочисленный бокс, покрывающий float-бокс
    pub fn enclosing(min: Vec3, max: Vec3) -> Self {
        Self {
            min: VoxelPos::new(min.x.floor() as i32, min.y.floor() as i32, min.z.floor() as i32),
            max: VoxelPos::new(
                max.x.ceil() as i32 + 1,
                max.y.ceil() as i32 + 1,
                max.z.ceil() as i32 + 1,
            ),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min.x >= self.max.x || self.min.y >= self.max.y || self.min.z >= self.max.z
    }

    #[inline]
    pub fn contains(&self, p: VoxelPos) -> bool {
        p.x >= self.min.x && p.x < self.max.x
            && p.y >= self.min.y && p.y < self.max.y
            && p.z >= self.min.z && p.z < self.max.z
    }

    pub fn intersects(&self, other: &VoxelBox) -> bool {
        self.min.x < other.max.x && other.min.x < self.max.x
            && self.min.y < other.max.y && other.min.y < self.max.y
            && self.min.z < other.max.z && other.min.z < self.max.z
    }

    /// Расширить на `by` во все стороны
    pub fn expand(&self, by: i32) -> Self {
        Self {
            min: VoxelPos::new(self.min.x - by, self.min.y - by, self.min.z - by),
            max: VoxelPos::new(self.max.x + by, self.max.y + by, self.max.z + by),
        }
    }

    pub fn size(&self) -> VoxelPos {
        self.max - self.min
    }

    pub fn center(&self) -> Vec3 {
        (self.min.to_vec3() + self.max.to_vec3()) * 0.5
    }

    /// Квадрат расстояния от точки до бокса (0 внутри)
    pub fn distance_squared(&self, p: Vec3) -> f32 {
        let axis = |v: f32, lo: i32, hi: i32| -> f32 {
            let lo = lo as f32;
            let hi = hi as f32;
            if v < lo { lo - v } else if v > hi { v - hi } else { 0.0 }
        };
        let dx = axis(p.x, self.min.x, self.max.x);
        let dy = axis(p.y, self.min.y, self.max.y);
        let dz = axis(p.z, self.min.z, self.max.z);
        dx * dx + dy * dy + dz * dz
    }
}
