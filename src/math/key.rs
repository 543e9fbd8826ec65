// ============================================
// Chunk Key - Идентификатор чанка (позиция + LOD)
// ============================================
// Чанк LOD l покрывает 16 << l единиц, шаг сэмплов 1 << l.
// Ключ (x,y,z) - индекс чанка в сетке своего LOD.

use serde::{Deserialize, Serialize};
use ultraviolet::Vec3;

use super::coords::{VoxelBox, VoxelPos};
use super::direction::Direction;
use super::CHUNK_SIZE;

#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkKey {
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub lod: u8,
}

impl ChunkKey {
    pub const fn new(x: i32, y: i32, z: i32, lod: u8) -> Self {
        Self { x, y, z, lod }
    }

    /// Шаг между сэмплами в единицах LOD 0
    #[inline]
    pub fn step(&self) -> i32 {
        1 << self.lod
    }

    /// Длина ребра чанка в единицах LOD 0
    #[inline]
    pub fn size(&self) -> i32 {
        CHUNK_SIZE << self.lod
    }

    #[inline]
    pub fn origin(&self) -> VoxelPos {
        let s = self.size();
        VoxelPos::new(self.x * s, self.y * s, self.z * s)
    }

    /// Область клеток чанка (без дублированной грани сэмплов)
    pub fn bounds(&self) -> VoxelBox {
        let o = self.origin();
        let s = self.size();
        VoxelBox::new(o, VoxelPos::new(o.x + s, o.y + s, o.z + s))
    }

    /// Область сэмплов: включает общую грань с соседом +1
    pub fn sample_bounds(&self) -> VoxelBox {
        self.bounds().grow_max(1)
    }

    pub fn center(&self) -> Vec3 {
        let half = self.size() as f32 * 0.5;
        self.origin().to_vec3() + Vec3::broadcast(half)
    }

    /// Мировая позиция сэмпла (i,j,k) в 0..=16
    #[inline]
    pub fn sample_position(&self, i: i32, j: i32, k: i32) -> VoxelPos {
        let o = self.origin();
        let st = self.step();
        VoxelPos::new(o.x + i * st, o.y + j * st, o.z + k * st)
    }

    /// Чанк LOD `lod`, содержащий позицию
    pub fn containing(pos: VoxelPos, lod: u8) -> Self {
        let s = CHUNK_SIZE << lod;
        Self::new(pos.x.div_euclid(s), pos.y.div_euclid(s), pos.z.div_euclid(s), lod)
    }

    /// Родитель на LOD+1
    pub fn parent(&self) -> Self {
        Self::new(self.x >> 1, self.y >> 1, self.z >> 1, self.lod + 1)
    }

    /// Предок на уровне `lod` (>= self.lod)
    pub fn ancestor(&self, lod: u8) -> Self {
        let shift = lod.saturating_sub(self.lod) as u32;
        Self::new(self.x >> shift, self.y >> shift, self.z >> shift, lod.max(self.lod))
    }

    /// Индекс ребёнка внутри родителя: z<<2 | y<<1 | x
    #[inline]
    pub fn child_slot(&self) -> usize {
        (((self.z & 1) << 2) | ((self.y & 1) << 1) | (self.x & 1)) as usize
    }

    /// 8 детей на LOD-1, порядок совпадает с child_slot
    pub fn children(&self) -> [ChunkKey; 8] {
        let lod = self.lod.saturating_sub(1);
        let mut out = [*self; 8];
        for (i, child) in out.iter_mut().enumerate() {
            let i = i as i32;
            *child = ChunkKey::new(
                self.x * 2 + (i & 1),
                self.y * 2 + ((i >> 1) & 1),
                self.z * 2 + ((i >> 2) & 1),
                lod,
            );
        }
        out
    }

    /// Сосед того же LOD
    #[inline]
    pub fn offset(&self, dir: Direction) -> Self {
        Self::new(self.x + dir.dx, self.y + dir.dy, self.z + dir.dz, self.lod)
    }

    /// Является ли `self` потомком (или равен) `other`
    pub fn is_within(&self, other: &ChunkKey) -> bool {
        self.lod <= other.lod && self.ancestor(other.lod) == *other
    }

    pub fn distance_to(&self, p: Vec3) -> f32 {
        (self.center() - p).mag()
    }
}

impl VoxelBox {
    /// Сдвинуть max на `by` (для области сэмплов)
    pub fn grow_max(&self, by: i32) -> VoxelBox {
        VoxelBox::new(
            self.min,
            VoxelPos::new(self.max.x + by, self.max.y + by, self.max.z + by),
        )
    }
}
