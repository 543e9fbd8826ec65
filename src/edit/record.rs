// ============================================
// Edit Record - Неизменяемая операция над объёмом
// ============================================
//
// Каждая операция - чистая функция (мировая позиция, шаг сетки, старое
// значение) -> новое значение. Реплей в порядке sequence детерминирован
// на любом LOD и на любой копии мира.

use serde::{Deserialize, Serialize};
use ultraviolet::Vec3;

use crate::math::{sample_index, ChunkKey, VoxelBox, CHUNK_SIZE};
use crate::voxel::{normalized_density, ChunkStorage, Voxel};

/// Форма области правки (мировые единицы LOD 0)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum EditShape {
    Sphere { center: [f32; 3], radius: f32 },
    Box { min: [f32; 3], max: [f32; 3] },
    /// Вертикальный цилиндр, center - середина оси
    Cylinder { center: [f32; 3], radius: f32, height: f32 },
}

impl EditShape {
    /// Знаковое расстояние до границы (отрицательно внутри)
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        match *self {
            EditShape::Sphere { center, radius } => (p - Vec3::from(center)).mag() - radius,
            EditShape::Box { min, max } => {
                let min = Vec3::from(min);
                let max = Vec3::from(max);
                let c = (min + max) * 0.5;
                let half = (max - min) * 0.5;
                let q = (p - c).abs() - half;
                let outside = q.max_by_component(Vec3::zero()).mag();
                let inside = q.x.max(q.y).max(q.z).min(0.0);
                outside + inside
            }
            EditShape::Cylinder { center, radius, height } => {
                let c = Vec3::from(center);
                let dx = p.x - c.x;
                let dz = p.z - c.z;
                let radial = (dx * dx + dz * dz).sqrt() - radius;
                let vertical = (p.y - c.y).abs() - height * 0.5;
                let outside = Vec3::new(radial.max(0.0), vertical.max(0.0), 0.0).mag();
                outside + radial.max(vertical).min(0.0)
            }
        }
    }

    /// Ограничивающий бокс формы
    pub fn aabb(&self) -> (Vec3, Vec3) {
        match *self {
            EditShape::Sphere { center, radius } => {
                let c = Vec3::from(center);
                (c - Vec3::broadcast(radius), c + Vec3::broadcast(radius))
            }
            EditShape::Box { min, max } => (Vec3::from(min), Vec3::from(max)),
            EditShape::Cylinder { center, radius, height } => {
                let c = Vec3::from(center);
                let ext = Vec3::new(radius, height * 0.5, radius);
                (c - ext, c + ext)
            }
        }
    }

    /// Целочисленная область влияния с полосой `band` вокруг формы
    pub fn influence_box(&self, band: f32) -> VoxelBox {
        let (min, max) = self.aabb();
        VoxelBox::enclosing(min - Vec3::broadcast(band), max + Vec3::broadcast(band))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum EditOperation {
    /// Добавить твердь (полоса 2 шага сетки вокруг формы)
    Add { material: u8 },
    /// Вырезать твердь
    Remove,
    /// Задать плотность внутри формы
    SetValue { density: f32 },
    /// Перекрасить материал, плотность не трогать
    Paint { material: u8 },
    /// Выровнять поверхность до горизонтальной плоскости
    Flatten { height: f32 },
}

impl EditOperation {
    /// Работает ли операция в полосе вокруг формы (а не только внутри)
    pub fn is_banded(&self) -> bool {
        matches!(self, EditOperation::Add { .. } | EditOperation::Remove)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EditRecord {
    pub sequence: u64,
    pub shape: EditShape,
    pub operation: EditOperation,
    /// 0..=1, 1 = полная замена
    pub strength: f32,
}

#[inline]
fn same_sign(a: f32, b: f32) -> bool {
    (a < 0.0) == (b < 0.0)
}

#[inline]
fn blend(prior: f32, target: f32, strength: f32) -> f32 {
    prior + (target - prior) * strength
}

impl EditRecord {
    pub fn new(sequence: u64, shape: EditShape, operation: EditOperation, strength: f32) -> Self {
        Self { sequence, shape, operation, strength: strength.clamp(0.0, 1.0) }
    }

    /// Ширина полосы вокруг формы для шага сетки `step`
    #[inline]
    pub fn band(&self, step: f32) -> f32 {
        if self.operation.is_banded() { 2.0 * step } else { 0.0 }
    }

    /// Область сэмплов, которые операция может изменить на шаге `step`
    pub fn influence(&self, step: i32) -> VoxelBox {
        self.shape.influence_box(self.band(step as f32))
    }

    /// Новое значение сэмпла
    pub fn apply_sample(&self, p: Vec3, step: f32, prior: Voxel) -> Voxel {
        let d = self.shape.signed_distance(p);
        let s = self.strength;
        match self.operation {
            EditOperation::Add { material } => {
                if d >= 2.0 * step {
                    return prior;
                }
                let target = normalized_density(d, step);
                if !(target < 0.0 || same_sign(target, prior.density)) {
                    return prior;
                }
                let density = blend(prior.density, target, s);
                let material = if density < 0.0 && target < 0.0 { material } else { prior.material };
                Voxel::new(density, material)
            }
            EditOperation::Remove => {
                if d >= 2.0 * step {
                    return prior;
                }
                let target = -normalized_density(d, step);
                if !(target >= 0.0 || same_sign(target, prior.density)) {
                    return prior;
                }
                Voxel::new(blend(prior.density, target, s), prior.material)
            }
            EditOperation::SetValue { density } => {
                if d > 0.0 {
                    return prior;
                }
                Voxel::new(blend(prior.density, density, s), prior.material)
            }
            EditOperation::Paint { material } => {
                if d > 0.0 || s <= 0.0 {
                    return prior;
                }
                Voxel::new(prior.density, material)
            }
            EditOperation::Flatten { height } => {
                if d > 0.0 {
                    return prior;
                }
                let target = normalized_density(p.y - height, step);
                Voxel::new(blend(prior.density, target, s), prior.material)
            }
        }
    }

    /// Применить к сэмплам чанка. Возвращает индексы изменённых сэмплов.
    pub fn apply_to(&self, key: ChunkKey, storage: &mut ChunkStorage) -> Vec<usize> {
        let step = key.step();
        let origin = key.origin();
        let area = self.influence(step);
        let mut changed = Vec::new();

        let range = |lo: i32, hi: i32, o: i32| -> (i32, i32) {
            let first = (-((o - lo).div_euclid(step))).clamp(0, CHUNK_SIZE + 1);
            let last = (hi - 1 - o).div_euclid(step).clamp(-1, CHUNK_SIZE);
            (first, last)
        };
        let (x0, x1) = range(area.min.x, area.max.x, origin.x);
        let (y0, y1) = range(area.min.y, area.max.y, origin.y);
        let (z0, z1) = range(area.min.z, area.max.z, origin.z);

        for k in z0..=z1 {
            for j in y0..=y1 {
                for i in x0..=x1 {
                    let pos = key.sample_position(i, j, k);
                    let idx = sample_index(i as usize, j as usize, k as usize);
                    let prior = storage.get_index(idx);
                    let next = self.apply_sample(pos.to_vec3(), step as f32, prior);
                    if !next.same_bits(&prior) {
                        storage.set_index(idx, next);
                        changed.push(idx);
                    }
                }
            }
        }
        changed
    }
}
