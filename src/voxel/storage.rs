// ============================================
// Chunk Storage - Плотное или однородное хранение сэмплов
// ============================================
// Однородный чанк (весь воздух / вся твердь) хранит одно значение
// вместо 4913. Читатели не видят разницы.

use crate::math::{sample_index, SampleShape, SAMPLE_COUNT};

use super::sample::Voxel;
use super::StoreError;

use ndshape::ConstShape;

#[derive(Clone, Debug, PartialEq)]
pub enum ChunkStorage {
    /// Все сэмплы одинаковые
    Uniform(Voxel),
    /// Массив 17^3, x быстрее всех
    Dense(Box<[Voxel]>),
}

impl ChunkStorage {
    pub fn uniform(voxel: Voxel) -> Self {
        ChunkStorage::Uniform(voxel)
    }

    /// Создать из массива сэмплов (длина должна быть 17^3)
    pub fn from_samples(samples: Vec<Voxel>) -> Result<Self, StoreError> {
        if samples.len() != SAMPLE_COUNT {
            return Err(StoreError::InvalidSampleCount {
                expected: SAMPLE_COUNT,
                actual: samples.len(),
            });
        }
        Ok(ChunkStorage::Dense(samples.into_boxed_slice()))
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> Voxel {
        self.get_index(sample_index(x, y, z))
    }

    #[inline]
    pub fn get_index(&self, index: usize) -> Voxel {
        match self {
            ChunkStorage::Uniform(v) => *v,
            ChunkStorage::Dense(samples) => samples.get(index).copied().unwrap_or(Voxel::AIR),
        }
    }

    /// Записать сэмпл. Однородное хранилище разворачивается в плотное.
    pub fn set_index(&mut self, index: usize, voxel: Voxel) {
        if index >= SAMPLE_COUNT {
            return;
        }
        if let ChunkStorage::Uniform(v) = self {
            if v.same_bits(&voxel) {
                return;
            }
            *self = ChunkStorage::Dense(vec![*v; SAMPLE_COUNT].into_boxed_slice());
        }
        if let ChunkStorage::Dense(samples) = self {
            samples[index] = voxel;
        }
    }

    /// Свернуть в Uniform если все сэмплы совпадают. Возвращает true если свернули.
    pub fn compact(&mut self) -> bool {
        let first = match self {
            ChunkStorage::Uniform(_) => return false,
            ChunkStorage::Dense(samples) => match samples.first() {
                Some(v) => *v,
                None => return false,
            },
        };
        let homogeneous = match self {
            ChunkStorage::Dense(samples) => samples.iter().all(|v| v.same_bits(&first)),
            ChunkStorage::Uniform(_) => false,
        };
        if homogeneous {
            *self = ChunkStorage::Uniform(first);
        }
        homogeneous
    }

    #[inline]
    pub fn is_uniform(&self) -> bool {
        matches!(self, ChunkStorage::Uniform(_))
    }

    /// Все сэмплы одного знака: поверхности внутри нет
    pub fn is_sign_uniform(&self) -> bool {
        match self {
            ChunkStorage::Uniform(_) => true,
            ChunkStorage::Dense(samples) => {
                let solid = samples.first().map(|v| v.is_solid()).unwrap_or(false);
                samples.iter().all(|v| v.is_solid() == solid)
            }
        }
    }

    pub fn to_vec(&self) -> Vec<Voxel> {
        match self {
            ChunkStorage::Uniform(v) => vec![*v; SAMPLE_COUNT],
            ChunkStorage::Dense(samples) => samples.to_vec(),
        }
    }

    /// Обход (x, y, z, voxel)
    pub fn for_each(&self, mut f: impl FnMut([u32; 3], Voxel)) {
        for i in 0..SAMPLE_COUNT {
            f(SampleShape::delinearize(i as u32), self.get_index(i));
        }
    }

    pub fn memory_usage(&self) -> usize {
        match self {
            ChunkStorage::Uniform(_) => std::mem::size_of::<Self>(),
            ChunkStorage::Dense(samples) => {
                std::mem::size_of::<Self>() + samples.len() * std::mem::size_of::<Voxel>()
            }
        }
    }
}
