// ============================================
// Generation Module - Генераторы мира и конвейер генерации
// ============================================
// Генератор - чистая функция (область, LOD) -> сетка 17^3 сэмплов.
// Стратегии взаимозаменяемы и выбираются через GeneratorConfig.

mod basic;
mod noise;
mod heightmap;
mod vdb;
mod pipeline;

pub use basic::{EmptyGenerator, FlatGenerator, SphereGenerator};
pub use noise::NoiseGenerator;
pub use heightmap::HeightmapGenerator;
pub use vdb::VdbGenerator;
pub use pipeline::{GeneratedChunk, GenerationPipeline};

use std::sync::Arc;

use ultraviolet::Vec3;

use crate::core::GeneratorConfig;
use crate::math::{ChunkKey, VoxelBox, CHUNK_SAMPLES, SAMPLE_COUNT};
use crate::voxel::Voxel;

/// Ошибка внешнего генератора
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("invalid generator input: {0}")]
    Invalid(String),
    #[error("generator I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("VDB error: {0}")]
    Vdb(String),
}

/// Сбой генерации чанка (чанк уходит в GenerationFailed)
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("generator failed for {key:?}: {source}")]
    Generator {
        key: ChunkKey,
        #[source]
        source: GeneratorError,
    },
    #[error("generator panicked for {key:?}: {message}")]
    Panicked { key: ChunkKey, message: String },
    #[error("generator returned {actual} samples for {key:?}, expected {expected}")]
    InvalidLength { key: ChunkKey, expected: usize, actual: usize },
    #[error("generator returned non-finite sample {index} for {key:?}")]
    NonFinite { key: ChunkKey, index: usize },
    #[error("generation of {0:?} was cancelled")]
    Cancelled(ChunkKey),
}

impl GenerationError {
    pub fn key(&self) -> ChunkKey {
        match self {
            GenerationError::Generator { key, .. }
            | GenerationError::Panicked { key, .. }
            | GenerationError::InvalidLength { key, .. }
            | GenerationError::NonFinite { key, .. }
            | GenerationError::Cancelled(key) => *key,
        }
    }
}

/// Внешний генератор мира: чистый и детерминированный
pub trait WorldGenerator: Send + Sync {
    /// Сэмплы для области `bounds` (min = origin чанка, шаг 1 << lod),
    /// 17^3 значений, x быстрее всех
    fn sample(&self, bounds: VoxelBox, lod: u8) -> Result<Vec<Voxel>, GeneratorError>;
}

impl<F> WorldGenerator for F
where
    F: Fn(VoxelBox, u8) -> Result<Vec<Voxel>, GeneratorError> + Send + Sync,
{
    fn sample(&self, bounds: VoxelBox, lod: u8) -> Result<Vec<Voxel>, GeneratorError> {
        self(bounds, lod)
    }
}

/// Заполнить сетку 17^3 функцией мировой позиции
pub fn sample_grid(bounds: VoxelBox, lod: u8, mut f: impl FnMut(Vec3, f32) -> Voxel) -> Vec<Voxel> {
    let step = 1i32 << lod;
    let mut out = Vec::with_capacity(SAMPLE_COUNT);
    for k in 0..CHUNK_SAMPLES as i32 {
        for j in 0..CHUNK_SAMPLES as i32 {
            for i in 0..CHUNK_SAMPLES as i32 {
                let p = Vec3::new(
                    (bounds.min.x + i * step) as f32,
                    (bounds.min.y + j * step) as f32,
                    (bounds.min.z + k * step) as f32,
                );
                out.push(f(p, step as f32));
            }
        }
    }
    out
}

impl GeneratorConfig {
    /// Собрать стратегию по конфигу
    pub fn build(&self) -> Result<Arc<dyn WorldGenerator>, GeneratorError> {
        Ok(match self {
            GeneratorConfig::Empty => Arc::new(EmptyGenerator),
            GeneratorConfig::Flat { height, material } => {
                Arc::new(FlatGenerator { height: *height, material: *material })
            }
            GeneratorConfig::Sphere { center, radius, material } => Arc::new(SphereGenerator {
                center: Vec3::from(*center),
                radius: *radius,
                material: *material,
            }),
            GeneratorConfig::Noise { seed, frequency, octaves, amplitude, base_height, material } => {
                Arc::new(NoiseGenerator {
                    seed: *seed,
                    frequency: *frequency,
                    octaves: *octaves,
                    amplitude: *amplitude,
                    base_height: *base_height,
                    material: *material,
                })
            }
            GeneratorConfig::Heightmap { width, depth, scale, heights, material } => Arc::new(
                HeightmapGenerator::new(*width, *depth, *scale, heights.clone(), *material)?,
            ),
            GeneratorConfig::Vdb { path, grid, background } => {
                Arc::new(VdbGenerator::load(path, grid.as_deref(), *background)?)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_from_config() {
        let generator = GeneratorConfig::Sphere { center: [0.0; 3], radius: 10.0, material: 2 }
            .build()
            .unwrap();
        let key = ChunkKey::new(0, 0, 0, 0);
        let samples = generator.sample(key.sample_bounds(), 0).unwrap();
        assert_eq!(samples.len(), SAMPLE_COUNT);
        assert!(samples[0].is_solid());
    }

    #[test]
    fn test_closure_generator() {
        let generator = |_: VoxelBox, _: u8| -> Result<Vec<Voxel>, GeneratorError> {
            Err(GeneratorError::Invalid("nope".into()))
        };
        assert!(generator.sample(ChunkKey::new(0, 0, 0, 0).sample_bounds(), 0).is_err());
    }

    #[test]
    fn test_bad_heightmap_config_is_rejected() {
        let config = GeneratorConfig::Heightmap {
            width: 4,
            depth: 4,
            scale: 1.0,
            heights: vec![0.0; 3],
            material: 1,
        };
        assert!(matches!(config.build(), Err(GeneratorError::Invalid(_))));
    }
}
