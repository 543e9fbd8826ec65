// ============================================
// Noise Generator - Карта высот из FBM шума (simdnoise)
// ============================================
// Высота = base_height + amplitude * fbm(x, z).
// Шаг LOD учитывается через частоту: сэмплы лежат на мировой сетке.

use simdnoise::NoiseBuilder;

use crate::math::{sample_index, VoxelBox, CHUNK_SAMPLES, SAMPLE_COUNT};
use crate::voxel::{normalized_density, Voxel};

use super::{GeneratorError, WorldGenerator};

pub struct NoiseGenerator {
    pub seed: i32,
    pub frequency: f32,
    pub octaves: u8,
    pub amplitude: f32,
    pub base_height: f32,
    pub material: u8,
}

impl NoiseGenerator {
    /// Колонка высот 17x17 для чанка (индекс z * 17 + x)
    fn heights(&self, bounds: VoxelBox, lod: u8) -> Vec<f32> {
        let step = (1i32 << lod) as f32;
        let x_offset = bounds.min.x as f32 / step;
        let z_offset = bounds.min.z as f32 / step;
        let noise = NoiseBuilder::fbm_2d_offset(x_offset, CHUNK_SAMPLES, z_offset, CHUNK_SAMPLES)
            .with_seed(self.seed)
            .with_freq(self.frequency * step)
            .with_octaves(self.octaves.max(1))
            .generate()
            .0;
        noise
            .into_iter()
            .map(|n| self.base_height + self.amplitude * n)
            .collect()
    }
}

impl WorldGenerator for NoiseGenerator {
    fn sample(&self, bounds: VoxelBox, lod: u8) -> Result<Vec<Voxel>, GeneratorError> {
        let heights = self.heights(bounds, lod);
        if heights.len() < CHUNK_SAMPLES * CHUNK_SAMPLES {
            return Err(GeneratorError::Invalid(format!(
                "noise returned {} heights",
                heights.len()
            )));
        }
        let step = 1i32 << lod;
        let mut out = vec![Voxel::AIR; SAMPLE_COUNT];
        for k in 0..CHUNK_SAMPLES {
            for i in 0..CHUNK_SAMPLES {
                let h = heights[k * CHUNK_SAMPLES + i];
                for j in 0..CHUNK_SAMPLES {
                    let y = (bounds.min.y + j as i32 * step) as f32;
                    out[sample_index(i, j, k)] =
                        Voxel::new(normalized_density(y - h, step as f32), self.material);
                }
            }
        }
        Ok(out)
    }
}
