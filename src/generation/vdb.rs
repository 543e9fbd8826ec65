// ============================================
// VDB Generator - Импорт разреженного SDF из OpenVDB (vdb-rs)
// ============================================
// Значения сетки - расстояние в вокселях LOD 0. Всё, чего нет в
// сетке, получает background. Грубые LOD берут значение в своей точке.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use vdb_rs::VdbReader;

use crate::math::VoxelBox;
use crate::voxel::{normalized_density, Voxel};

use super::{sample_grid, GeneratorError, WorldGenerator};

/// Материал твёрдых вокселей из VDB
const VDB_MATERIAL: u8 = 1;

pub struct VdbGenerator {
    values: HashMap<[i32; 3], f32>,
    background: f32,
}

impl VdbGenerator {
    /// Загрузить сетку `grid` (или первую в файле)
    pub fn load<P: AsRef<Path>>(path: P, grid: Option<&str>, background: f32) -> Result<Self, GeneratorError> {
        let file = File::open(path.as_ref())?;
        let mut reader = VdbReader::new(BufReader::new(file))
            .map_err(|e| GeneratorError::Vdb(format!("{:?}", e)))?;

        let name = match grid {
            Some(name) => name.to_string(),
            None => reader
                .available_grids()
                .into_iter()
                .next()
                .ok_or_else(|| GeneratorError::Vdb("file contains no grids".into()))?,
        };

        let grid = reader
            .read_grid::<f32>(&name)
            .map_err(|e| GeneratorError::Vdb(format!("{:?}", e)))?;

        let mut values = HashMap::new();
        for (pos, value, _level) in grid.iter() {
            let cell = [pos.x.round() as i32, pos.y.round() as i32, pos.z.round() as i32];
            values.insert(cell, value);
        }

        log::info!(
            "[VDB] Loaded grid '{}' from {:?}: {} voxels",
            name,
            path.as_ref(),
            values.len()
        );
        Ok(Self::from_values(values, background))
    }

    /// Генератор из готовых значений (разреженная карта вокселей)
    pub fn from_values(values: HashMap<[i32; 3], f32>, background: f32) -> Self {
        Self { values, background }
    }

    #[inline]
    fn value_at(&self, x: i32, y: i32, z: i32) -> f32 {
        self.values.get(&[x, y, z]).copied().unwrap_or(self.background)
    }
}

impl WorldGenerator for VdbGenerator {
    fn sample(&self, bounds: VoxelBox, lod: u8) -> Result<Vec<Voxel>, GeneratorError> {
        Ok(sample_grid(bounds, lod, |p, step| {
            let d = self.value_at(p.x as i32, p.y as i32, p.z as i32);
            let material = if d < 0.0 { VDB_MATERIAL } else { 0 };
            Voxel::new(normalized_density(d, step), material)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{sample_index, ChunkKey};

    #[test]
    fn test_sparse_values_with_background() {
        let mut values = HashMap::new();
        values.insert([1, 2, 3], -0.5);
        let generator = VdbGenerator::from_values(values, 1.0);
        let samples = generator.sample(ChunkKey::new(0, 0, 0, 0).sample_bounds(), 0).unwrap();
        assert!(samples[sample_index(1, 2, 3)].is_solid());
        assert_eq!(samples[sample_index(1, 2, 3)].material, VDB_MATERIAL);
        assert!(!samples[sample_index(0, 0, 0)].is_solid());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = VdbGenerator::load("/nonexistent/terrain.vdb", None, 1.0);
        assert!(matches!(result, Err(GeneratorError::Io(_))));
    }
}
