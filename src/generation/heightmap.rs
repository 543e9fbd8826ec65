// ============================================
// Heightmap Generator - Импортированная карта высот
// ============================================
// Билинейная интерполяция, за краем карты - значение края.

use crate::math::VoxelBox;
use crate::voxel::{normalized_density, Voxel};

use super::{sample_grid, GeneratorError, WorldGenerator};

pub struct HeightmapGenerator {
    width: usize,
    depth: usize,
    scale: f32,
    heights: Vec<f32>,
    material: u8,
}

impl HeightmapGenerator {
    pub fn new(
        width: usize,
        depth: usize,
        scale: f32,
        heights: Vec<f32>,
        material: u8,
    ) -> Result<Self, GeneratorError> {
        if width == 0 || depth == 0 || heights.len() != width * depth {
            return Err(GeneratorError::Invalid(format!(
                "heightmap {}x{} needs {} heights, got {}",
                width,
                depth,
                width * depth,
                heights.len()
            )));
        }
        if !(scale > 0.0) {
            return Err(GeneratorError::Invalid("heightmap scale must be positive".into()));
        }
        if heights.iter().any(|h| !h.is_finite()) {
            return Err(GeneratorError::Invalid("heightmap contains non-finite heights".into()));
        }
        Ok(Self { width, depth, scale, heights, material })
    }

    #[inline]
    fn at(&self, x: usize, z: usize) -> f32 {
        self.heights[z.min(self.depth - 1) * self.width + x.min(self.width - 1)]
    }

    /// Высота в мировой точке (x, z)
    pub fn height(&self, x: f32, z: f32) -> f32 {
        let fx = (x / self.scale).clamp(0.0, (self.width - 1) as f32);
        let fz = (z / self.scale).clamp(0.0, (self.depth - 1) as f32);
        let x0 = fx.floor() as usize;
        let z0 = fz.floor() as usize;
        let tx = fx - x0 as f32;
        let tz = fz - z0 as f32;
        let h00 = self.at(x0, z0);
        let h10 = self.at(x0 + 1, z0);
        let h01 = self.at(x0, z0 + 1);
        let h11 = self.at(x0 + 1, z0 + 1);
        let h0 = h00 + (h10 - h00) * tx;
        let h1 = h01 + (h11 - h01) * tx;
        h0 + (h1 - h0) * tz
    }
}

impl WorldGenerator for HeightmapGenerator {
    fn sample(&self, bounds: VoxelBox, lod: u8) -> Result<Vec<Voxel>, GeneratorError> {
        Ok(sample_grid(bounds, lod, |p, step| {
            Voxel::new(normalized_density(p.y - self.height(p.x, p.z), step), self.material)
        }))
    }
}
