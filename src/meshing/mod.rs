// ============================================
// Meshing Module - Изоповерхность чанка и сшивка LOD швов
// ============================================
//
// Вход - Neighborhood (снимок чанка + соседей), выход - MeshArtifact.
// Вырожденный чанк (весь воздух / вся твердь) даёт пустой артефакт
// без запуска извлечения.

mod vertex;
mod artifact;
mod context;
mod tetra;
mod surface_nets;

pub use vertex::MeshVertex;
pub use artifact::MeshArtifact;
pub use context::{with_meshing_context, MeshingContext};

use crate::core::ExtractionMode;
use crate::voxel::Neighborhood;

#[derive(Clone, Copy, Debug)]
pub struct Mesher {
    mode: ExtractionMode,
}

impl Mesher {
    pub fn new(mode: ExtractionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ExtractionMode {
        self.mode
    }

    /// Меш чанка на thread-local контексте текущего потока
    pub fn mesh(&self, hood: &Neighborhood, generation: u64) -> MeshArtifact {
        with_meshing_context(|ctx| self.mesh_with(ctx, hood, generation))
    }

    /// Меш чанка на переданном контексте
    pub fn mesh_with(&self, ctx: &mut MeshingContext, hood: &Neighborhood, generation: u64) -> MeshArtifact {
        let key = hood.key();
        let transition_mask = hood.transition_mask();
        let provisional_mask = hood.provisional_mask();

        ctx.clear_output();
        tetra::fill_grid(ctx, hood);
        if self.mode == ExtractionMode::MarchingTetrahedra {
            tetra::resample_seams(ctx, hood);
        }

        if tetra::is_degenerate(ctx) {
            return MeshArtifact::empty(key, generation, transition_mask, provisional_mask);
        }

        match self.mode {
            ExtractionMode::MarchingTetrahedra => tetra::polygonize(ctx, key),
            ExtractionMode::SurfaceNets => surface_nets::extract(ctx, key),
        }

        let (vertices, indices) = ctx.take_results();
        let mut materials: Vec<u8> = vertices.iter().map(|v| v.material as u8).collect();
        materials.sort_unstable();
        materials.dedup();

        log::trace!(
            "[MESH] {:?}: {} vertices, {} triangles, transition {:06b}",
            key,
            vertices.len(),
            indices.len() / 3,
            transition_mask
        );

        MeshArtifact {
            key,
            generation,
            vertices,
            indices,
            transition_mask,
            provisional_mask,
            materials,
        }
    }
}

impl Default for Mesher {
    fn default() -> Self {
        Self::new(ExtractionMode::MarchingTetrahedra)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{sample_index, ChunkKey, Direction, SAMPLE_COUNT};
    use crate::voxel::{normalized_density, ChunkStorage, NeighborSource, Voxel};
    use std::sync::Arc;
    use ultraviolet::Vec3;

    fn sphere_chunk(key: ChunkKey, center: Vec3, radius: f32) -> Arc<ChunkStorage> {
        let mut samples = vec![Voxel::AIR; SAMPLE_COUNT];
        for k in 0..=16 {
            for j in 0..=16 {
                for i in 0..=16 {
                    let p = key.sample_position(i, j, k).to_vec3();
                    let d = (p - center).mag() - radius;
                    samples[sample_index(i as usize, j as usize, k as usize)] =
                        Voxel::new(normalized_density(d, key.step() as f32), 3);
                }
            }
        }
        Arc::new(ChunkStorage::from_samples(samples).unwrap())
    }

    #[test]
    fn test_degenerate_chunk_short_circuits() {
        let key = ChunkKey::new(0, 0, 0, 0);
        let hood = Neighborhood::isolated(key, Arc::new(ChunkStorage::uniform(Voxel::AIR)));
        let artifact = Mesher::default().mesh(&hood, 9);
        assert!(artifact.is_empty());
        assert_eq!(artifact.generation, 9);
    }

    #[test]
    fn test_sphere_mesh_has_materials() {
        let key = ChunkKey::new(0, 0, 0, 0);
        let hood = Neighborhood::isolated(key, sphere_chunk(key, Vec3::broadcast(8.0), 5.3));
        let artifact = Mesher::default().mesh(&hood, 1);
        assert!(!artifact.is_empty());
        assert_eq!(artifact.materials, vec![3]);
        // площадь сферы 4 pi r^2, кусочно-линейная аппроксимация чуть меньше
        let expected = 4.0 * std::f32::consts::PI * 5.3 * 5.3;
        let area = artifact.surface_area();
        assert!(area > expected * 0.85 && area < expected * 1.1, "area {}", area);
    }

    #[test]
    fn test_transition_mask_reported() {
        let key = ChunkKey::new(1, 0, 0, 0);
        let coarse = ChunkKey::new(1, 0, 0, 1);
        let center = Vec3::new(32.0, 8.0, 8.0);
        let mut hood = Neighborhood::isolated(key, sphere_chunk(key, center, 6.3));
        hood.set_neighbor(
            Direction::new(1, 0, 0),
            NeighborSource { key: coarse, storage: sphere_chunk(coarse, center, 6.3) },
            true,
        );
        let artifact = Mesher::default().mesh(&hood, 1);
        assert_eq!(artifact.transition_mask, 0b10);
        assert!(!artifact.is_empty());
    }

    #[test]
    fn test_surface_nets_mode() {
        let key = ChunkKey::new(0, 0, 0, 0);
        let hood = Neighborhood::isolated(key, sphere_chunk(key, Vec3::broadcast(8.0), 5.3));
        let artifact = Mesher::new(ExtractionMode::SurfaceNets).mesh(&hood, 1);
        assert!(!artifact.is_empty());
        for v in &artifact.vertices {
            let r = (Vec3::from(v.position) - Vec3::broadcast(8.0)).mag();
            assert!((r - 5.3).abs() < 1.0);
        }
    }
}
