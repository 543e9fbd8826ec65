// ============================================
// Octree Module - Пространственный индекс чанков с LOD
// ============================================

mod node;
mod lod;
mod index;

pub use node::{NodeArena, OctreeNode, INVALID_INDEX};
pub use lod::LodPolicy;
pub use index::{FocusUpdate, NeighborLink, OctreeIndex};

use crate::math::ChunkKey;

/// Нарушение инвариантов октодерева (ошибка логики вызывающего)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvariantViolation {
    #[error("leaf {fine:?} borders {coarse:?}: LOD difference exceeds 1")]
    Unbalanced { fine: ChunkKey, coarse: ChunkKey },
    #[error("node {0:?} is partially subdivided")]
    PartialSubdivision(ChunkKey),
    #[error("{0:?} is not a leaf")]
    NotALeaf(ChunkKey),
    #[error("{0:?} is already at the finest LOD")]
    BelowFinest(ChunkKey),
}
