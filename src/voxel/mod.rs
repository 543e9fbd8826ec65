// ============================================
// Voxel Module - Хранилище сэмплов (VoxelValue Store)
// ============================================

mod sample;
mod storage;
mod chunk;
mod store;
mod neighborhood;

pub use sample::{normalized_density, Voxel, AIR_MATERIAL};
pub use storage::ChunkStorage;
pub use chunk::{CancelToken, Chunk, ChunkState};
pub use store::{ChunkHandle, VoxelStore};
pub use neighborhood::{NeighborSource, Neighborhood};

use crate::math::ChunkKey;

/// Ошибки хранилища
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("chunk handle {0:?} is no longer valid")]
    StaleHandle(ChunkHandle),
    #[error("chunk {0:?} is not resident")]
    NotResident(ChunkKey),
    #[error("chunk {0:?} is still referenced")]
    Pinned(ChunkKey),
    #[error("expected {expected} samples, got {actual}")]
    InvalidSampleCount { expected: usize, actual: usize },
}
