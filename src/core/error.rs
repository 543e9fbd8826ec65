// ============================================
// Terrain Error - Общая ошибка тома
// ============================================
// Каждый компонент имеет свой enum, здесь они сводятся в один

use crate::generation::{GenerationError, GeneratorError};
use crate::octree::InvariantViolation;
use crate::save::CodecError;
use crate::voxel::StoreError;

use super::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum TerrainError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Generator(#[from] GeneratorError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Invariant(#[from] InvariantViolation),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("terrain is shut down")]
    ShutDown,
}
