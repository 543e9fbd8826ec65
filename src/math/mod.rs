// ============================================
// Math Module - Целочисленные координаты и ключи чанков
// ============================================

mod coords;
mod key;
mod direction;

pub use coords::{VoxelBox, VoxelPos};
pub use key::ChunkKey;
pub use direction::Direction;

/// Клеток на ребро чанка (на любом LOD)
pub const CHUNK_SIZE: i32 = 16;

/// Сэмплов на ребро чанка: углы клеток, грани делятся с соседом
pub const CHUNK_SAMPLES: usize = CHUNK_SIZE as usize + 1;

/// Всего сэмплов в чанке (17^3)
pub const SAMPLE_COUNT: usize = CHUNK_SAMPLES * CHUNK_SAMPLES * CHUNK_SAMPLES;

/// Форма сетки сэмплов (x быстрее всех)
pub type SampleShape = ndshape::ConstShape3u32<17, 17, 17>;

/// Линейный индекс сэмпла
#[inline]
pub fn sample_index(x: usize, y: usize, z: usize) -> usize {
    x + y * CHUNK_SAMPLES + z * CHUNK_SAMPLES * CHUNK_SAMPLES
}
