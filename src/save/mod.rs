// ============================================
// Save System - Сохранение блоков чанков и журнала правок
// ============================================
// Блок чанка: палитра материалов + ZSTD + CRC32.
// Файл мира: заголовок, журнал правок, блоки чанков.
// Дельта правок: пакет записей журнала для синхронизации по сети.

mod header;
mod palette;
mod codec;
mod delta;
mod world_file;

pub use header::{SaveHeader, MAGIC_NUMBER, SAVE_VERSION};
pub use palette::{pack_indices, unpack_indices, MaterialPalette};
pub use codec::{ChunkBlock, ChunkCodec, CodecError};
pub use delta::{decode_edits, encode_edits};
pub use world_file::{LoadedWorld, WorldFile, WorldSnapshot};
