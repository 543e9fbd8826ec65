// ============================================
// Save Header - Заголовок файла сохранения
// ============================================

use serde::{Deserialize, Serialize};

/// Магическое число "VXTR" в ASCII
pub const MAGIC_NUMBER: [u8; 4] = [0x56, 0x58, 0x54, 0x52];

/// Версия формата сохранения
pub const SAVE_VERSION: u32 = 1;

/// Заголовок файла сохранения (фиксированный размер в bincode)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveHeader {
    /// Магическое число для валидации
    pub magic: [u8; 4],
    /// Версия формата
    pub version: u32,
    /// Позиция наблюдателя на момент сохранения
    pub viewer: [f32; 3],
    /// Последний выданный sequence журнала правок
    pub last_sequence: u64,
    /// Правки до этого sequence запечены в блоки чанков
    pub compacted_through: u64,
    /// Сколько блоков чанков идёт после журнала
    pub chunk_count: u32,
}

impl SaveHeader {
    pub fn new(viewer: [f32; 3], last_sequence: u64, compacted_through: u64, chunk_count: u32) -> Self {
        Self {
            magic: MAGIC_NUMBER,
            version: SAVE_VERSION,
            viewer,
            last_sequence,
            compacted_through,
            chunk_count,
        }
    }

    /// Проверка валидности заголовка
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC_NUMBER && self.version == SAVE_VERSION
    }
}

impl Default for SaveHeader {
    fn default() -> Self {
        Self::new([0.0; 3], 0, 0, 0)
    }
}
