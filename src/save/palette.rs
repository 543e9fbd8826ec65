// ============================================
// Material Palette - Палитра материалов для сжатия
// ============================================
// Превращает ID материалов в компактные индексы 0..N

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Палитра материалов блока чанка
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialPalette {
    /// Список уникальных материалов (индекс = ID в палитре)
    materials: Vec<u8>,
    /// Обратный маппинг: материал -> индекс палитры
    #[serde(skip)]
    reverse_map: HashMap<u8, u16>,
}

impl MaterialPalette {
    pub fn new() -> Self {
        Self::default()
    }

    /// Создать палитру и массив индексов из материалов
    pub fn encode(materials: impl Iterator<Item = u8>) -> (Self, Vec<u16>) {
        let mut palette = Self::new();
        let indices = materials.map(|m| palette.get_or_insert(m)).collect();
        (palette, indices)
    }

    /// Получить индекс материала или добавить новый
    pub fn get_or_insert(&mut self, material: u8) -> u16 {
        if let Some(&idx) = self.reverse_map.get(&material) {
            return idx;
        }
        let idx = self.materials.len() as u16;
        self.materials.push(material);
        self.reverse_map.insert(material, idx);
        idx
    }

    pub fn get(&self, index: u16) -> Option<u8> {
        self.materials.get(index as usize).copied()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// Восстановить reverse_map после десериализации
    pub fn rebuild_reverse_map(&mut self) {
        self.reverse_map.clear();
        for (idx, &material) in self.materials.iter().enumerate() {
            self.reverse_map.insert(material, idx as u16);
        }
    }

    /// Количество бит на индекс (для оптимального хранения)
    pub fn bits_per_index(&self) -> u8 {
        let len = self.materials.len();
        if len <= 2 { 1 }
        else if len <= 4 { 2 }
        else if len <= 16 { 4 }
        else { 8 }
    }
}

/// Упаковка индексов в байты (bits = 1, 2, 4 или 8)
pub fn pack_indices(indices: &[u16], bits: u8) -> Vec<u8> {
    let values_per_byte = 8 / bits as usize;
    let total_bytes = (indices.len() + values_per_byte - 1) / values_per_byte;
    let mask = ((1u16 << bits) - 1) as u8;
    let mut data = vec![0u8; total_bytes];

    for (i, &idx) in indices.iter().enumerate() {
        let byte_idx = i / values_per_byte;
        let bit_offset = (i % values_per_byte) * bits as usize;
        data[byte_idx] |= (idx as u8 & mask) << bit_offset;
    }

    data
}

/// Распаковка `count` индексов из байтов
pub fn unpack_indices(data: &[u8], bits: u8, count: usize) -> Vec<u16> {
    let values_per_byte = 8 / bits as usize;
    let mask = ((1u16 << bits) - 1) as u8;
    let mut indices = Vec::with_capacity(count);

    for i in 0..count {
        let byte_idx = i / values_per_byte;
        let bit_offset = (i % values_per_byte) * bits as usize;
        let value = (data.get(byte_idx).copied().unwrap_or(0) >> bit_offset) & mask;
        indices.push(value as u16);
    }

    indices
}
