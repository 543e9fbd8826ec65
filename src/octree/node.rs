// ============================================
// Node Arena - Кэш-дружественное хранение узлов
// ============================================
//
// Все узлы в непрерывном Vec, ссылки через u32 индексы.
// Дети идут блоком из 8: first, first+1, ..., first+7,
// смещение ребёнка = z<<2 | y<<1 | x (как ChunkKey::child_slot).

use crate::math::ChunkKey;

/// Невалидный индекс (аналог null)
pub const INVALID_INDEX: u32 = u32::MAX;

#[derive(Clone, Copy, Debug)]
pub struct OctreeNode {
    pub key: ChunkKey,
    pub parent: u32,
    /// INVALID_INDEX у листа
    pub first_child: u32,
    /// Тик последнего деления (запрет слияния в том же тике)
    pub split_tick: u64,
}

impl OctreeNode {
    #[inline]
    pub fn leaf(key: ChunkKey, parent: u32) -> Self {
        Self { key, parent, first_child: INVALID_INDEX, split_tick: u64::MAX }
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        self.first_child != INVALID_INDEX
    }
}

#[derive(Default)]
pub struct NodeArena {
    nodes: Vec<OctreeNode>,
    /// Свободные одиночные слоты (корни)
    free_single: Vec<u32>,
    /// Свободные блоки по 8 (дети)
    free_blocks: Vec<u32>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self {
            nodes: Vec::with_capacity(512),
            free_single: Vec::new(),
            free_blocks: Vec::new(),
        }
    }

    #[inline]
    pub fn get(&self, idx: u32) -> &OctreeNode {
        &self.nodes[idx as usize]
    }

    #[inline]
    pub fn get_mut(&mut self, idx: u32) -> &mut OctreeNode {
        &mut self.nodes[idx as usize]
    }

    pub fn alloc_root(&mut self, key: ChunkKey) -> u32 {
        let node = OctreeNode::leaf(key, INVALID_INDEX);
        match self.free_single.pop() {
            Some(idx) => {
                self.nodes[idx as usize] = node;
                idx
            }
            None => {
                self.nodes.push(node);
                (self.nodes.len() - 1) as u32
            }
        }
    }

    /// Аллоцировать 8 детей подряд (переиспользуя освобождённый блок)
    pub fn alloc_children(&mut self, parent: u32, keys: [ChunkKey; 8]) -> u32 {
        let first = match self.free_blocks.pop() {
            Some(first) => first,
            None => {
                let first = self.nodes.len() as u32;
                self.nodes.extend(keys.iter().map(|k| OctreeNode::leaf(*k, parent)));
                return first;
            }
        };
        for (i, key) in keys.iter().enumerate() {
            self.nodes[first as usize + i] = OctreeNode::leaf(*key, parent);
        }
        first
    }

    /// Освободить блок детей рекурсивно. Возвращает ключи всех освобождённых узлов.
    pub fn free_children(&mut self, first_child: u32, freed: &mut Vec<ChunkKey>) {
        for i in 0..8 {
            let child = self.nodes[(first_child + i) as usize];
            if child.has_children() {
                self.free_children(child.first_child, freed);
            }
            freed.push(child.key);
        }
        self.free_blocks.push(first_child);
    }

    pub fn free_root(&mut self, idx: u32) {
        self.free_single.push(idx);
    }

    /// Живых узлов
    pub fn node_count(&self) -> usize {
        self.nodes.len() - self.free_single.len() - self.free_blocks.len() * 8
    }
}
