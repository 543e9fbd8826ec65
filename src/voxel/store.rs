// ============================================
// Voxel Store - Арена чанков с хэндлами
// ============================================
//
// Чанки лежат в плоском Vec слотов, снаружи видны только хэндлы
// (индекс слота + версия). Освобождённые слоты переиспользуются через
// free_list, версия слота растёт при каждом освобождении, так что
// старый хэндл после evict перестаёт резолвиться.

use std::collections::HashMap;

use crate::math::ChunkKey;

use super::chunk::{Chunk, ChunkState};
use super::storage::ChunkStorage;
use super::StoreError;

/// Непрозрачный хэндл чанка
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkHandle {
    slot: u32,
    version: u32,
}

struct Slot {
    version: u32,
    chunk: Option<Chunk>,
}

pub struct VoxelStore {
    slots: Vec<Slot>,
    free_list: Vec<u32>,
    by_key: HashMap<ChunkKey, ChunkHandle>,
    /// Сворачивать однородные чанки при записи
    uniform_compaction: bool,
}

impl VoxelStore {
    pub fn new(uniform_compaction: bool) -> Self {
        Self {
            slots: Vec::with_capacity(256),
            free_list: Vec::new(),
            by_key: HashMap::new(),
            uniform_compaction,
        }
    }

    /// Хэндл резидентного чанка
    pub fn get(&self, key: ChunkKey) -> Option<ChunkHandle> {
        self.by_key.get(&key).copied()
    }

    /// Создать запись (или вернуть существующую: одна запись на ключ)
    pub fn allocate(&mut self, key: ChunkKey) -> ChunkHandle {
        if let Some(handle) = self.by_key.get(&key) {
            return *handle;
        }
        let handle = match self.free_list.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.chunk = Some(Chunk::new(key));
                ChunkHandle { slot, version: entry.version }
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(Slot { version: 0, chunk: Some(Chunk::new(key)) });
                ChunkHandle { slot, version: 0 }
            }
        };
        self.by_key.insert(key, handle);
        handle
    }

    pub fn chunk(&self, handle: ChunkHandle) -> Result<&Chunk, StoreError> {
        self.slots
            .get(handle.slot as usize)
            .filter(|s| s.version == handle.version)
            .and_then(|s| s.chunk.as_ref())
            .ok_or(StoreError::StaleHandle(handle))
    }

    pub fn chunk_mut(&mut self, handle: ChunkHandle) -> Result<&mut Chunk, StoreError> {
        self.slots
            .get_mut(handle.slot as usize)
            .filter(|s| s.version == handle.version)
            .and_then(|s| s.chunk.as_mut())
            .ok_or(StoreError::StaleHandle(handle))
    }

    pub fn chunk_by_key(&self, key: ChunkKey) -> Option<&Chunk> {
        self.get(key).and_then(|h| self.chunk(h).ok())
    }

    pub fn chunk_by_key_mut(&mut self, key: ChunkKey) -> Option<&mut Chunk> {
        let handle = self.get(key)?;
        self.chunk_mut(handle).ok()
    }

    /// Записать сэмплы. Поколение растёт, старые задачи и меши устаревают.
    pub fn write(&mut self, handle: ChunkHandle, mut storage: ChunkStorage) -> Result<u64, StoreError> {
        if self.uniform_compaction {
            storage.compact();
        }
        let chunk = self.chunk_mut(handle)?;
        chunk.replace_storage(Some(storage));
        Ok(chunk.bump_generation())
    }

    /// Сбросить данные: чанк снова Empty, поколение растёт
    pub fn clear(&mut self, handle: ChunkHandle) -> Result<u64, StoreError> {
        let chunk = self.chunk_mut(handle)?;
        chunk.replace_storage(None);
        chunk.reset_edits();
        chunk.clear_dirty();
        chunk.set_state(ChunkState::Empty);
        Ok(chunk.bump_generation())
    }

    /// Пометить чанк устаревшим (данные на месте, меш нужно перестроить)
    pub fn invalidate(&mut self, handle: ChunkHandle) -> Result<u64, StoreError> {
        let chunk = self.chunk_mut(handle)?;
        if matches!(chunk.state(), ChunkState::Meshed | ChunkState::Generated) {
            chunk.set_state(ChunkState::Stale);
        }
        Ok(chunk.bump_generation())
    }

    /// Выгрузить чанк. Нельзя, пока на него ссылаются.
    pub fn evict(&mut self, handle: ChunkHandle) -> Result<Chunk, StoreError> {
        let chunk = self.chunk(handle)?;
        if chunk.is_referenced() {
            return Err(StoreError::Pinned(chunk.key()));
        }
        let slot = &mut self.slots[handle.slot as usize];
        let mut chunk = slot.chunk.take().ok_or(StoreError::StaleHandle(handle))?;
        slot.version = slot.version.wrapping_add(1);
        self.free_list.push(handle.slot);
        self.by_key.remove(&chunk.key());
        chunk.bump_generation();
        Ok(chunk)
    }

    pub fn add_index_ref(&mut self, handle: ChunkHandle) -> Result<(), StoreError> {
        self.chunk_mut(handle)?.index_refs += 1;
        Ok(())
    }

    pub fn release_index_ref(&mut self, handle: ChunkHandle) -> Result<(), StoreError> {
        let chunk = self.chunk_mut(handle)?;
        chunk.index_refs = chunk.index_refs.saturating_sub(1);
        Ok(())
    }

    pub fn add_job_ref(&mut self, handle: ChunkHandle) -> Result<(), StoreError> {
        self.chunk_mut(handle)?.job_refs += 1;
        Ok(())
    }

    pub fn release_job_ref(&mut self, handle: ChunkHandle) -> Result<(), StoreError> {
        let chunk = self.chunk_mut(handle)?;
        chunk.job_refs = chunk.job_refs.saturating_sub(1);
        Ok(())
    }

    pub fn touch(&mut self, handle: ChunkHandle, tick: u64) {
        if let Ok(chunk) = self.chunk_mut(handle) {
            chunk.last_used = tick;
        }
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.by_key.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChunkHandle, &Chunk)> + '_ {
        self.slots.iter().enumerate().filter_map(|(i, s)| {
            s.chunk.as_ref().map(|c| (ChunkHandle { slot: i as u32, version: s.version }, c))
        })
    }

    pub fn uniform_count(&self) -> usize {
        self.iter()
            .filter(|(_, c)| c.storage().map(|s| s.is_uniform()).unwrap_or(false))
            .count()
    }

    pub fn memory_usage(&self) -> usize {
        self.iter().map(|(_, c)| c.memory_usage()).sum()
    }

    pub fn uniform_compaction(&self) -> bool {
        self.uniform_compaction
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::Voxel;

    #[test]
    fn test_allocate_is_unique_per_key() {
        let mut store = VoxelStore::new(true);
        let key = ChunkKey::new(1, 2, 3, 0);
        let a = store.allocate(key);
        let b = store.allocate(key);
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(key), Some(a));
    }

    #[test]
    fn test_write_bumps_generation_and_compacts() {
        let mut store = VoxelStore::new(true);
        let handle = store.allocate(ChunkKey::new(0, 0, 0, 0));
        let samples = vec![Voxel::AIR; crate::math::SAMPLE_COUNT];
        let g1 = store.write(handle, ChunkStorage::from_samples(samples).unwrap()).unwrap();
        let g2 = store.write(handle, ChunkStorage::uniform(Voxel::solid(1))).unwrap();
        assert!(g2 > g1);
        assert_eq!(store.uniform_count(), 1);
    }

    #[test]
    fn test_evict_invalidates_handle_and_reuses_slot() {
        let mut store = VoxelStore::new(false);
        let key = ChunkKey::new(0, 0, 0, 0);
        let handle = store.allocate(key);
        store.add_index_ref(handle).unwrap();
        assert!(matches!(store.evict(handle), Err(StoreError::Pinned(_))));
        store.release_index_ref(handle).unwrap();
        store.evict(handle).unwrap();
        assert!(store.get(key).is_none());
        assert!(matches!(store.chunk(handle), Err(StoreError::StaleHandle(_))));

        let again = store.allocate(ChunkKey::new(5, 0, 0, 0));
        assert_ne!(again, handle);
        assert!(store.chunk(again).is_ok());
    }

    #[test]
    fn test_invalidate_marks_stale() {
        let mut store = VoxelStore::new(false);
        let handle = store.allocate(ChunkKey::new(0, 0, 0, 0));
        store.write(handle, ChunkStorage::uniform(Voxel::AIR)).unwrap();
        store.chunk_mut(handle).unwrap().set_state(ChunkState::Meshed);
        store.invalidate(handle).unwrap();
        assert_eq!(store.chunk(handle).unwrap().state(), ChunkState::Stale);
    }
}
