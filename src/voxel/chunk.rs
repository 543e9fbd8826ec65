// ============================================
// Chunk - Запись хранилища для одного (позиция, LOD)
// ============================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use vob::Vob;

use crate::math::{ChunkKey, SAMPLE_COUNT};

use super::storage::ChunkStorage;

/// Состояние чанка в конвейере
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChunkState {
    /// Данных нет, нужна генерация
    Empty,
    Generating,
    /// Данные есть, меша нет
    Generated,
    Meshed,
    /// Данные изменились после последнего меша
    Stale,
    /// Генератор упал; повтор только по явному запросу
    GenerationFailed,
}

impl ChunkState {
    /// Есть ли у чанка сэмплы, пригодные для чтения
    pub fn has_data(&self) -> bool {
        matches!(self, ChunkState::Generated | ChunkState::Meshed | ChunkState::Stale)
    }
}

/// Токен отмены: задача устарела, если счётчик поколения ушёл вперёд
#[derive(Clone, Debug)]
pub struct CancelToken {
    counter: Arc<AtomicU64>,
    expected: u64,
}

impl CancelToken {
    pub fn new(counter: Arc<AtomicU64>) -> Self {
        let expected = counter.load(Ordering::Acquire);
        Self { counter, expected }
    }

    /// Токен, который никогда не отменяется (тесты, синхронный путь)
    pub fn detached(generation: u64) -> Self {
        Self { counter: Arc::new(AtomicU64::new(generation)), expected: generation }
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.counter.load(Ordering::Acquire) != self.expected
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.expected
    }
}

pub struct Chunk {
    key: ChunkKey,
    storage: Option<Arc<ChunkStorage>>,
    state: ChunkState,
    generation: Arc<AtomicU64>,
    /// Ссылки от октодерева (лист)
    pub(crate) index_refs: u32,
    /// Ссылки от задач в полёте
    pub(crate) job_refs: u32,
    /// Тик последнего обращения
    pub(crate) last_used: u64,
    /// Сэмплы, изменённые правками после последнего снимка
    edited: Vob,
    /// Последняя применённая правка
    applied_through: u64,
    failure: Option<String>,
}

impl Chunk {
    pub fn new(key: ChunkKey) -> Self {
        Self {
            key,
            storage: None,
            state: ChunkState::Empty,
            generation: Arc::new(AtomicU64::new(0)),
            index_refs: 0,
            job_refs: 0,
            last_used: 0,
            edited: empty_mask(),
            applied_through: 0,
            failure: None,
        }
    }

    #[inline]
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    #[inline]
    pub fn state(&self) -> ChunkState {
        self.state
    }

    pub fn set_state(&mut self, state: ChunkState) {
        self.state = state;
        if state != ChunkState::GenerationFailed {
            self.failure = None;
        }
    }

    pub fn fail(&mut self, reason: String) {
        self.state = ChunkState::GenerationFailed;
        self.failure = Some(reason);
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Продвинуть счётчик поколения (отменяет все задачи со старым токеном)
    pub fn bump_generation(&mut self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn cancel_token(&self) -> CancelToken {
        CancelToken::new(Arc::clone(&self.generation))
    }

    pub fn storage(&self) -> Option<&ChunkStorage> {
        self.storage.as_deref()
    }

    /// Неизменяемый снимок для задачи меширования
    pub fn snapshot(&self) -> Option<Arc<ChunkStorage>> {
        self.storage.clone()
    }

    /// Изменяемый доступ: copy-on-write, если снимок у задачи
    pub fn storage_mut(&mut self) -> Option<&mut ChunkStorage> {
        self.storage.as_mut().map(Arc::make_mut)
    }

    pub(crate) fn replace_storage(&mut self, storage: Option<ChunkStorage>) {
        self.storage = storage.map(Arc::new);
    }

    pub fn has_data(&self) -> bool {
        self.storage.is_some() && self.state.has_data()
    }

    pub fn is_referenced(&self) -> bool {
        self.index_refs > 0 || self.job_refs > 0
    }

    pub fn index_refs(&self) -> u32 {
        self.index_refs
    }

    pub fn job_refs(&self) -> u32 {
        self.job_refs
    }

    pub fn last_used(&self) -> u64 {
        self.last_used
    }

    pub fn mark_edited(&mut self, index: usize) {
        if index < self.edited.len() {
            self.edited.set(index, true);
        }
    }

    pub fn edited_samples(&self) -> impl Iterator<Item = usize> + '_ {
        self.edited.iter_set_bits(..)
    }

    /// Есть сэмплы, не попавшие в снимок
    pub fn is_dirty(&self) -> bool {
        self.edited_samples().next().is_some()
    }

    /// Снимок записан: маска обнуляется
    pub fn clear_dirty(&mut self) {
        self.edited = empty_mask();
    }

    /// Сбросить следы правок (данные пересоздаются с нуля)
    pub fn reset_edits(&mut self) {
        self.clear_dirty();
        self.applied_through = 0;
    }

    pub fn applied_through(&self) -> u64 {
        self.applied_through
    }

    pub fn set_applied_through(&mut self, sequence: u64) {
        self.applied_through = self.applied_through.max(sequence);
    }

    pub fn memory_usage(&self) -> usize {
        std::mem::size_of::<Self>()
            + self.storage.as_ref().map(|s| s.memory_usage()).unwrap_or(0)
            + SAMPLE_COUNT / 8
    }
}

fn empty_mask() -> Vob {
    let mut mask = Vob::new();
    mask.resize(SAMPLE_COUNT, false);
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::Voxel;

    #[test]
    fn test_cancel_token_follows_generation() {
        let mut chunk = Chunk::new(ChunkKey::new(0, 0, 0, 0));
        let token = chunk.cancel_token();
        assert!(!token.is_cancelled());
        chunk.bump_generation();
        assert!(token.is_cancelled());
        assert!(!chunk.cancel_token().is_cancelled());
    }

    #[test]
    fn test_snapshot_is_copy_on_write() {
        let mut chunk = Chunk::new(ChunkKey::new(0, 0, 0, 0));
        chunk.replace_storage(Some(ChunkStorage::uniform(Voxel::AIR)));
        let snapshot = chunk.snapshot().unwrap();
        if let Some(storage) = chunk.storage_mut() {
            storage.set_index(0, Voxel::solid(3));
        }
        assert_eq!(snapshot.get_index(0), Voxel::AIR);
        assert_eq!(chunk.storage().unwrap().get_index(0), Voxel::solid(3));
    }

    #[test]
    fn test_edited_mask() {
        let mut chunk = Chunk::new(ChunkKey::new(0, 0, 0, 0));
        chunk.mark_edited(7);
        chunk.mark_edited(100);
        assert!(chunk.is_dirty());
        assert_eq!(chunk.edited_samples().collect::<Vec<_>>(), vec![7, 100]);
        chunk.clear_dirty();
        assert!(!chunk.is_dirty());

        // после снимка копятся только новые изменения
        chunk.mark_edited(9);
        chunk.set_applied_through(4);
        assert_eq!(chunk.edited_samples().collect::<Vec<_>>(), vec![9]);
        chunk.reset_edits();
        assert!(!chunk.is_dirty());
        assert_eq!(chunk.applied_through(), 0);
    }
}
