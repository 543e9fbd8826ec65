// ============================================
// Generation Pipeline - Генерация одного чанка на воркере
// ============================================
// Генератор -> проверка -> реплей правок -> сжатие.
// Между фазами проверяем токен отмены: устаревшую работу бросаем.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::edit::{replay_records, EditRecord};
use crate::math::{ChunkKey, SAMPLE_COUNT};
use crate::voxel::{CancelToken, ChunkStorage};

use super::{GenerationError, WorldGenerator};

/// Результат генерации, готовый к записи в VoxelStore
#[derive(Debug)]
pub struct GeneratedChunk {
    pub key: ChunkKey,
    /// Поколение чанка, для которого делалась работа
    pub generation: u64,
    pub storage: ChunkStorage,
    /// Последняя применённая правка (0 = правок не было)
    pub applied_through: u64,
    /// Сэмплы, изменённые правками
    pub edited: Vec<usize>,
}

#[derive(Clone)]
pub struct GenerationPipeline {
    generator: Arc<dyn WorldGenerator>,
    uniform_compaction: bool,
}

impl GenerationPipeline {
    pub fn new(generator: Arc<dyn WorldGenerator>, uniform_compaction: bool) -> Self {
        Self { generator, uniform_compaction }
    }

    pub fn generator(&self) -> &Arc<dyn WorldGenerator> {
        &self.generator
    }

    /// Сгенерировать чанк и применить к нему правки `edits` (по порядку sequence)
    pub fn generate(
        &self,
        key: ChunkKey,
        edits: &[EditRecord],
        token: &CancelToken,
    ) -> Result<GeneratedChunk, GenerationError> {
        if token.is_cancelled() {
            return Err(GenerationError::Cancelled(key));
        }

        let bounds = key.sample_bounds();
        let generator = &self.generator;
        let samples = catch_unwind(AssertUnwindSafe(|| generator.sample(bounds, key.lod)))
            .map_err(|payload| GenerationError::Panicked { key, message: panic_message(&*payload) })?
            .map_err(|source| GenerationError::Generator { key, source })?;

        if samples.len() != SAMPLE_COUNT {
            return Err(GenerationError::InvalidLength {
                key,
                expected: SAMPLE_COUNT,
                actual: samples.len(),
            });
        }
        if let Some(index) = samples.iter().position(|v| !v.is_finite()) {
            return Err(GenerationError::NonFinite { key, index });
        }

        let mut storage = ChunkStorage::from_samples(samples).map_err(|_| GenerationError::InvalidLength {
            key,
            expected: SAMPLE_COUNT,
            actual: 0,
        })?;

        if token.is_cancelled() {
            return Err(GenerationError::Cancelled(key));
        }

        let mut ordered = edits.to_vec();
        ordered.sort_by_key(|r| r.sequence);
        let (applied_through, edited) = replay_records(&ordered, key, &mut storage);

        if self.uniform_compaction {
            storage.compact();
        }

        if token.is_cancelled() {
            return Err(GenerationError::Cancelled(key));
        }

        log::trace!(
            "[GEN] {:?} generated ({} edits, uniform: {})",
            key,
            ordered.len(),
            storage.is_uniform()
        );

        Ok(GeneratedChunk {
            key,
            generation: token.generation(),
            storage,
            applied_through,
            edited,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
