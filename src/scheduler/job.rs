// ============================================
// Job - Единица фоновой работы
// ============================================

use std::cmp::Ordering;

use crate::edit::EditRecord;
use crate::generation::{GeneratedChunk, GenerationError};
use crate::math::{ChunkKey, CHUNK_SIZE};
use crate::meshing::MeshArtifact;
use crate::voxel::{CancelToken, Neighborhood};

/// Вид задачи. Порядок вариантов = порядок при равной дистанции.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JobKind {
    Generate,
    Mesh,
}

/// Ключ приоритета: меньше = раньше
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JobPriority {
    /// Корзина дистанции до наблюдателя (размер чанка LOD 0)
    pub bucket: u32,
    /// Sequence последней правки чанка (свежее = раньше)
    pub recency: u64,
    pub kind: JobKind,
    /// FIFO номер, выдаётся очередью
    pub order: u64,
}

impl JobPriority {
    pub fn new(distance: f32, recency: u64, kind: JobKind, boosted: bool) -> Self {
        let bucket = if boosted {
            0
        } else {
            (distance.max(0.0) / CHUNK_SIZE as f32) as u32 + 1
        };
        Self { bucket, recency, kind, order: 0 }
    }
}

impl Ord for JobPriority {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bucket
            .cmp(&other.bucket)
            .then_with(|| other.recency.cmp(&self.recency))
            .then_with(|| self.kind.cmp(&other.kind))
            .then_with(|| self.order.cmp(&other.order))
    }
}

impl PartialOrd for JobPriority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Clone, Debug)]
pub struct Job {
    pub kind: JobKind,
    pub key: ChunkKey,
    /// Отменяется, когда поколение чанка уходит вперёд
    pub token: CancelToken,
    pub priority: JobPriority,
}

impl Job {
    pub fn new(kind: JobKind, key: ChunkKey, token: CancelToken, priority: JobPriority) -> Self {
        Self { kind, key, token, priority: JobPriority { kind, ..priority } }
    }
}

/// Данные, собранные на главном потоке перед отправкой воркеру
pub enum JobPayload {
    Generate { edits: Vec<EditRecord> },
    Mesh { hood: Neighborhood },
}

pub enum JobOutput {
    Generated(Result<GeneratedChunk, GenerationError>),
    Meshed(MeshArtifact),
    /// Воркер увидел отмену и бросил работу
    Cancelled,
    /// Паника внутри меширования
    Panicked(String),
}

/// Результат задачи в очереди завершений
pub struct Completion {
    pub kind: JobKind,
    pub key: ChunkKey,
    pub token: CancelToken,
    pub output: JobOutput,
}

impl Completion {
    /// Результат устарел: поколение чанка ушло вперёд или воркер бросил работу
    pub fn is_stale(&self) -> bool {
        self.token.is_cancelled()
            || matches!(
                self.output,
                JobOutput::Cancelled | JobOutput::Generated(Err(GenerationError::Cancelled(_)))
            )
    }
}
