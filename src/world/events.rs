// ============================================
// Terrain Events - Очередь событий для потребителя мешей
// ============================================

use std::collections::VecDeque;
use std::sync::Arc;

use crate::math::ChunkKey;
use crate::meshing::MeshArtifact;

/// Потребитель мешей (рендер, физика). Ядро не знает, как меш загружается.
pub trait MeshConsumer {
    /// Готов новый меш чанка; предыдущий меш этого чанка заменяется целиком
    fn mesh_ready(&mut self, artifact: &MeshArtifact);
    /// Чанк больше не лист, его меш нужно убрать
    fn mesh_removed(&mut self, key: ChunkKey);
    /// Генерация чанка упала (повтор только через retry_failed)
    fn generation_failed(&mut self, key: ChunkKey, reason: &str);
    /// Меширование упало и после повтора; следующая попытка после изменения чанка
    fn mesh_failed(&mut self, key: ChunkKey, reason: &str);
}

#[derive(Clone, Debug)]
pub enum TerrainEvent {
    MeshReady(Arc<MeshArtifact>),
    MeshRemoved(ChunkKey),
    GenerationFailed { key: ChunkKey, reason: String },
    MeshFailed { key: ChunkKey, reason: String },
}

impl TerrainEvent {
    pub fn key(&self) -> ChunkKey {
        match self {
            TerrainEvent::MeshReady(artifact) => artifact.key,
            TerrainEvent::MeshRemoved(key) => *key,
            TerrainEvent::GenerationFailed { key, .. } | TerrainEvent::MeshFailed { key, .. } => *key,
        }
    }

    /// Передать событие потребителю
    pub fn dispatch(&self, consumer: &mut dyn MeshConsumer) {
        match self {
            TerrainEvent::MeshReady(artifact) => consumer.mesh_ready(artifact),
            TerrainEvent::MeshRemoved(key) => consumer.mesh_removed(*key),
            TerrainEvent::GenerationFailed { key, reason } => consumer.generation_failed(*key, reason),
            TerrainEvent::MeshFailed { key, reason } => consumer.mesh_failed(*key, reason),
        }
    }
}

/// FIFO событий между тиками
#[derive(Default)]
pub struct EventQueue {
    events: VecDeque<TerrainEvent>,
}

impl EventQueue {
    pub fn push(&mut self, event: TerrainEvent) {
        self.events.push_back(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn drain(&mut self) -> Vec<TerrainEvent> {
        self.events.drain(..).collect()
    }

    /// Отдать все события потребителю, вернуть их количество
    pub fn deliver(&mut self, consumer: &mut dyn MeshConsumer) -> usize {
        let mut count = 0;
        while let Some(event) = self.events.pop_front() {
            event.dispatch(consumer);
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log {
        ready: Vec<ChunkKey>,
        removed: Vec<ChunkKey>,
        failed: Vec<(ChunkKey, String)>,
        mesh_failed: Vec<ChunkKey>,
    }

    impl MeshConsumer for Log {
        fn mesh_ready(&mut self, artifact: &MeshArtifact) {
            self.ready.push(artifact.key);
        }
        fn mesh_removed(&mut self, key: ChunkKey) {
            self.removed.push(key);
        }
        fn generation_failed(&mut self, key: ChunkKey, reason: &str) {
            self.failed.push((key, reason.to_string()));
        }
        fn mesh_failed(&mut self, key: ChunkKey, _reason: &str) {
            self.mesh_failed.push(key);
        }
    }

    #[test]
    fn test_deliver_in_order() {
        let a = ChunkKey::new(0, 0, 0, 0);
        let b = ChunkKey::new(1, 0, 0, 0);
        let mut queue = EventQueue::default();
        queue.push(TerrainEvent::MeshReady(Arc::new(MeshArtifact::empty(a, 1, 0, 0))));
        queue.push(TerrainEvent::MeshRemoved(b));
        queue.push(TerrainEvent::GenerationFailed { key: b, reason: "boom".into() });
        queue.push(TerrainEvent::MeshFailed { key: a, reason: "panic".into() });

        let mut log = Log::default();
        assert_eq!(queue.deliver(&mut log), 4);
        assert!(queue.is_empty());
        assert_eq!(log.ready, vec![a]);
        assert_eq!(log.removed, vec![b]);
        assert_eq!(log.failed, vec![(b, "boom".to_string())]);
        assert_eq!(log.mesh_failed, vec![a]);
    }
}
