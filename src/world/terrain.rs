// ============================================
// Voxel Terrain - Координатор одного воксельного тома
// ============================================
//
// Владеет хранилищем, октодеревом, журналом правок и планировщиком.
// Всё, кроме воркеров, живёт на потоке вызывающего:
//   update_focus() -> какие листья нужны,
//   tick()         -> завершения, новые задачи, выгрузка,
//   apply_edit()   -> журнал + инвалидация + задачи с бустом.
//
// Последующие задачи (меш после генерации, перемеш соседей) копятся в
// followups, пока планировщик держит TerrainState, и ставятся после тика.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ultraviolet::Vec3;

use crate::core::{TerrainError, TerrainSettings};
use crate::edit::{replay_records, EditLog, EditOperation, EditOutcome, EditRecord, EditShape};
use crate::generation::{GeneratedChunk, GenerationPipeline, WorldGenerator};
use crate::math::ChunkKey;
use crate::meshing::{MeshArtifact, Mesher};
use crate::octree::{FocusUpdate, InvariantViolation, LodPolicy, OctreeIndex};
use crate::save::{decode_edits, encode_edits, ChunkBlock, ChunkCodec, LoadedWorld, WorldFile, WorldSnapshot};
use crate::scheduler::{
    Completion, Job, JobKind, JobOutput, JobPayload, JobPriority, JobRunner, JobSource, Scheduler,
    TickBudget, TickReport,
};
use crate::voxel::{ChunkHandle, ChunkState, Neighborhood, VoxelStore};

use super::events::{EventQueue, MeshConsumer, TerrainEvent};
use super::stats::TerrainStats;

/// Итог загрузки файла мира
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoadSummary {
    /// Позиция наблюдателя на момент сохранения
    pub viewer: Vec3,
    pub chunks: usize,
    pub edits: usize,
    /// Отброшенные повреждённые блоки (будут перегенерированы)
    pub corrupted: usize,
}

/// Один независимый воксельный том
pub struct VoxelTerrain {
    settings: TerrainSettings,
    budget: TickBudget,
    scheduler: Scheduler,
    state: TerrainState,
    shut_down: bool,
}

impl VoxelTerrain {
    /// Создать том с внешним генератором
    pub fn new(settings: TerrainSettings, generator: Arc<dyn WorldGenerator>) -> Result<Self, TerrainError> {
        settings.validate()?;

        let pipeline = GenerationPipeline::new(generator, settings.uniform_compaction);
        let runner = JobRunner::new(pipeline, Mesher::new(settings.extraction));
        let scheduler = Scheduler::from_settings(runner, &settings);
        let state = TerrainState::new(&settings);

        log::info!(
            "[TERRAIN] Created volume: max_lod {}, view radius {}, {} workers, {:?}",
            settings.max_lod,
            settings.view_radius,
            settings.worker_threads,
            settings.extraction
        );

        Ok(Self {
            budget: TickBudget::from_settings(&settings),
            settings,
            scheduler,
            state,
            shut_down: false,
        })
    }

    /// Создать том с генератором из `settings.generator`
    pub fn from_settings(settings: TerrainSettings) -> Result<Self, TerrainError> {
        let generator = settings.generator.build()?;
        Self::new(settings, generator)
    }

    pub fn settings(&self) -> &TerrainSettings {
        &self.settings
    }

    /// Переопределить бюджет тика (по умолчанию из настроек)
    pub fn set_tick_budget(&mut self, budget: TickBudget) {
        self.budget = budget;
    }

    pub fn store(&self) -> &VoxelStore {
        &self.state.store
    }

    pub fn octree(&self) -> &OctreeIndex {
        &self.state.octree
    }

    pub fn edit_log(&self) -> &EditLog {
        &self.state.edits
    }

    pub fn viewer(&self) -> Option<Vec3> {
        self.state.viewer
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    // ---------- Фокус и тик ----------

    /// Перестроить октодерево под позицию наблюдателя
    pub fn update_focus(&mut self, viewer: Vec3) -> Result<FocusUpdate, TerrainError> {
        if self.shut_down {
            return Err(TerrainError::ShutDown);
        }
        let update = self.state.octree.update_focus(viewer, self.settings.view_radius);
        self.state.viewer = Some(viewer);

        for key in &update.removed_leaves {
            self.scheduler.cancel(JobKind::Generate, *key);
            self.scheduler.cancel(JobKind::Mesh, *key);
        }
        self.state.apply_focus(&update);
        self.flush_followups();

        let state = &self.state;
        self.scheduler.reprioritize(|job| state.priority(job.kind, job.key, job.priority.bucket == 0));
        Ok(update)
    }

    /// Один кадр: применить результаты, раздать задачи, выгрузить лишнее
    pub fn tick(&mut self) -> TickReport {
        if self.shut_down {
            return TickReport::default();
        }
        self.state.tick += 1;
        let report = self.scheduler.tick(&mut self.state, self.budget);
        self.flush_followups();
        self.state.boosted.clear();
        self.state.evict_unused(self.settings.retention_radius, self.settings.eviction_grace_ticks);
        report
    }

    /// Нет ни ожидающих, ни активных задач
    pub fn is_idle(&self) -> bool {
        self.scheduler.is_idle() && self.state.followups.is_empty()
    }

    /// Тикать, пока очередь не опустеет. false, если не уложились в `max_ticks`.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> bool {
        for _ in 0..max_ticks {
            if self.is_idle() {
                return true;
            }
            let report = self.tick();
            if report.completed == 0 && report.dispatched == 0 && !self.scheduler.is_inline() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
        self.is_idle()
    }

    // ---------- Правки ----------

    /// Применить правку, вернуть затронутые чанки
    pub fn apply_edit(
        &mut self,
        shape: EditShape,
        operation: EditOperation,
        strength: f32,
    ) -> Result<Vec<ChunkKey>, TerrainError> {
        if self.shut_down {
            return Err(TerrainError::ShutDown);
        }
        let outcome = self.state.edits.apply(&mut self.state.store, shape, operation, strength);
        Ok(self.finish_edit(outcome))
    }

    /// Закрыть кадр правок (граница для undo)
    pub fn save_frame(&mut self) {
        self.state.edits.save_frame();
    }

    /// Отменить последний кадр правок
    pub fn undo(&mut self) -> Option<Vec<ChunkKey>> {
        if self.shut_down {
            return None;
        }
        let outcome = self.state.edits.undo(&mut self.state.store)?;
        Some(self.finish_edit(outcome))
    }

    pub fn redo(&mut self) -> Option<Vec<ChunkKey>> {
        if self.shut_down {
            return None;
        }
        let outcome = self.state.edits.redo(&mut self.state.store)?;
        Some(self.finish_edit(outcome))
    }

    /// Живые записи журнала с sequence > `since`
    pub fn export_edits_since(&self, since: u64) -> Vec<EditRecord> {
        self.state.edits.export_since(since)
    }

    /// Принять записи с другой копии мира
    pub fn import_edits(&mut self, records: Vec<EditRecord>) -> Result<Vec<ChunkKey>, TerrainError> {
        if self.shut_down {
            return Err(TerrainError::ShutDown);
        }
        let outcome = self.state.edits.import(&mut self.state.store, records);
        Ok(self.finish_edit(outcome))
    }

    /// Сетевая дельта: сжатый пакет записей с sequence > `since`
    pub fn export_delta(&self, since: u64) -> Result<Vec<u8>, TerrainError> {
        let records = self.export_edits_since(since);
        Ok(encode_edits(&records, self.settings.compression_level)?)
    }

    /// Принять сетевую дельту. Повреждённый пакет отвергается целиком.
    pub fn import_delta(&mut self, bytes: &[u8]) -> Result<Vec<ChunkKey>, TerrainError> {
        let records = decode_edits(bytes)?;
        self.import_edits(records)
    }

    /// Запечь резидентные правки в снимки и убрать записи до `through`
    pub fn compact_edits(&mut self, through: u64) -> usize {
        self.state.flush_all_snapshots();
        let removed = self.state.edits.compact_through(through);
        log::debug!("[TERRAIN] Compacted {} edit records through {}", removed, through);
        removed
    }

    fn finish_edit(&mut self, outcome: EditOutcome) -> Vec<ChunkKey> {
        self.state.apply_outcome(&outcome);
        self.flush_followups();
        outcome.affected
    }

    // ---------- Чанки и меши ----------

    pub fn chunk_state(&self, key: ChunkKey) -> Option<ChunkState> {
        self.state.store.chunk_by_key(key).map(|c| c.state())
    }

    /// Причина сбоя генерации
    pub fn chunk_failure(&self, key: ChunkKey) -> Option<String> {
        self.state
            .store
            .chunk_by_key(key)
            .and_then(|c| c.failure())
            .map(str::to_string)
    }

    /// Явный повтор упавшей генерации
    pub fn retry_failed(&mut self, key: ChunkKey) -> bool {
        let retried = match self.state.store.chunk_by_key_mut(key) {
            Some(chunk) if chunk.state() == ChunkState::GenerationFailed => {
                chunk.set_state(ChunkState::Empty);
                true
            }
            _ => false,
        };
        if retried {
            self.state.request(JobKind::Generate, key);
            self.flush_followups();
        }
        retried
    }

    pub fn mesh(&self, key: ChunkKey) -> Option<Arc<MeshArtifact>> {
        self.state.meshes.get(&key).cloned()
    }

    pub fn meshes(&self) -> impl Iterator<Item = &Arc<MeshArtifact>> + '_ {
        self.state.meshes.values()
    }

    // ---------- События ----------

    pub fn pending_events(&self) -> usize {
        self.state.events.len()
    }

    pub fn drain_events(&mut self) -> Vec<TerrainEvent> {
        self.state.events.drain()
    }

    /// Отдать накопленные события потребителю
    pub fn deliver(&mut self, consumer: &mut dyn MeshConsumer) -> usize {
        self.state.events.deliver(consumer)
    }

    // ---------- Сохранение ----------

    /// Записать файл мира: журнал правок и снимки изменённых чанков
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<(), TerrainError> {
        self.state.flush_all_snapshots();
        let chunks = self.state.snapshot_blocks();
        let edits: Vec<EditRecord> = self.state.edits.records().copied().collect();
        let viewer = self.state.viewer.unwrap_or_else(Vec3::zero);

        let snapshot = WorldSnapshot {
            viewer: [viewer.x, viewer.y, viewer.z],
            last_sequence: self.state.edits.last_sequence(),
            compacted_through: self.state.edits.compacted_through(),
            edits,
            chunks,
        };
        WorldFile::save(path, &snapshot, self.settings.compression_level)?;
        log::info!(
            "[TERRAIN] Saved {} chunk blocks and {} edits",
            snapshot.chunks.len(),
            snapshot.edits.len()
        );
        Ok(())
    }

    /// Загрузить файл мира. Резидентные чанки пересоздаются из снимков
    /// файла и журнала правок.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<LoadSummary, TerrainError> {
        if self.shut_down {
            return Err(TerrainError::ShutDown);
        }
        let LoadedWorld { snapshot, corrupted } = WorldFile::load(path)?;
        let summary = LoadSummary {
            viewer: Vec3::from(snapshot.viewer),
            chunks: snapshot.chunks.len(),
            edits: snapshot.edits.len(),
            corrupted: corrupted.len(),
        };

        self.state.reset_from(snapshot, self.settings.max_lod);
        self.flush_followups();
        Ok(summary)
    }

    // ---------- Жизненный цикл ----------

    /// Остановить раздачу, дождаться воркеров, сбросить изменённые чанки в снимки
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.scheduler.shutdown(&mut self.state);
        self.state.followups.clear();
        let flushed = self.state.flush_all_snapshots();
        self.shut_down = true;
        log::info!("[TERRAIN] Shut down, {} dirty chunks flushed", flushed);
    }

    /// Проверка инвариантов октодерева (баланс 2:1 и полнота деления)
    pub fn check_invariants(&self) -> Result<(), InvariantViolation> {
        self.state.octree.check_balance()?;
        self.state.octree.check_structure()
    }

    pub fn stats(&self) -> TerrainStats {
        let state = &self.state;
        let mesh_bytes: usize = state.meshes.values().map(|m| m.memory_usage()).sum();
        let snapshot_bytes: usize = state.snapshots.values().map(|s| s.len()).sum();
        TerrainStats {
            tick: state.tick,
            resident_chunks: state.store.len(),
            uniform_chunks: state.store.uniform_count(),
            leaves: state.octree.leaf_count(),
            octree_nodes: state.octree.node_count(),
            queued_jobs: self.scheduler.queued_len(),
            active_jobs: self.scheduler.active_len(),
            meshes: state.meshes.len(),
            triangles: state.meshes.values().map(|m| m.triangle_count()).sum(),
            edits: state.edits.len(),
            snapshots: state.snapshots.len(),
            unsaved_samples: state.store.iter().map(|(_, c)| c.edited_samples().count()).sum(),
            failed_chunks: state
                .store
                .iter()
                .filter(|(_, c)| c.state() == ChunkState::GenerationFailed)
                .count(),
            memory_bytes: state.store.memory_usage() + mesh_bytes + snapshot_bytes,
        }
    }

    /// Поставить накопленные последующие задачи
    fn flush_followups(&mut self) {
        for (kind, key) in std::mem::take(&mut self.state.followups) {
            if let Some(job) = self.state.make_job(kind, key) {
                self.scheduler.enqueue(job);
            }
        }
    }
}

impl Drop for VoxelTerrain {
    fn drop(&mut self) {
        if !self.shut_down {
            self.scheduler.shutdown(&mut self.state);
        }
    }
}

/// Всё, что трогает главный поток (источник задач для планировщика)
struct TerrainState {
    store: VoxelStore,
    octree: OctreeIndex,
    edits: EditLog,
    meshes: HashMap<ChunkKey, Arc<MeshArtifact>>,
    /// Закодированные блоки выгруженных (и сохранённых) чанков
    snapshots: HashMap<ChunkKey, Vec<u8>>,
    codec: ChunkCodec,
    events: EventQueue,
    followups: Vec<(JobKind, ChunkKey)>,
    /// Последняя правка, затронувшая чанк
    recency: HashMap<ChunkKey, u64>,
    /// Чанки, правленые с прошлого тика
    boosted: HashSet<ChunkKey>,
    /// Чанки, чьё меширование уже упало один раз
    mesh_retried: HashSet<ChunkKey>,
    edit_priority_boost: bool,
    viewer: Option<Vec3>,
    tick: u64,
}

impl TerrainState {
    fn new(settings: &TerrainSettings) -> Self {
        Self {
            store: VoxelStore::new(settings.uniform_compaction),
            octree: OctreeIndex::new(LodPolicy::from_settings(settings)),
            edits: EditLog::new(settings.max_lod),
            meshes: HashMap::new(),
            snapshots: HashMap::new(),
            codec: ChunkCodec::new(settings.compression_level),
            events: EventQueue::default(),
            followups: Vec::new(),
            recency: HashMap::new(),
            boosted: HashSet::new(),
            mesh_retried: HashSet::new(),
            edit_priority_boost: settings.edit_priority_boost,
            viewer: None,
            tick: 0,
        }
    }

    fn request(&mut self, kind: JobKind, key: ChunkKey) {
        self.followups.push((kind, key));
    }

    fn priority(&self, kind: JobKind, key: ChunkKey, boosted: bool) -> JobPriority {
        let distance = self.viewer.map(|v| key.distance_to(v)).unwrap_or(0.0);
        let recency = self.recency.get(&key).copied().unwrap_or(0);
        JobPriority::new(distance, recency, kind, boosted)
    }

    /// Задача со свежим токеном; только для резидентных листьев
    fn make_job(&self, kind: JobKind, key: ChunkKey) -> Option<Job> {
        if !self.octree.is_leaf(key) {
            return None;
        }
        let chunk = self.store.chunk_by_key(key)?;
        let boosted = self.edit_priority_boost && self.boosted.contains(&key);
        Some(Job::new(kind, key, chunk.cancel_token(), self.priority(kind, key, boosted)))
    }

    fn apply_focus(&mut self, update: &FocusUpdate) {
        for key in &update.removed_leaves {
            if let Some(handle) = self.store.get(*key) {
                let _ = self.store.release_index_ref(handle);
                self.store.touch(handle, self.tick);
            }
            if self.meshes.remove(key).is_some() {
                self.events.push(TerrainEvent::MeshRemoved(*key));
            }
        }

        for key in &update.created_leaves {
            let handle = self.store.allocate(*key);
            let _ = self.store.add_index_ref(handle);
            self.store.touch(handle, self.tick);
            self.ensure_data(*key, handle);
        }

        // у соседей изменившихся листьев поменялся переход LOD
        let changed: Vec<ChunkKey> = update
            .created_leaves
            .iter()
            .chain(update.removed_leaves.iter())
            .copied()
            .collect();
        if changed.is_empty() {
            return;
        }
        let remesh: Vec<ChunkKey> = self
            .meshes
            .keys()
            .filter(|k| changed.iter().any(|c| touches(**k, *c)))
            .copied()
            .collect();
        for key in remesh {
            self.request(JobKind::Mesh, key);
        }
    }

    /// Лист появился: меш, восстановление из снимка или генерация
    fn ensure_data(&mut self, key: ChunkKey, handle: ChunkHandle) {
        let (state, has_data) = match self.store.chunk(handle) {
            Ok(chunk) => (chunk.state(), chunk.has_data()),
            Err(_) => return,
        };
        if has_data {
            self.request(JobKind::Mesh, key);
            return;
        }
        if state != ChunkState::Empty {
            // Generating: результат уже в пути; GenerationFailed: только retry
            return;
        }
        if self.restore_snapshot(key, handle) {
            self.request(JobKind::Mesh, key);
            self.remesh_touching(key);
        } else {
            self.request(JobKind::Generate, key);
        }
    }

    /// Поднять чанк из снимка. false = снимка нет или он не годится.
    fn restore_snapshot(&mut self, key: ChunkKey, handle: ChunkHandle) -> bool {
        let block = match self.snapshots.get(&key).map(|bytes| self.codec.decode(bytes)) {
            None => return false,
            Some(Ok(block)) if block.key == key => block,
            Some(Ok(block)) => {
                log::warn!("[SAVE] Snapshot for {:?} holds block {:?}, dropped", key, block.key);
                self.snapshots.remove(&key);
                return false;
            }
            Some(Err(err)) => {
                log::warn!("[SAVE] Dropped corrupted snapshot of {:?}: {}", key, err);
                self.snapshots.remove(&key);
                return false;
            }
        };

        // запечённые правки должны совпадать с живым журналом
        let floor = self.edits.compacted_through();
        let live = self.edits.records_for(key);
        let baked: Vec<u64> = block.edits.iter().map(|r| r.sequence).filter(|s| *s > floor).collect();
        let expected: Vec<u64> = live
            .iter()
            .map(|r| r.sequence)
            .filter(|s| *s > floor && *s <= block.applied_through)
            .collect();
        if baked != expected {
            log::debug!("[SAVE] Snapshot of {:?} is out of date with the edit log, regenerating", key);
            self.snapshots.remove(&key);
            return false;
        }

        let later: Vec<EditRecord> = live.into_iter().filter(|r| r.sequence > block.applied_through).collect();
        let mut storage = block.storage;
        let (last, changed) = replay_records(&later, key, &mut storage);
        if self.store.write(handle, storage).is_err() {
            return false;
        }
        if let Ok(chunk) = self.store.chunk_mut(handle) {
            for idx in changed {
                chunk.mark_edited(idx);
            }
            chunk.set_applied_through(block.applied_through.max(last));
            chunk.set_state(ChunkState::Generated);
        }
        true
    }

    /// Перемешать листья с данными, читающие сэмплы `key`
    fn remesh_touching(&mut self, key: ChunkKey) {
        let octree = &self.octree;
        let touching: Vec<ChunkKey> = self
            .store
            .iter()
            .map(|(_, chunk)| chunk)
            .filter(|chunk| chunk.has_data())
            .map(|chunk| chunk.key())
            .filter(|k| *k != key && k.lod <= key.lod && octree.is_leaf(*k) && touches(*k, key))
            .collect();
        for k in touching {
            self.request(JobKind::Mesh, k);
        }
    }

    fn apply_outcome(&mut self, outcome: &EditOutcome) {
        let newest = outcome.records.iter().map(|r| r.sequence).max().unwrap_or(0);
        for key in outcome.affected.iter().chain(&outcome.stale).chain(&outcome.reset) {
            let recency = self.recency.entry(*key).or_insert(0);
            *recency = (*recency).max(newest);
            self.boosted.insert(*key);
        }

        for key in &outcome.reset {
            self.request(JobKind::Generate, *key);
        }
        for key in outcome.affected.iter().chain(&outcome.stale) {
            if outcome.reset.contains(key) {
                continue;
            }
            if self.store.chunk_by_key(*key).map(|c| c.state()) == Some(ChunkState::Stale) {
                self.request(JobKind::Mesh, *key);
            }
        }
    }

    fn apply_generated(&mut self, handle: ChunkHandle, generated: GeneratedChunk) {
        let key = generated.key;
        if let Err(err) = self.store.write(handle, generated.storage) {
            log::warn!("[GEN] Could not store samples for {:?}: {}", key, err);
            return;
        }
        if let Ok(chunk) = self.store.chunk_mut(handle) {
            for idx in &generated.edited {
                chunk.mark_edited(*idx);
            }
            chunk.set_applied_through(generated.applied_through);
            chunk.set_state(ChunkState::Generated);
        }
        self.request(JobKind::Mesh, key);
        self.remesh_touching(key);
    }

    fn fail_generation(&mut self, handle: ChunkHandle, key: ChunkKey, reason: String) {
        log::warn!("[GEN] Generation failed for {:?}: {}", key, reason);
        if let Ok(chunk) = self.store.chunk_mut(handle) {
            chunk.fail(reason.clone());
        }
        if self.meshes.remove(&key).is_some() {
            self.events.push(TerrainEvent::MeshRemoved(key));
        }
        self.events.push(TerrainEvent::GenerationFailed { key, reason });
    }

    /// Первая паника - один повтор, вторая - меш снимается и уходит MeshFailed
    fn mesh_panicked(&mut self, kind: JobKind, key: ChunkKey, message: String) {
        if self.mesh_retried.insert(key) {
            log::warn!("[MESH] {:?} job failed: {}, retrying once", kind, message);
            self.request(JobKind::Mesh, key);
            return;
        }
        self.mesh_retried.remove(&key);
        log::error!("[MESH] {:?} job failed again: {}", kind, message);
        if self.meshes.remove(&key).is_some() {
            self.events.push(TerrainEvent::MeshRemoved(key));
        }
        self.events.push(TerrainEvent::MeshFailed { key, reason: message });
    }

    fn apply_mesh(&mut self, handle: ChunkHandle, artifact: MeshArtifact) {
        let key = artifact.key;
        self.mesh_retried.remove(&key);
        if !self.octree.is_leaf(key) {
            return;
        }
        if let Ok(chunk) = self.store.chunk_mut(handle) {
            if chunk.has_data() {
                chunk.set_state(ChunkState::Meshed);
            }
        }
        let artifact = Arc::new(artifact);
        self.meshes.insert(key, Arc::clone(&artifact));
        self.events.push(TerrainEvent::MeshReady(artifact));
    }

    /// Чанк с сэмплами, изменёнными после прошлого снимка -> блок в таблице снимков
    fn flush_snapshot(&mut self, handle: ChunkHandle) -> bool {
        let mut changed = 0;
        let block = match self.store.chunk(handle) {
            Ok(chunk) if chunk.is_dirty() && chunk.has_data() => {
                changed = chunk.edited_samples().count();
                let key = chunk.key();
                let applied = chunk.applied_through();
                match chunk.storage() {
                    Some(storage) => ChunkBlock {
                        key,
                        storage: storage.clone(),
                        edits: self
                            .edits
                            .records_for(key)
                            .into_iter()
                            .filter(|r| r.sequence <= applied)
                            .collect(),
                        applied_through: applied,
                    },
                    None => return false,
                }
            }
            _ => return false,
        };
        match self.codec.encode(&block) {
            Ok(bytes) => {
                log::debug!("[SAVE] Snapshot of {:?}: {} changed samples, {} bytes", block.key, changed, bytes.len());
                self.snapshots.insert(block.key, bytes);
                if let Ok(chunk) = self.store.chunk_mut(handle) {
                    chunk.clear_dirty();
                }
                true
            }
            Err(err) => {
                log::warn!("[SAVE] Could not snapshot {:?}: {}", block.key, err);
                false
            }
        }
    }

    fn flush_all_snapshots(&mut self) -> usize {
        let handles: Vec<ChunkHandle> = self.store.iter().map(|(h, _)| h).collect();
        handles.into_iter().filter(|h| self.flush_snapshot(*h)).count()
    }

    /// Раскодировать таблицу снимков для файла мира
    fn snapshot_blocks(&mut self) -> Vec<ChunkBlock> {
        let mut blocks = Vec::with_capacity(self.snapshots.len());
        let mut corrupted = Vec::new();
        for (key, bytes) in &self.snapshots {
            match self.codec.decode(bytes) {
                Ok(block) => blocks.push(block),
                Err(err) => {
                    log::warn!("[SAVE] Dropped corrupted snapshot of {:?}: {}", key, err);
                    corrupted.push(*key);
                }
            }
        }
        for key in corrupted {
            self.snapshots.remove(&key);
        }
        blocks.sort_by_key(|b| b.key);
        blocks
    }

    /// Заменить журнал и снимки загруженными, пересоздать листья
    fn reset_from(&mut self, snapshot: WorldSnapshot, max_lod: u8) {
        let handles: Vec<ChunkHandle> = self.store.iter().map(|(h, _)| h).collect();
        for handle in handles {
            let _ = self.store.clear(handle);
        }

        self.edits = EditLog::new(max_lod);
        self.edits.restore(snapshot.edits, snapshot.compacted_through);
        self.recency.clear();
        self.boosted.clear();
        self.mesh_retried.clear();

        self.snapshots.clear();
        for block in snapshot.chunks {
            match self.codec.encode(&block) {
                Ok(bytes) => {
                    self.snapshots.insert(block.key, bytes);
                }
                Err(err) => log::warn!("[SAVE] Could not re-encode block {:?}: {}", block.key, err),
            }
        }

        let leaves: Vec<ChunkKey> = self.octree.leaves().collect();
        for key in leaves {
            if let Some(handle) = self.store.get(key) {
                self.ensure_data(key, handle);
            }
        }
    }

    /// Выгрузить чанки без ссылок за радиусом удержания
    fn evict_unused(&mut self, retention_radius: f32, grace_ticks: u64) -> usize {
        let viewer = match self.viewer {
            Some(v) => v,
            None => return 0,
        };
        let tick = self.tick;
        let victims: Vec<(ChunkHandle, ChunkKey)> = self
            .store
            .iter()
            .filter(|(_, c)| {
                !c.is_referenced()
                    && tick.saturating_sub(c.last_used()) >= grace_ticks
                    && c.key().distance_to(viewer) > retention_radius
            })
            .map(|(h, c)| (h, c.key()))
            .collect();
        if victims.is_empty() {
            return 0;
        }

        let mut flushed = 0;
        for (handle, key) in &victims {
            if self.flush_snapshot(*handle) {
                flushed += 1;
            }
            match self.store.evict(*handle) {
                Ok(_) => {
                    self.recency.remove(key);
                    self.boosted.remove(key);
                    self.mesh_retried.remove(key);
                }
                Err(err) => log::warn!("[EVICT] Could not evict {:?}: {}", key, err),
            }
        }
        log::debug!("[EVICT] Evicted {} chunks, {} flushed to snapshots", victims.len(), flushed);
        victims.len()
    }
}

impl JobSource for TerrainState {
    fn prepare(&mut self, job: &Job) -> Option<JobPayload> {
        if !self.octree.is_leaf(job.key) {
            return None;
        }
        let handle = self.store.get(job.key)?;
        let payload = match job.kind {
            JobKind::Generate => {
                let chunk = self.store.chunk_mut(handle).ok()?;
                if chunk.state() != ChunkState::Empty {
                    return None;
                }
                chunk.set_state(ChunkState::Generating);
                JobPayload::Generate { edits: self.edits.records_for(job.key) }
            }
            JobKind::Mesh => {
                // генерация всегда применена раньше любого меширования
                let center = self
                    .store
                    .chunk(handle)
                    .ok()
                    .filter(|c| c.has_data())
                    .and_then(|c| c.snapshot())?;
                let links = self.octree.neighbors(job.key);
                JobPayload::Mesh { hood: Neighborhood::gather(&self.store, job.key, center, &links) }
            }
        };
        let _ = self.store.add_job_ref(handle);
        self.store.touch(handle, self.tick);
        Some(payload)
    }

    fn complete(&mut self, completion: Completion) {
        let Completion { kind, key, output, .. } = completion;
        let handle = match self.store.get(key) {
            Some(handle) => handle,
            None => {
                log::debug!("[TERRAIN] Result for evicted chunk {:?} dropped", key);
                return;
            }
        };
        let _ = self.store.release_job_ref(handle);
        self.store.touch(handle, self.tick);

        match output {
            JobOutput::Generated(Ok(generated)) => self.apply_generated(handle, generated),
            JobOutput::Generated(Err(err)) => self.fail_generation(handle, key, err.to_string()),
            JobOutput::Meshed(artifact) => self.apply_mesh(handle, artifact),
            JobOutput::Panicked(message) => self.mesh_panicked(kind, key, message),
            JobOutput::Cancelled => {}
        }
    }

    fn discard(&mut self, kind: JobKind, key: ChunkKey, dispatched: bool) {
        let handle = match self.store.get(key) {
            Some(handle) => handle,
            None => return,
        };
        if dispatched {
            let _ = self.store.release_job_ref(handle);
        }
        let needs_work = match self.store.chunk_mut(handle) {
            Ok(chunk) => {
                if kind == JobKind::Generate && chunk.state() == ChunkState::Generating {
                    chunk.set_state(ChunkState::Empty);
                }
                match kind {
                    JobKind::Generate => chunk.state() == ChunkState::Empty,
                    JobKind::Mesh => matches!(chunk.state(), ChunkState::Generated | ChunkState::Stale),
                }
            }
            Err(_) => false,
        };
        if needs_work && self.octree.is_leaf(key) {
            self.request(kind, key);
        }
    }
}

/// Читает ли меш `a` сэмплы чанка `b` (включая слой за границей)
fn touches(a: ChunkKey, b: ChunkKey) -> bool {
    a != b && a.sample_bounds().expand(a.step()).intersects(&b.sample_bounds())
}
