// ============================================
// Edit Log - Упорядоченный журнал правок
// ============================================
//
// Записи лежат в BTreeMap по sequence + пространственный индекс ячеек
// для ленивого реплея при генерации. Резидентные чанки с данными
// правятся сразу, их соседи в радиусе правки помечаются Stale.
// Кадры (save_frame) дают undo/redo.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::math::{ChunkKey, VoxelBox};
use crate::voxel::{ChunkState, ChunkStorage, VoxelStore};

use super::record::{EditOperation, EditRecord, EditShape};

/// Размер ячейки пространственного индекса (единицы LOD 0)
const CELL_SIZE: i32 = 256;

/// Что изменила правка
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EditOutcome {
    /// Записи, попавшие в журнал
    pub records: Vec<EditRecord>,
    /// Чанки, пересекающие область правки (на всех резидентных LOD)
    pub affected: Vec<ChunkKey>,
    /// Соседи, которым нужен только новый меш
    pub stale: Vec<ChunkKey>,
    /// Чанки, сброшенные для полной перегенерации
    pub reset: Vec<ChunkKey>,
}

impl EditOutcome {
    fn merge(&mut self, other: EditOutcome) {
        self.records.extend(other.records);
        for key in other.affected {
            if !self.affected.contains(&key) {
                self.affected.push(key);
            }
        }
        for key in other.stale {
            if !self.stale.contains(&key) && !self.affected.contains(&key) {
                self.stale.push(key);
            }
        }
        for key in other.reset {
            if !self.reset.contains(&key) {
                self.reset.push(key);
            }
        }
    }
}

pub struct EditLog {
    records: BTreeMap<u64, EditRecord>,
    cells: HashMap<[i32; 3], Vec<u64>>,
    next_sequence: u64,
    /// Максимальный шаг сетки (для полосы в индексе ячеек)
    max_step: i32,
    open_frame: Vec<u64>,
    frames: Vec<Vec<u64>>,
    redo: Vec<Vec<EditRecord>>,
    compacted_through: u64,
}

impl EditLog {
    pub fn new(max_lod: u8) -> Self {
        Self {
            records: BTreeMap::new(),
            cells: HashMap::new(),
            next_sequence: 1,
            max_step: 1 << max_lod,
            open_frame: Vec::new(),
            frames: Vec::new(),
            redo: Vec::new(),
            compacted_through: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Последний выданный sequence (0 если журнал пуст)
    pub fn last_sequence(&self) -> u64 {
        self.next_sequence - 1
    }

    pub fn compacted_through(&self) -> u64 {
        self.compacted_through
    }

    pub fn get(&self, sequence: u64) -> Option<&EditRecord> {
        self.records.get(&sequence)
    }

    /// Применить правку: записать в журнал, поправить резидентные чанки
    pub fn apply(
        &mut self,
        store: &mut VoxelStore,
        shape: EditShape,
        operation: EditOperation,
        strength: f32,
    ) -> EditOutcome {
        let record = EditRecord::new(self.next_sequence, shape, operation, strength);
        self.next_sequence += 1;
        self.insert(record);
        self.open_frame.push(record.sequence);
        self.redo.clear();
        let mut outcome = Self::apply_resident(store, &record);
        outcome.records.push(record);
        outcome
    }

    fn insert(&mut self, record: EditRecord) {
        let area = record.shape.influence_box(2.0 * self.max_step as f32);
        for cell in cells_of(&area) {
            self.cells.entry(cell).or_default().push(record.sequence);
        }
        self.records.insert(record.sequence, record);
    }

    fn remove(&mut self, sequence: u64) -> Option<EditRecord> {
        let record = self.records.remove(&sequence)?;
        let area = record.shape.influence_box(2.0 * self.max_step as f32);
        for cell in cells_of(&area) {
            if let Some(list) = self.cells.get_mut(&cell) {
                list.retain(|s| *s != sequence);
                if list.is_empty() {
                    self.cells.remove(&cell);
                }
            }
        }
        Some(record)
    }

    /// Применить запись к резидентным чанкам
    fn apply_resident(store: &mut VoxelStore, record: &EditRecord) -> EditOutcome {
        let mut outcome = EditOutcome::default();
        let keys: Vec<ChunkKey> = store.keys().collect();

        for key in keys {
            let step = key.step();
            let samples = key.sample_bounds();
            let handle = match store.get(key) {
                Some(h) => h,
                None => continue,
            };
            if record.influence(step).intersects(&samples) {
                outcome.affected.push(key);
                let chunk = match store.chunk_mut(handle) {
                    Ok(c) => c,
                    Err(_) => continue,
                };
                match chunk.state() {
                    ChunkState::Generated | ChunkState::Meshed | ChunkState::Stale => {
                        let changed = match chunk.storage_mut() {
                            Some(storage) => record.apply_to(key, storage),
                            None => Vec::new(),
                        };
                        for idx in &changed {
                            chunk.mark_edited(*idx);
                        }
                        chunk.set_applied_through(record.sequence);
                        if !changed.is_empty() {
                            chunk.bump_generation();
                            chunk.set_state(ChunkState::Stale);
                        }
                    }
                    ChunkState::Generating => {
                        // результат генерации без этой правки не нужен
                        chunk.bump_generation();
                        chunk.set_state(ChunkState::Empty);
                        outcome.reset.push(key);
                    }
                    ChunkState::Empty | ChunkState::GenerationFailed => {}
                }
            } else if neighbor_zone(record, step).intersects(&samples.expand(step)) {
                if let Ok(chunk) = store.chunk(handle) {
                    if chunk.has_data() {
                        let _ = store.invalidate(handle);
                        outcome.stale.push(key);
                    }
                }
            }
        }
        outcome
    }

    /// Записи, влияющие на чанк, в порядке sequence
    pub fn records_for(&self, key: ChunkKey) -> Vec<EditRecord> {
        let samples = key.sample_bounds();
        let step = key.step();
        let mut seqs = BTreeSet::new();
        for cell in cells_of(&samples) {
            if let Some(list) = self.cells.get(&cell) {
                seqs.extend(list.iter().copied());
            }
        }
        seqs.into_iter()
            .filter_map(|s| self.records.get(&s))
            .filter(|r| r.influence(step).intersects(&samples))
            .copied()
            .collect()
    }

    /// Реплей всех записей чанка в свежие данные.
    /// Возвращает (последний применённый sequence, изменённые сэмплы).
    pub fn replay(&self, key: ChunkKey, storage: &mut ChunkStorage) -> (u64, Vec<usize>) {
        replay_records(&self.records_for(key), key, storage)
    }

    /// Записи с sequence > `since` (живые, без отменённых)
    pub fn export_since(&self, since: u64) -> Vec<EditRecord> {
        self.records
            .range(since.saturating_add(1)..)
            .map(|(_, r)| *r)
            .collect()
    }

    /// Принять записи извне. Дубликаты пропускаются. Запись старше уже
    /// применённых к чанку сбрасывает этот чанк на полную перегенерацию.
    pub fn import(&mut self, store: &mut VoxelStore, mut incoming: Vec<EditRecord>) -> EditOutcome {
        incoming.sort_by_key(|r| r.sequence);
        let mut outcome = EditOutcome::default();

        for record in incoming {
            if self.records.contains_key(&record.sequence) || record.sequence <= self.compacted_through {
                log::debug!("skipping duplicate edit {}", record.sequence);
                continue;
            }
            self.insert(record);
            self.next_sequence = self.next_sequence.max(record.sequence + 1);

            let mut step_outcome = EditOutcome::default();
            let keys: Vec<ChunkKey> = store.keys().collect();
            let mut in_order = Vec::new();
            for key in keys {
                if !record.influence(key.step()).intersects(&key.sample_bounds()) {
                    continue;
                }
                let out_of_order = store
                    .chunk_by_key(key)
                    .map(|c| c.has_data() && c.applied_through() > record.sequence)
                    .unwrap_or(false);
                if out_of_order {
                    if let Some(handle) = store.get(key) {
                        let _ = store.clear(handle);
                    }
                    step_outcome.reset.push(key);
                    step_outcome.affected.push(key);
                } else {
                    in_order.push(key);
                }
            }
            if !in_order.is_empty() || step_outcome.reset.is_empty() {
                let applied = Self::apply_resident(store, &record);
                step_outcome.merge(applied);
            }
            step_outcome.records.push(record);
            outcome.merge(step_outcome);
        }
        outcome
    }

    /// Закрыть текущий кадр правок
    pub fn save_frame(&mut self) {
        if !self.open_frame.is_empty() {
            self.frames.push(std::mem::take(&mut self.open_frame));
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.open_frame.is_empty() || !self.frames.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// Отменить последний кадр. Затронутые чанки сбрасываются в Empty.
    pub fn undo(&mut self, store: &mut VoxelStore) -> Option<EditOutcome> {
        self.save_frame();
        let frame = self.frames.pop()?;
        let mut removed = Vec::new();
        for seq in frame {
            if let Some(record) = self.remove(seq) {
                removed.push(record);
            }
        }
        if removed.is_empty() {
            return None;
        }
        let mut outcome = EditOutcome::default();
        let keys: Vec<ChunkKey> = store.keys().collect();
        for key in keys {
            let hit = removed
                .iter()
                .any(|r| r.influence(key.step()).intersects(&key.sample_bounds()));
            if !hit {
                continue;
            }
            if let Some(handle) = store.get(key) {
                let _ = store.clear(handle);
            }
            outcome.affected.push(key);
            outcome.reset.push(key);
        }
        outcome.records = removed.clone();
        self.redo.push(removed);
        Some(outcome)
    }

    /// Вернуть последний отменённый кадр
    pub fn redo(&mut self, store: &mut VoxelStore) -> Option<EditOutcome> {
        let frame = self.redo.pop()?;
        self.save_frame();
        let mut outcome = EditOutcome::default();
        let mut seqs = Vec::with_capacity(frame.len());
        for record in frame {
            self.insert(record);
            seqs.push(record.sequence);
            let mut applied = Self::apply_resident(store, &record);
            applied.records.push(record);
            outcome.merge(applied);
        }
        self.frames.push(seqs);
        Some(outcome)
    }

    /// Удалить записи, покрытые сохранённым снимком
    pub fn compact_through(&mut self, sequence: u64) -> usize {
        let seqs: Vec<u64> = self.records.range(..=sequence).map(|(s, _)| *s).collect();
        for seq in &seqs {
            self.remove(*seq);
        }
        for frame in &mut self.frames {
            frame.retain(|s| *s > sequence);
        }
        self.frames.retain(|f| !f.is_empty());
        self.open_frame.retain(|s| *s > sequence);
        self.compacted_through = self.compacted_through.max(sequence);
        seqs.len()
    }

    /// Все записи (для сохранения)
    pub fn records(&self) -> impl Iterator<Item = &EditRecord> + '_ {
        self.records.values()
    }

    /// Восстановить журнал из сохранения (без применения к хранилищу)
    pub fn restore(&mut self, records: Vec<EditRecord>, compacted_through: u64) {
        for record in records {
            if !self.records.contains_key(&record.sequence) {
                self.next_sequence = self.next_sequence.max(record.sequence + 1);
                self.insert(record);
            }
        }
        self.compacted_through = self.compacted_through.max(compacted_through);
        self.next_sequence = self.next_sequence.max(compacted_through + 1);
    }
}

/// Применить записи к данным по порядку
pub fn replay_records(records: &[EditRecord], key: ChunkKey, storage: &mut ChunkStorage) -> (u64, Vec<usize>) {
    let mut last = 0;
    let mut changed = BTreeSet::new();
    for record in records {
        changed.extend(record.apply_to(key, storage));
        last = last.max(record.sequence);
    }
    (last, changed.into_iter().collect())
}

/// Зона, где соседу нужен новый меш: полоса более грубого LOD + нормали
fn neighbor_zone(record: &EditRecord, step: i32) -> VoxelBox {
    record.influence(step * 2).expand(step)
}

fn cells_of(area: &VoxelBox) -> Vec<[i32; 3]> {
    if area.is_empty() {
        return Vec::new();
    }
    let lo = [
        area.min.x.div_euclid(CELL_SIZE),
        area.min.y.div_euclid(CELL_SIZE),
        area.min.z.div_euclid(CELL_SIZE),
    ];
    let hi = [
        (area.max.x - 1).div_euclid(CELL_SIZE),
        (area.max.y - 1).div_euclid(CELL_SIZE),
        (area.max.z - 1).div_euclid(CELL_SIZE),
    ];
    let mut out = Vec::new();
    for z in lo[2]..=hi[2] {
        for y in lo[1]..=hi[1] {
            for x in lo[0]..=hi[0] {
                out.push([x, y, z]);
            }
        }
    }
    out
}
