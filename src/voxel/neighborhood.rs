// ============================================
// Neighborhood - Чтение сэмплов за границей чанка
// ============================================
//
// Снимок чанка + снимки соседей (26 направлений), собранный на главном
// потоке перед отправкой задачи меширования. Чтение за границей:
//   1. сосед того же LOD (сэмпл лежит на его сетке),
//   2. более грубый сосед (кусочно-линейная интерполяция),
//   3. детерминированная экстраполяция от своей границы.
// В случае 3 шов временный и перестраивается, когда сосед появится.

use std::sync::Arc;

use crate::math::{ChunkKey, Direction, VoxelPos, CHUNK_SIZE};
use crate::octree::NeighborLink;

use super::sample::Voxel;
use super::storage::ChunkStorage;
use super::store::VoxelStore;

const MAX: i32 = CHUNK_SIZE;

/// Снимок соседнего чанка
#[derive(Clone, Debug)]
pub struct NeighborSource {
    pub key: ChunkKey,
    pub storage: Arc<ChunkStorage>,
}

impl NeighborSource {
    /// Кусочно-линейный интерполянт в мировой точке.
    /// Для точки на полуцелой сетке это среднее между floor и ceil углами,
    /// что совпадает с разбиением куба на тетраэдры вдоль главной диагонали.
    pub fn interpolate(&self, p: VoxelPos) -> Voxel {
        let origin = self.key.origin();
        let step = self.key.step();
        let axis = |v: i32, o: i32| -> (usize, usize) {
            let rel = v - o;
            let lo = rel.div_euclid(step).clamp(0, MAX);
            let hi = (-(-rel).div_euclid(step)).clamp(0, MAX);
            (lo as usize, hi as usize)
        };
        let (x0, x1) = axis(p.x, origin.x);
        let (y0, y1) = axis(p.y, origin.y);
        let (z0, z1) = axis(p.z, origin.z);
        let a = self.storage.get(x0, y0, z0);
        if x0 == x1 && y0 == y1 && z0 == z1 {
            return a;
        }
        let b = self.storage.get(x1, y1, z1);
        let material = if a.is_solid() || !b.is_solid() { a.material } else { b.material };
        Voxel::new((a.density + b.density) * 0.5, material)
    }
}

#[derive(Clone, Debug)]
pub struct Neighborhood {
    key: ChunkKey,
    center: Arc<ChunkStorage>,
    sources: Vec<Option<NeighborSource>>,
    /// Направления, где лист октодерева грубее
    coarser: u32,
    /// Направления, где ожидаемые данные соседа ещё не готовы
    missing: u32,
}

impl Neighborhood {
    /// Чанк без соседей (всё за границей экстраполируется)
    pub fn isolated(key: ChunkKey, center: Arc<ChunkStorage>) -> Self {
        Self {
            key,
            center,
            sources: vec![None; Direction::ALL.len()],
            coarser: 0,
            missing: 0,
        }
    }

    /// Собрать снимки соседей по ссылкам октодерева (порядок `Direction::ALL`)
    pub fn gather(
        store: &VoxelStore,
        key: ChunkKey,
        center: Arc<ChunkStorage>,
        links: &[NeighborLink],
    ) -> Self {
        let mut hood = Self::isolated(key, center);
        for (idx, dir) in Direction::ALL.iter().enumerate() {
            let bit = 1u32 << idx;
            let same = key.offset(*dir);
            match links.get(idx).copied().unwrap_or(NeighborLink::Outside) {
                NeighborLink::Coarser(coarse) => {
                    hood.coarser |= bit;
                    match resident(store, coarse) {
                        Some(source) => hood.sources[idx] = Some(source),
                        None => hood.missing |= bit,
                    }
                }
                NeighborLink::Same(_) => {
                    match resident(store, same).or_else(|| resident(store, same.parent())) {
                        Some(source) => hood.sources[idx] = Some(source),
                        None => hood.missing |= bit,
                    }
                }
                NeighborLink::Finer(_) | NeighborLink::Outside => {
                    hood.sources[idx] = resident(store, same).or_else(|| resident(store, same.parent()));
                }
            }
        }
        hood
    }

    /// Подставить соседа вручную
    pub fn set_neighbor(&mut self, dir: Direction, source: NeighborSource, coarser: bool) {
        if let Some(idx) = dir.index() {
            let bit = 1u32 << idx;
            if coarser {
                self.coarser |= bit;
            } else {
                self.coarser &= !bit;
            }
            self.missing &= !bit;
            self.sources[idx] = Some(source);
        }
    }

    #[inline]
    pub fn key(&self) -> ChunkKey {
        self.key
    }

    #[inline]
    pub fn center(&self) -> &ChunkStorage {
        &self.center
    }

    /// Снимок более грубого соседа (только для направлений с переходом LOD)
    pub fn coarse_source(&self, dir_index: usize) -> Option<&NeighborSource> {
        if self.coarser & (1 << dir_index) == 0 {
            return None;
        }
        self.sources.get(dir_index).and_then(|s| s.as_ref())
    }

    /// Сэмпл по локальным координатам сетки -1..=17
    pub fn sample(&self, i: i32, j: i32, k: i32) -> Voxel {
        let dir = match Direction::of_local(i, j, k, MAX) {
            None => return self.center.get(i as usize, j as usize, k as usize),
            Some(d) => d,
        };
        if let Some(source) = dir.index().and_then(|idx| self.sources[idx].as_ref()) {
            return source.interpolate(self.key.sample_position(i, j, k));
        }
        self.extrapolate(i, j, k)
    }

    /// Линейная экстраполяция от ближайшего граничного сэмпла
    fn extrapolate(&self, i: i32, j: i32, k: i32) -> Voxel {
        let inward = |v: i32| -> (i32, i32) {
            if v < 0 {
                (0, 1)
            } else if v > MAX {
                (MAX, MAX - 1)
            } else {
                (v, v)
            }
        };
        let (ci, ii) = inward(i);
        let (cj, ij) = inward(j);
        let (ck, ik) = inward(k);
        let edge = self.center.get(ci as usize, cj as usize, ck as usize);
        let inner = self.center.get(ii as usize, ij as usize, ik as usize);
        Voxel::new(2.0 * edge.density - inner.density, edge.material)
    }

    /// Биты граней (-X,+X,-Y,+Y,-Z,+Z) с более грубым соседом
    pub fn transition_mask(&self) -> u8 {
        Direction::FACES.iter().fold(0u8, |mask, face| {
            match (face.index(), face.face_bit()) {
                (Some(idx), Some(bit)) if self.coarser & (1 << idx) != 0 => mask | bit,
                _ => mask,
            }
        })
    }

    /// Все 26 направлений с более грубым соседом
    pub fn coarser_mask(&self) -> u32 {
        self.coarser
    }

    /// Направления, где шов временный (сосед ещё не сгенерирован)
    pub fn provisional_mask(&self) -> u32 {
        self.missing
    }
}

fn resident(store: &VoxelStore, key: ChunkKey) -> Option<NeighborSource> {
    let chunk = store.chunk_by_key(key)?;
    if !chunk.has_data() {
        return None;
    }
    chunk.snapshot().map(|storage| NeighborSource { key, storage })
}
