// ============================================
// Octree Index - Какие чанки нужны и на каком LOD
// ============================================
//
// Лес октодеревьев: корни на max_lod вокруг зрителя, листья = чанки.
// Узел либо лист, либо разделён полностью на 8 детей.
// Соседние листья (по 26 направлениям) отличаются не больше чем на 1 LOD:
// перед делением листа более грубые соседи делятся первыми (рябь).

use std::collections::{BTreeSet, HashMap};

use ultraviolet::Vec3;

use crate::math::{ChunkKey, Direction, VoxelPos};

use super::lod::LodPolicy;
use super::node::{NodeArena, INVALID_INDEX};
use super::InvariantViolation;

/// Сосед листа в одном из 26 направлений
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NeighborLink {
    /// Лист того же LOD
    Same(ChunkKey),
    /// Лист на LOD выше (по балансу ровно +1)
    Coarser(ChunkKey),
    /// Узел того же LOD, разделённый на более мелкие листья
    Finer(ChunkKey),
    /// Область не загружена
    Outside,
}

impl NeighborLink {
    pub fn key(&self) -> Option<ChunkKey> {
        match self {
            NeighborLink::Same(k) | NeighborLink::Coarser(k) | NeighborLink::Finer(k) => Some(*k),
            NeighborLink::Outside => None,
        }
    }
}

/// Результат update_focus
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FocusUpdate {
    /// Узлы, разделённые в этом тике (включая вынужденные)
    pub subdivided: Vec<ChunkKey>,
    /// Узлы, слитые обратно в лист
    pub merged: Vec<ChunkKey>,
    /// Новые листья (нужна генерация)
    pub created_leaves: Vec<ChunkKey>,
    /// Исчезнувшие листья (меш снять)
    pub removed_leaves: Vec<ChunkKey>,
    /// Сколько делений сделано ради баланса
    pub forced_splits: usize,
}

impl FocusUpdate {
    pub fn is_empty(&self) -> bool {
        self.created_leaves.is_empty() && self.removed_leaves.is_empty()
    }
}

pub struct OctreeIndex {
    policy: LodPolicy,
    arena: NodeArena,
    roots: HashMap<ChunkKey, u32>,
    nodes_by_key: HashMap<ChunkKey, u32>,
    leaves: BTreeSet<ChunkKey>,
    tick: u64,
    viewer: Option<Vec3>,
}

impl OctreeIndex {
    pub fn new(policy: LodPolicy) -> Self {
        Self {
            policy,
            arena: NodeArena::new(),
            roots: HashMap::new(),
            nodes_by_key: HashMap::new(),
            leaves: BTreeSet::new(),
            tick: 0,
            viewer: None,
        }
    }

    pub fn policy(&self) -> &LodPolicy {
        &self.policy
    }

    pub fn viewer(&self) -> Option<Vec3> {
        self.viewer
    }

    pub fn leaves(&self) -> impl Iterator<Item = ChunkKey> + '_ {
        self.leaves.iter().copied()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn node_count(&self) -> usize {
        self.arena.node_count()
    }

    #[inline]
    pub fn is_leaf(&self, key: ChunkKey) -> bool {
        self.leaves.contains(&key)
    }

    pub fn contains(&self, key: ChunkKey) -> bool {
        self.nodes_by_key.contains_key(&key)
    }

    /// Пересчитать дерево под новую позицию зрителя
    pub fn update_focus(&mut self, viewer: Vec3, radius: f32) -> FocusUpdate {
        self.tick += 1;
        self.viewer = Some(viewer);
        let before = self.leaves.clone();
        let mut update = FocusUpdate::default();

        let added = self.update_roots(viewer, radius);
        self.balance_new_roots(&added, &mut update);
        self.split_pass(viewer, &mut update);
        self.merge_pass(viewer, &mut update);

        if let Err(violation) = self.check_balance() {
            log::error!("octree balance violated after focus update: {}", violation);
            debug_assert!(false, "octree balance violated: {}", violation);
            self.heal(&mut update);
        }

        update.created_leaves = self.leaves.difference(&before).copied().collect();
        update.removed_leaves = before.difference(&self.leaves).copied().collect();
        log::debug!(
            "focus update: {} split, {} merged, +{} / -{} leaves, {} forced",
            update.subdivided.len(),
            update.merged.len(),
            update.created_leaves.len(),
            update.removed_leaves.len(),
            update.forced_splits
        );
        update
    }

    /// Добавить корни в радиусе, убрать ушедшие за радиус с гистерезисом.
    /// Возвращает добавленные корни.
    fn update_roots(&mut self, viewer: Vec3, radius: f32) -> Vec<ChunkKey> {
        let mut added = Vec::new();
        let lod = self.policy.max_lod;
        let size = LodPolicy::node_size(lod);
        let keep_radius = radius * (1.0 + self.policy.hysteresis);
        let lo = VoxelPos::floor((viewer - Vec3::broadcast(radius)) / size);
        let hi = VoxelPos::floor((viewer + Vec3::broadcast(radius)) / size);

        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    let key = ChunkKey::new(x, y, z, lod);
                    if self.roots.contains_key(&key) {
                        continue;
                    }
                    if key.bounds().distance_squared(viewer) <= radius * radius {
                        let idx = self.arena.alloc_root(key);
                        self.roots.insert(key, idx);
                        self.nodes_by_key.insert(key, idx);
                        self.leaves.insert(key);
                        added.push(key);
                    }
                }
            }
        }

        let mut gone: Vec<ChunkKey> = self
            .roots
            .keys()
            .filter(|k| k.bounds().distance_squared(viewer) > keep_radius * keep_radius)
            .copied()
            .collect();
        gone.sort();
        for key in gone {
            self.remove_root(key);
        }
        added
    }

    /// Новый корень мог лечь рядом с уже мелкими листьями соседнего корня:
    /// делить его (и его детей), пока разница с соседями не станет <= 1
    fn balance_new_roots(&mut self, added: &[ChunkKey], update: &mut FocusUpdate) {
        let mut pending = added.to_vec();
        while let Some(key) = pending.pop() {
            if key.lod == 0 || !self.is_leaf(key) {
                continue;
            }
            let too_coarse = Direction::ALL
                .iter()
                .filter_map(|dir| self.finest_touching(key, *dir))
                .any(|finest| finest + 1 < key.lod);
            if !too_coarse {
                continue;
            }
            let before = update.subdivided.len();
            self.split_balanced(key, update);
            update.forced_splits += update.subdivided.len() - before;
            pending.extend(key.children());
        }
    }

    /// Самый мелкий LOD среди листьев соседа `key` в сторону `dir`,
    /// прилегающих к `key`. None, если узла того же LOD там нет.
    fn finest_touching(&self, key: ChunkKey, dir: Direction) -> Option<u8> {
        let neighbor = key.offset(dir);
        let idx = *self.nodes_by_key.get(&neighbor)?;
        let mut finest = neighbor.lod;
        let mut stack = vec![(neighbor, idx)];
        while let Some((k, i)) = stack.pop() {
            let node = self.arena.get(i);
            if !node.has_children() {
                finest = finest.min(k.lod);
                continue;
            }
            for (slot, child) in k.children().iter().enumerate() {
                if touches_side(dir, slot as u32) {
                    stack.push((*child, node.first_child + slot as u32));
                }
            }
        }
        Some(finest)
    }

    fn remove_root(&mut self, key: ChunkKey) {
        let idx = match self.roots.remove(&key) {
            Some(idx) => idx,
            None => return,
        };
        let node = *self.arena.get(idx);
        if node.has_children() {
            let mut freed = Vec::new();
            self.arena.free_children(node.first_child, &mut freed);
            for k in freed {
                self.nodes_by_key.remove(&k);
                self.leaves.remove(&k);
            }
        }
        self.arena.free_root(idx);
        self.nodes_by_key.remove(&key);
        self.leaves.remove(&key);
    }

    fn split_pass(&mut self, viewer: Vec3, update: &mut FocusUpdate) {
        for _ in 0..=self.policy.max_lod {
            let candidates: Vec<ChunkKey> = self
                .leaves
                .iter()
                .filter(|k| self.policy.should_split(k, viewer))
                .copied()
                .collect();
            if candidates.is_empty() {
                break;
            }
            for key in candidates {
                let before = update.subdivided.len();
                self.split_balanced(key, update);
                if update.subdivided.len() > before + 1 {
                    update.forced_splits += update.subdivided.len() - before - 1;
                }
            }
        }
    }

    /// Разделить лист, предварительно разделив более грубых соседей
    fn split_balanced(&mut self, key: ChunkKey, update: &mut FocusUpdate) {
        if key.lod == 0 || !self.is_leaf(key) {
            return;
        }
        for dir in Direction::ALL {
            let neighbor = key.offset(dir);
            while let Some(leaf) = self.covering_leaf(neighbor).filter(|l| l.lod > key.lod) {
                self.split_balanced(leaf, update);
                if self.is_leaf(leaf) {
                    break;
                }
            }
        }
        if self.split_node(key) {
            update.subdivided.push(key);
        }
    }

    fn split_node(&mut self, key: ChunkKey) -> bool {
        let idx = match self.nodes_by_key.get(&key) {
            Some(idx) => *idx,
            None => return false,
        };
        if self.arena.get(idx).has_children() || key.lod == 0 {
            return false;
        }
        let children = key.children();
        let first = self.arena.alloc_children(idx, children);
        let node = self.arena.get_mut(idx);
        node.first_child = first;
        node.split_tick = self.tick;
        self.leaves.remove(&key);
        for (i, child) in children.iter().enumerate() {
            self.nodes_by_key.insert(*child, first + i as u32);
            self.leaves.insert(*child);
        }
        true
    }

    fn merge_pass(&mut self, viewer: Vec3, update: &mut FocusUpdate) {
        for _ in 0..=self.policy.max_lod {
            let candidates: BTreeSet<ChunkKey> = self
                .leaves
                .iter()
                .filter(|k| !self.roots.contains_key(k))
                .map(|k| k.parent())
                .collect();
            let mut merged_any = false;
            for parent in candidates {
                if self.policy.should_merge(&parent, viewer) && self.can_merge(parent) {
                    self.merge_node(parent);
                    update.merged.push(parent);
                    merged_any = true;
                }
            }
            if !merged_any {
                break;
            }
        }
    }

    /// Слияние допустимо: все дети листья, узел не делился в этом тике,
    /// и соседние листья не станут мельче на 2 уровня
    fn can_merge(&self, parent: ChunkKey) -> bool {
        let idx = match self.nodes_by_key.get(&parent) {
            Some(idx) => *idx,
            None => return false,
        };
        let node = self.arena.get(idx);
        if !node.has_children() || node.split_tick == self.tick {
            return false;
        }
        let first = node.first_child;
        if (0..8).any(|i| self.arena.get(first + i).has_children()) {
            return false;
        }
        Direction::ALL.iter().all(|dir| self.touching_children_are_leaves(parent, *dir))
    }

    /// Дети соседнего узла, прилегающие к `key` со стороны `dir`, не разделены
    fn touching_children_are_leaves(&self, key: ChunkKey, dir: Direction) -> bool {
        let neighbor = key.offset(dir);
        let idx = match self.nodes_by_key.get(&neighbor) {
            Some(idx) => *idx,
            None => return true,
        };
        let node = self.arena.get(idx);
        if !node.has_children() {
            return true;
        }
        (0..8u32).all(|slot| !touches_side(dir, slot) || !self.arena.get(node.first_child + slot).has_children())
    }

    fn merge_node(&mut self, key: ChunkKey) {
        let idx = match self.nodes_by_key.get(&key) {
            Some(idx) => *idx,
            None => return,
        };
        let first = self.arena.get(idx).first_child;
        if first == INVALID_INDEX {
            return;
        }
        let mut freed = Vec::new();
        self.arena.free_children(first, &mut freed);
        for k in freed {
            self.nodes_by_key.remove(&k);
            self.leaves.remove(&k);
        }
        self.arena.get_mut(idx).first_child = INVALID_INDEX;
        self.leaves.insert(key);
    }

    /// Лист того же или более грубого LOD, покрывающий область `key`
    pub fn covering_leaf(&self, key: ChunkKey) -> Option<ChunkKey> {
        for lod in key.lod..=self.policy.max_lod {
            let ancestor = key.ancestor(lod);
            if self.nodes_by_key.contains_key(&ancestor) {
                return self.leaves.contains(&ancestor).then_some(ancestor);
            }
        }
        None
    }

    /// Листья, содержащие мировую точку
    pub fn leaf_at(&self, pos: VoxelPos) -> Option<ChunkKey> {
        self.covering_leaf(ChunkKey::containing(pos, 0))
    }

    /// Соседи листа по всем 26 направлениям (порядок `Direction::ALL`)
    pub fn neighbors(&self, key: ChunkKey) -> Vec<NeighborLink> {
        Direction::ALL.iter().map(|dir| self.link(key.offset(*dir))).collect()
    }

    /// Соседи по шести граням (порядок `Direction::FACES`)
    pub fn face_neighbors(&self, key: ChunkKey) -> [NeighborLink; 6] {
        let mut out = [NeighborLink::Outside; 6];
        for (i, dir) in Direction::FACES.iter().enumerate() {
            out[i] = self.link(key.offset(*dir));
        }
        out
    }

    fn link(&self, neighbor: ChunkKey) -> NeighborLink {
        if let Some(idx) = self.nodes_by_key.get(&neighbor) {
            return if self.arena.get(*idx).has_children() {
                NeighborLink::Finer(neighbor)
            } else {
                NeighborLink::Same(neighbor)
            };
        }
        match self.covering_leaf(neighbor) {
            Some(leaf) => NeighborLink::Coarser(leaf),
            None => NeighborLink::Outside,
        }
    }

    /// Проверка баланса 2:1 по всем листьям
    pub fn check_balance(&self) -> Result<(), InvariantViolation> {
        for leaf in &self.leaves {
            for dir in Direction::ALL {
                if let NeighborLink::Coarser(coarse) = self.link(leaf.offset(dir)) {
                    if coarse.lod > leaf.lod + 1 {
                        return Err(InvariantViolation::Unbalanced { fine: *leaf, coarse });
                    }
                }
            }
        }
        Ok(())
    }

    /// Проверка полноты деления: у каждого разделённого узла 8 детей в индексе
    pub fn check_structure(&self) -> Result<(), InvariantViolation> {
        for (key, idx) in &self.nodes_by_key {
            let node = self.arena.get(*idx);
            if node.has_children() {
                for child in key.children() {
                    if !self.nodes_by_key.contains_key(&child) {
                        return Err(InvariantViolation::PartialSubdivision(*key));
                    }
                }
            } else if !self.leaves.contains(key) {
                return Err(InvariantViolation::PartialSubdivision(*key));
            }
        }
        Ok(())
    }

    /// Самолечение: делить грубые листья, пока баланс не восстановится
    fn heal(&mut self, update: &mut FocusUpdate) {
        while let Err(InvariantViolation::Unbalanced { coarse, .. }) = self.check_balance() {
            let before = update.subdivided.len();
            self.split_balanced(coarse, update);
            if update.subdivided.len() == before {
                break;
            }
            update.forced_splits += update.subdivided.len() - before;
        }
    }

    /// Явно разделить лист (с рябью по соседям)
    pub fn force_split(&mut self, key: ChunkKey) -> Result<Vec<ChunkKey>, InvariantViolation> {
        if key.lod == 0 {
            return Err(InvariantViolation::BelowFinest(key));
        }
        if !self.is_leaf(key) {
            return Err(InvariantViolation::NotALeaf(key));
        }
        self.tick += 1;
        let mut update = FocusUpdate::default();
        self.split_balanced(key, &mut update);
        Ok(update.subdivided)
    }
}

/// Ребёнок `slot` узла-соседа в сторону `dir` прилегает к исходному узлу
fn touches_side(dir: Direction, slot: u32) -> bool {
    let side = |d: i32, local: u32| d == 0 || (d > 0 && local == 0) || (d < 0 && local == 1);
    side(dir.dx, slot & 1) && side(dir.dy, (slot >> 1) & 1) && side(dir.dz, (slot >> 2) & 1)
}
