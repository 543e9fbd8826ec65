// ============================================
// Job Queue - Приоритетная очередь с ленивым удалением
// ============================================
// Не больше одной ожидающей задачи на (вид, чанк). Повторная постановка
// заменяет задачу (свежий токен), приоритет берётся лучший из двух.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::math::ChunkKey;

use super::job::{Job, JobKind, JobPriority};

struct Entry {
    ticket: u64,
    job: Job,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.ticket == other.ticket
    }
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap - max-heap, нам нужен минимальный приоритет сверху
        other.job.priority.cmp(&self.job.priority)
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
pub struct JobQueue {
    heap: BinaryHeap<Entry>,
    /// (вид, чанк) -> актуальный билет и приоритет
    live: HashMap<(JobKind, ChunkKey), (u64, JobPriority)>,
    next_ticket: u64,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Поставить задачу. false если такая уже стояла (она заменена).
    pub fn push(&mut self, mut job: Job) -> bool {
        let slot = (job.kind, job.key);
        let ticket = self.next_ticket;
        self.next_ticket += 1;

        let fresh = match self.live.get(&slot) {
            Some(&(_, old)) => {
                job.priority = if old < job.priority { old } else { JobPriority { order: ticket, ..job.priority } };
                false
            }
            None => {
                job.priority.order = ticket;
                true
            }
        };
        self.live.insert(slot, (ticket, job.priority));
        self.heap.push(Entry { ticket, job });
        fresh
    }

    /// Следующая задача по приоритету
    pub fn pop(&mut self) -> Option<Job> {
        while let Some(entry) = self.heap.pop() {
            let slot = (entry.job.kind, entry.job.key);
            if self.live.get(&slot).map(|&(t, _)| t) == Some(entry.ticket) {
                self.live.remove(&slot);
                return Some(entry.job);
            }
        }
        None
    }

    pub fn remove(&mut self, kind: JobKind, key: ChunkKey) -> bool {
        self.live.remove(&(kind, key)).is_some()
    }

    pub fn contains(&self, kind: JobKind, key: ChunkKey) -> bool {
        self.live.contains_key(&(kind, key))
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.live.clear();
    }

    /// Пересчитать приоритеты (наблюдатель сдвинулся). FIFO порядок сохраняется.
    pub fn reprioritize(&mut self, mut priority: impl FnMut(&Job) -> JobPriority) {
        let entries = std::mem::take(&mut self.heap).into_vec();
        for mut entry in entries {
            let slot = (entry.job.kind, entry.job.key);
            if self.live.get(&slot).map(|&(t, _)| t) != Some(entry.ticket) {
                continue;
            }
            let order = entry.job.priority.order;
            entry.job.priority = JobPriority { order, kind: entry.job.kind, ..priority(&entry.job) };
            self.live.insert(slot, (entry.ticket, entry.job.priority));
            self.heap.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::CancelToken;

    fn job(kind: JobKind, x: i32, distance: f32) -> Job {
        Job::new(
            kind,
            ChunkKey::new(x, 0, 0, 0),
            CancelToken::detached(0),
            JobPriority::new(distance, 0, kind, false),
        )
    }

    #[test]
    fn test_pops_nearest_first() {
        let mut q = JobQueue::new();
        q.push(job(JobKind::Generate, 1, 300.0));
        q.push(job(JobKind::Generate, 2, 20.0));
        q.push(job(JobKind::Generate, 3, 150.0));
        let order: Vec<i32> = std::iter::from_fn(|| q.pop()).map(|j| j.key.x).collect();
        assert_eq!(order, vec![2, 3, 1]);
    }

    #[test]
    fn test_fifo_within_bucket() {
        let mut q = JobQueue::new();
        for x in 0..5 {
            q.push(job(JobKind::Mesh, x, 5.0));
        }
        let order: Vec<i32> = std::iter::from_fn(|| q.pop()).map(|j| j.key.x).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_duplicate_replaces() {
        let mut q = JobQueue::new();
        assert!(q.push(job(JobKind::Mesh, 1, 500.0)));
        assert!(!q.push(job(JobKind::Mesh, 1, 10.0)));
        assert!(q.push(job(JobKind::Generate, 1, 10.0)));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop().map(|j| j.kind), Some(JobKind::Generate));
        assert_eq!(q.pop().map(|j| j.kind), Some(JobKind::Mesh));
        assert!(q.pop().is_none());
    }

    #[test]
    fn test_remove_and_reprioritize() {
        let mut q = JobQueue::new();
        q.push(job(JobKind::Mesh, 1, 10.0));
        q.push(job(JobKind::Mesh, 2, 500.0));
        q.push(job(JobKind::Mesh, 3, 50.0));
        assert!(q.remove(JobKind::Mesh, ChunkKey::new(3, 0, 0, 0)));
        q.reprioritize(|j| JobPriority::new(if j.key.x == 2 { 0.0 } else { 900.0 }, 0, j.kind, false));
        assert_eq!(q.pop().map(|j| j.key.x), Some(2));
        assert_eq!(q.pop().map(|j| j.key.x), Some(1));
        assert!(q.is_empty());
    }
}
