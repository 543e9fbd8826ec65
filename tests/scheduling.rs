// ============================================
// Планировщик: отмена по поколению, отложенные задачи
// ============================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use voxel_terrain::generation::{EmptyGenerator, GenerationPipeline};
use voxel_terrain::scheduler::{Completion, JobPayload, JobPriority, JobRunner, JobSource, TickBudget};
use voxel_terrain::voxel::CancelToken;
use voxel_terrain::{ChunkKey, Job, JobKind, Mesher, Scheduler};

/// Источник, у которого чанк правится, пока задача уже в работе
struct EditingSource {
    generation: Arc<AtomicU64>,
    bump_on_prepare: bool,
    prepared: usize,
    completed: Vec<ChunkKey>,
    discarded: Vec<(ChunkKey, bool)>,
}

impl EditingSource {
    fn new(bump_on_prepare: bool) -> Self {
        Self {
            generation: Arc::new(AtomicU64::new(0)),
            bump_on_prepare,
            prepared: 0,
            completed: Vec::new(),
            discarded: Vec::new(),
        }
    }

    fn job(&self, key: ChunkKey) -> Job {
        Job::new(
            JobKind::Generate,
            key,
            CancelToken::new(self.generation.clone()),
            JobPriority::new(0.0, 0, JobKind::Generate, false),
        )
    }
}

impl JobSource for EditingSource {
    fn prepare(&mut self, _job: &Job) -> Option<JobPayload> {
        self.prepared += 1;
        if self.bump_on_prepare {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        Some(JobPayload::Generate { edits: Vec::new() })
    }

    fn complete(&mut self, completion: Completion) {
        self.completed.push(completion.key);
    }

    fn discard(&mut self, _kind: JobKind, key: ChunkKey, dispatched: bool) {
        self.discarded.push((key, dispatched));
    }
}

fn scheduler(threads: usize) -> Scheduler {
    let runner = JobRunner::new(GenerationPipeline::new(Arc::new(EmptyGenerator), true), Mesher::default());
    Scheduler::new(runner, threads, 8, 64)
}

fn run_to_idle(scheduler: &mut Scheduler, source: &mut EditingSource) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while !scheduler.is_idle() && Instant::now() < deadline {
        scheduler.tick(source, TickBudget::unlimited());
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(scheduler.is_idle());
}

#[test]
fn test_result_of_edited_chunk_is_never_applied() {
    for threads in [0, 2] {
        let mut s = scheduler(threads);
        let mut source = EditingSource::new(true);
        let key = ChunkKey::new(3, 0, -1, 0);
        assert!(s.enqueue(source.job(key)));
        run_to_idle(&mut s, &mut source);

        assert_eq!(source.prepared, 1);
        assert!(source.completed.is_empty(), "threads {}", threads);
        assert_eq!(source.discarded, vec![(key, true)]);
    }
}

#[test]
fn test_current_result_is_applied() {
    let mut s = scheduler(2);
    let mut source = EditingSource::new(false);
    let keys: Vec<ChunkKey> = (0..6).map(|x| ChunkKey::new(x, 0, 0, 0)).collect();
    for key in &keys {
        s.enqueue(source.job(*key));
    }
    run_to_idle(&mut s, &mut source);
    source.completed.sort();
    assert_eq!(source.completed, keys);
    assert!(source.discarded.is_empty());
}

#[test]
fn test_requeue_while_active_is_deferred() {
    let mut s = scheduler(1);
    let mut source = EditingSource::new(false);
    let key = ChunkKey::new(0, 0, 0, 0);

    s.enqueue(source.job(key));
    s.tick(&mut source, TickBudget::unlimited());
    if s.is_active(JobKind::Generate, key) {
        // вторая постановка ждёт окончания первой
        s.enqueue(source.job(key));
        assert!(s.is_queued(JobKind::Generate, key));
        assert_eq!(s.active_len(), 1);
    }
    run_to_idle(&mut s, &mut source);
    assert!(!source.completed.is_empty());
    assert!(source.completed.len() <= 2);
}

#[test]
fn test_cancel_removes_pending_job() {
    let mut s = scheduler(0);
    let mut source = EditingSource::new(false);
    let key = ChunkKey::new(5, 5, 5, 0);
    s.enqueue(source.job(key));
    assert!(s.cancel(JobKind::Generate, key));
    assert!(s.is_idle());
    s.tick(&mut source, TickBudget::unlimited());
    assert_eq!(source.prepared, 0);
}
