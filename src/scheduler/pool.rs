// ============================================
// Worker Pool - Фиксированный пул воркеров (rayon)
// ============================================
// Воркеры никогда не трогают Store и октодерево: на вход снимки,
// на выход Completion в канал crossbeam, который читает главный поток.

use std::panic::{catch_unwind, AssertUnwindSafe};

use crossbeam_channel::Sender;
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::generation::GenerationPipeline;
use crate::meshing::Mesher;

use super::job::{Completion, Job, JobOutput, JobPayload};

/// Исполнитель задач (общий для всех воркеров)
#[derive(Clone)]
pub struct JobRunner {
    pipeline: GenerationPipeline,
    mesher: Mesher,
}

impl JobRunner {
    pub fn new(pipeline: GenerationPipeline, mesher: Mesher) -> Self {
        Self { pipeline, mesher }
    }

    pub fn run(&self, job: Job, payload: JobPayload) -> Completion {
        let output = if job.token.is_cancelled() {
            JobOutput::Cancelled
        } else {
            match payload {
                JobPayload::Generate { edits } => {
                    JobOutput::Generated(self.pipeline.generate(job.key, &edits, &job.token))
                }
                JobPayload::Mesh { hood } => {
                    let generation = job.token.generation();
                    match catch_unwind(AssertUnwindSafe(|| self.mesher.mesh(&hood, generation))) {
                        Ok(artifact) => JobOutput::Meshed(artifact),
                        Err(_) => JobOutput::Panicked(format!("meshing panicked for {:?}", job.key)),
                    }
                }
            }
        };
        Completion { kind: job.kind, key: job.key, token: job.token, output }
    }
}

pub enum WorkerPool {
    /// Задачи выполняются прямо в tick() (детерминированные тесты)
    Inline,
    Threaded(ThreadPool),
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        if threads == 0 {
            return WorkerPool::Inline;
        }
        match ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("voxel-worker-{}", i))
            .build()
        {
            Ok(pool) => {
                log::debug!("[POOL] Started {} worker threads", threads);
                WorkerPool::Threaded(pool)
            }
            Err(e) => {
                log::warn!("[POOL] Failed to start workers ({}), running inline", e);
                WorkerPool::Inline
            }
        }
    }

    pub fn is_inline(&self) -> bool {
        matches!(self, WorkerPool::Inline)
    }

    /// Выполнить задачу, результат уходит в `completions`
    pub fn execute(&self, runner: &JobRunner, job: Job, payload: JobPayload, completions: &Sender<Completion>) {
        match self {
            WorkerPool::Inline => {
                let _ = completions.send(runner.run(job, payload));
            }
            WorkerPool::Threaded(pool) => {
                let runner = runner.clone();
                let tx = completions.clone();
                pool.spawn(move || {
                    let _ = tx.send(runner.run(job, payload));
                });
            }
        }
    }
}
