// ============================================
// Scheduler Module - Очередь задач генерации и меширования
// ============================================
//
// enqueue() ставит задачу, tick() за бюджет кадра:
//   1. разбирает очередь завершений (устаревшее отбрасывается),
//   2. раздаёт новые задачи воркерам.
// Не больше одной активной задачи каждого вида на чанк: повторная
// постановка во время работы откладывается до её завершения.

mod job;
mod queue;
mod pool;

pub use job::{Completion, Job, JobKind, JobOutput, JobPayload, JobPriority};
pub use queue::JobQueue;
pub use pool::{JobRunner, WorkerPool};

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use crate::core::TerrainSettings;
use crate::math::ChunkKey;

/// Сколько ждать воркеров при остановке
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Главный поток: подготовка задач и применение результатов
pub trait JobSource {
    /// Собрать снимки для задачи. None = задача больше не нужна.
    fn prepare(&mut self, job: &Job) -> Option<JobPayload>;
    /// Применить актуальный результат
    fn complete(&mut self, completion: Completion);
    /// Результат (или сама задача, если `dispatched == false`) устарел
    fn discard(&mut self, kind: JobKind, key: ChunkKey, dispatched: bool);
}

/// Бюджет одного тика
#[derive(Clone, Copy, Debug)]
pub struct TickBudget {
    pub max_dispatch: usize,
    pub max_duration: Duration,
}

impl TickBudget {
    pub fn from_settings(settings: &TerrainSettings) -> Self {
        Self {
            max_dispatch: settings.max_jobs_in_flight,
            max_duration: Duration::from_millis(settings.tick_budget_ms),
        }
    }

    /// Без ограничений по времени (тесты, загрузка)
    pub fn unlimited() -> Self {
        Self { max_dispatch: usize::MAX, max_duration: Duration::from_secs(3600) }
    }
}

impl Default for TickBudget {
    fn default() -> Self {
        Self { max_dispatch: 64, max_duration: Duration::from_millis(4) }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Применённые результаты
    pub completed: usize,
    /// Устаревшие результаты и задачи
    pub discarded: usize,
    pub dispatched: usize,
    /// Задачи, которые источник счёл ненужными
    pub skipped: usize,
}

struct ActiveJob {
    /// Задача, поставленная заново пока эта работала
    deferred: Option<Job>,
}

pub struct Scheduler {
    queue: JobQueue,
    active: HashMap<(JobKind, ChunkKey), ActiveJob>,
    pool: WorkerPool,
    runner: JobRunner,
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
    max_in_flight: usize,
    max_completions: usize,
    shut_down: bool,
}

impl Scheduler {
    pub fn new(runner: JobRunner, threads: usize, max_in_flight: usize, max_completions: usize) -> Self {
        let (tx, rx) = unbounded();
        Self {
            queue: JobQueue::new(),
            active: HashMap::new(),
            pool: WorkerPool::new(threads),
            runner,
            tx,
            rx,
            max_in_flight: max_in_flight.max(1),
            max_completions: max_completions.max(1),
            shut_down: false,
        }
    }

    pub fn from_settings(runner: JobRunner, settings: &TerrainSettings) -> Self {
        Self::new(
            runner,
            settings.worker_threads,
            settings.max_jobs_in_flight,
            settings.max_completions_per_tick,
        )
    }

    /// Поставить задачу. false после shutdown().
    pub fn enqueue(&mut self, job: Job) -> bool {
        if self.shut_down {
            return false;
        }
        if let Some(active) = self.active.get_mut(&(job.kind, job.key)) {
            active.deferred = Some(job);
            return true;
        }
        self.queue.push(job);
        true
    }

    /// Убрать ожидающую задачу (активная доработает и будет отброшена по токену)
    pub fn cancel(&mut self, kind: JobKind, key: ChunkKey) -> bool {
        let deferred = self
            .active
            .get_mut(&(kind, key))
            .map(|a| a.deferred.take().is_some())
            .unwrap_or(false);
        self.queue.remove(kind, key) || deferred
    }

    pub fn is_queued(&self, kind: JobKind, key: ChunkKey) -> bool {
        self.queue.contains(kind, key)
            || self
                .active
                .get(&(kind, key))
                .map(|a| a.deferred.is_some())
                .unwrap_or(false)
    }

    pub fn is_active(&self, kind: JobKind, key: ChunkKey) -> bool {
        self.active.contains_key(&(kind, key))
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty() && self.active.is_empty()
    }

    pub fn is_inline(&self) -> bool {
        self.pool.is_inline()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Пересчитать приоритеты ожидающих задач
    pub fn reprioritize(&mut self, priority: impl FnMut(&Job) -> JobPriority) {
        self.queue.reprioritize(priority);
    }

    /// Один тик: завершения, затем раздача
    pub fn tick(&mut self, source: &mut dyn JobSource, budget: TickBudget) -> TickReport {
        let start = Instant::now();
        let mut report = TickReport::default();

        self.drain(source, &mut report, start, budget);

        while !self.shut_down
            && self.active.len() < self.max_in_flight
            && report.dispatched < budget.max_dispatch
        {
            if report.dispatched > 0 && start.elapsed() >= budget.max_duration {
                break;
            }
            let job = match self.queue.pop() {
                Some(job) => job,
                None => break,
            };
            if job.token.is_cancelled() {
                log::debug!("[SCHED] Dropped stale {:?} job for {:?} before dispatch", job.kind, job.key);
                report.discarded += 1;
                source.discard(job.kind, job.key, false);
                continue;
            }
            let payload = match source.prepare(&job) {
                Some(payload) => payload,
                None => {
                    report.skipped += 1;
                    continue;
                }
            };
            self.active.insert((job.kind, job.key), ActiveJob { deferred: None });
            self.pool.execute(&self.runner, job, payload, &self.tx);
            report.dispatched += 1;
        }

        if self.pool.is_inline() {
            self.drain(source, &mut report, start, TickBudget::unlimited());
        }

        report
    }

    fn drain(&mut self, source: &mut dyn JobSource, report: &mut TickReport, start: Instant, budget: TickBudget) {
        let mut handled = 0;
        while handled < self.max_completions {
            if handled > 0 && start.elapsed() >= budget.max_duration {
                break;
            }
            let completion = match self.rx.try_recv() {
                Ok(completion) => completion,
                Err(_) => break,
            };
            handled += 1;
            self.finish(source, completion, report);
        }
    }

    fn finish(&mut self, source: &mut dyn JobSource, completion: Completion, report: &mut TickReport) {
        let (kind, key) = (completion.kind, completion.key);
        let deferred = self.active.remove(&(kind, key)).and_then(|a| a.deferred);

        if completion.is_stale() || self.shut_down {
            log::debug!("[SCHED] Discarded stale {:?} result for {:?}", kind, key);
            report.discarded += 1;
            source.discard(kind, key, true);
        } else {
            report.completed += 1;
            source.complete(completion);
        }

        if let Some(job) = deferred {
            if !self.shut_down {
                self.queue.push(job);
            }
        }
    }

    /// Остановить раздачу, дождаться активных задач (их результаты отбрасываются)
    pub fn shutdown(&mut self, source: &mut dyn JobSource) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;
        self.queue.clear();

        let mut report = TickReport::default();
        while !self.active.is_empty() {
            match self.rx.recv_timeout(SHUTDOWN_TIMEOUT) {
                Ok(completion) => self.finish(source, completion, &mut report),
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!("[SCHED] {} jobs did not finish before shutdown", self.active.len());
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.active.clear();
        log::debug!("[SCHED] Shut down, {} in-flight results dropped", report.discarded);
    }
}
