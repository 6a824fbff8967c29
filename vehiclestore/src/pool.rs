//! Elastic worker pool for blocking store calls.
//!
//! The pool keeps `core_threads` workers warm and grows up to `max_threads`
//! when no idle worker can take a submission. A submission is first offered
//! to a waiting worker over a zero-capacity channel, so a worker counts as
//! available only while it is blocked waiting. Threads beyond the core retire
//! after `keep_alive` without work. Submissions are never rejected: once the
//! pool is at its ceiling, work waits on an unbounded queue. This policy is
//! fixed at construction and cannot be replaced.
//!
//! Two entry points sit on top of [`ElasticPool::execute`]:
//! - [`ElasticPool::spawn`] returns a [`TaskHandle`] that can be awaited from
//!   async code or joined from a blocking caller
//! - [`ElasticPool::fan_out`] maps a function over items in parallel; the
//!   calling thread takes part in the work, so it is safe to call from inside
//!   a pool task even when every worker is busy

use crossbeam::channel::{self, select, Receiver, RecvTimeoutError, Sender, TrySendError};
use crossbeam::queue::SegQueue;
use futures::channel::oneshot;
use parking_lot::Mutex;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error};

use crate::config::PoolSettings;
use crate::error::{Result, StoreError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Pool sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub core_threads: usize,
    pub max_threads: usize,
    pub keep_alive: Duration,
}

impl PoolConfig {
    /// Clamps `core_threads` to at least one and `max_threads` to at least
    /// `core_threads`.
    pub fn new(core_threads: usize, max_threads: usize, keep_alive: Duration) -> Self {
        let core_threads = core_threads.max(1);
        Self {
            core_threads,
            max_threads: max_threads.max(core_threads),
            keep_alive,
        }
    }
}

impl From<&PoolSettings> for PoolConfig {
    fn from(settings: &PoolSettings) -> Self {
        let (core, max) = settings.resolved();
        Self::new(core, max, settings.keep_alive())
    }
}

struct PoolState {
    threads: usize,
    idle: usize,
    spawned: usize,
    sender: Option<Sender<Job>>,
    handles: Vec<JoinHandle<()>>,
}

struct Inner {
    config: PoolConfig,
    state: Mutex<PoolState>,
    receiver: Receiver<Job>,
    handoff: (Sender<Job>, Receiver<Job>),
}

/// Thread pool that grows under load and never rejects work.
pub struct ElasticPool {
    inner: Arc<Inner>,
}

impl ElasticPool {
    pub fn new(config: PoolConfig) -> Self {
        let (sender, receiver) = channel::unbounded();
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(PoolState {
                    threads: 0,
                    idle: 0,
                    spawned: 0,
                    sender: Some(sender),
                    handles: Vec::new(),
                }),
                receiver,
                handoff: channel::bounded(0),
            }),
        }
    }

    pub fn from_settings(settings: &PoolSettings) -> Self {
        Self::new(PoolConfig::from(settings))
    }

    pub fn config(&self) -> PoolConfig {
        self.inner.config
    }

    /// Live worker threads.
    pub fn pool_size(&self) -> usize {
        self.inner.state.lock().threads
    }

    /// Workers currently waiting for work.
    pub fn idle_threads(&self) -> usize {
        self.inner.state.lock().idle
    }

    /// Submissions waiting for a worker.
    pub fn queued_tasks(&self) -> usize {
        self.inner.receiver.len()
    }

    /// Runs `job` on the pool.
    ///
    /// Fails only after [`ElasticPool::shutdown`].
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let config = self.inner.config;
        let mut state = self.inner.state.lock();
        let sender = state.sender.as_ref().ok_or(StoreError::PoolShutdown)?;

        let mut job: Job = Box::new(job);
        if state.threads >= config.core_threads {
            match self.inner.handoff.0.try_send(job) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(rejected)) | Err(TrySendError::Disconnected(rejected)) => {
                    job = rejected;
                }
            }
        }
        let grow = state.threads < config.max_threads;

        sender.send(job).map_err(|_| StoreError::PoolShutdown)?;

        if grow {
            self.spawn_worker(&mut state);
        }
        Ok(())
    }

    /// Runs `task` on the pool and returns a handle to its result.
    pub fn spawn<F, T>(&self, task: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.execute(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task));
            if outcome.is_err() {
                error!("pool task panicked");
            }
            let _ = tx.send(outcome);
        })?;
        Ok(TaskHandle { receiver: rx })
    }

    /// Applies `f` to every item in parallel. Results come back unordered.
    ///
    /// Up to `max_threads` helper jobs are queued; the calling thread drains
    /// the same work queue, so completion never depends on a free worker.
    pub fn fan_out<I, T, F>(&self, items: Vec<I>, f: F) -> Result<Vec<T>>
    where
        I: Send + 'static,
        T: Send + 'static,
        F: Fn(I) -> T + Send + Sync + 'static,
    {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let work = Arc::new(SegQueue::new());
        for item in items {
            work.push(item);
        }
        let f = Arc::new(f);
        let (tx, rx) = channel::unbounded();

        let helpers = (total - 1).min(self.inner.config.max_threads);
        for _ in 0..helpers {
            let work = Arc::clone(&work);
            let f = Arc::clone(&f);
            let tx = tx.clone();
            if self.execute(move || drain(&work, f.as_ref(), &tx)).is_err() {
                break;
            }
        }
        drain(&work, f.as_ref(), &tx);
        drop(tx);

        let mut results = Vec::with_capacity(total);
        let mut panicked = false;
        for outcome in rx.iter().take(total) {
            match outcome {
                Ok(value) => results.push(value),
                Err(_) => panicked = true,
            }
        }
        if panicked {
            error!("fan-out task panicked");
            return Err(StoreError::TaskPanicked);
        }
        Ok(results)
    }

    /// Stops accepting work, lets workers drain the queue and joins them.
    pub fn shutdown(&self) {
        let handles = {
            let mut state = self.inner.state.lock();
            state.sender.take();
            std::mem::take(&mut state.handles)
        };
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
        debug!("worker pool shut down");
    }

    fn spawn_worker(&self, state: &mut PoolState) {
        state.handles.retain(|handle| !handle.is_finished());
        state.threads += 1;
        state.spawned += 1;

        let inner = Arc::clone(&self.inner);
        let spawned = thread::Builder::new()
            .name(format!("vehiclestore-io-{}", state.spawned))
            .spawn(move || worker_loop(inner));
        match spawned {
            Ok(handle) => state.handles.push(handle),
            Err(e) => {
                state.threads -= 1;
                error!(error = %e, threads = state.threads, "failed to spawn pool worker");
            }
        }
    }
}

impl Drop for ElasticPool {
    fn drop(&mut self) {
        self.inner.state.lock().sender.take();
    }
}

fn worker_loop(inner: Arc<Inner>) {
    loop {
        inner.state.lock().idle += 1;
        let received = select! {
            recv(inner.receiver) -> job => job.map_err(|_| RecvTimeoutError::Disconnected),
            recv(inner.handoff.1) -> job => job.map_err(|_| RecvTimeoutError::Disconnected),
            default(inner.config.keep_alive) => Err(RecvTimeoutError::Timeout),
        };

        let mut state = inner.state.lock();
        state.idle -= 1;
        match received {
            Ok(job) => {
                drop(state);
                if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("pool job panicked");
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                if state.threads > inner.config.core_threads && inner.receiver.is_empty() {
                    state.threads -= 1;
                    debug!(threads = state.threads, "retiring idle worker");
                    return;
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                state.threads -= 1;
                return;
            }
        }
    }
}

fn drain<I, T, F>(work: &SegQueue<I>, f: &F, results: &Sender<thread::Result<T>>)
where
    F: Fn(I) -> T,
{
    while let Some(item) = work.pop() {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(item)));
        if results.send(outcome).is_err() {
            return;
        }
    }
}

/// Result of a task submitted with [`ElasticPool::spawn`].
///
/// Await it from async code, or call [`TaskHandle::join`] from a thread that
/// is not a pool worker.
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<thread::Result<T>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task finishes.
    pub fn join(self) -> Result<T> {
        futures::executor::block_on(self)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(Ok(value))) => Poll::Ready(Ok(value)),
            Poll::Ready(Ok(Err(_))) => Poll::Ready(Err(StoreError::TaskPanicked)),
            Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(StoreError::PoolShutdown)),
        }
    }
}
