use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::{CozipHuffmanError, lock};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueueState {
    jobs: VecDeque<Job>,
    stopping: bool,
}

struct Shared {
    state: Mutex<QueueState>,
    wake: Condvar,
    live_workers: AtomicUsize,
    completed_tasks: AtomicUsize,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, QueueState> {
        lock(&self.state)
    }
}

/// Fixed-size pool of OS threads pulling from one shared FIFO queue.
///
/// Stopping does not run the rest of the queue: every job that no worker
/// has picked up is dropped when the stop flag is raised, and its
/// [`TaskHandle`] resolves to [`CozipHuffmanError::TaskAbandoned`]. Every
/// worker is joined before the pool is dropped.
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    worker_count: usize,
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("worker_count", &self.worker_count)
            .field("live_workers", &self.live_workers())
            .field("queued_tasks", &self.queued_tasks())
            .finish()
    }
}

/// Receives the outcome of one submitted task.
#[derive(Debug)]
pub struct TaskHandle<T> {
    receiver: Receiver<Result<T, String>>,
}

impl<T> TaskHandle<T> {
    /// Blocks until the task has run or been abandoned.
    pub fn join(self) -> Result<T, CozipHuffmanError> {
        match self.receiver.recv() {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(CozipHuffmanError::TaskPanicked(message)),
            Err(_) => Err(CozipHuffmanError::TaskAbandoned),
        }
    }
}

impl ThreadPool {
    pub fn new(worker_count: usize) -> Result<Self, CozipHuffmanError> {
        if worker_count == 0 {
            return Err(CozipHuffmanError::InvalidOptions(
                "worker_count must be greater than 0",
            ));
        }

        let pool = Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState {
                    jobs: VecDeque::new(),
                    stopping: false,
                }),
                wake: Condvar::new(),
                live_workers: AtomicUsize::new(0),
                completed_tasks: AtomicUsize::new(0),
            }),
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            worker_count,
        };

        for index in 0..worker_count {
            let shared = Arc::clone(&pool.shared);
            pool.shared.live_workers.fetch_add(1, Ordering::AcqRel);
            let spawned = thread::Builder::new()
                .name(format!("cozip-huffman-{index}"))
                .spawn(move || worker_loop(&shared));

            match spawned {
                Ok(handle) => lock(&pool.workers).push(handle),
                Err(err) => {
                    pool.shared.live_workers.fetch_sub(1, Ordering::AcqRel);
                    log::error!("[cozip-huffman] failed to spawn worker {index}: {err}");
                    // dropping `pool` joins the workers that did start
                    return Err(CozipHuffmanError::PoolSpawn(err));
                }
            }
        }

        log::debug!("[cozip-huffman] thread pool started with {worker_count} workers");
        Ok(pool)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::Acquire)
    }

    pub fn completed_tasks(&self) -> usize {
        self.shared.completed_tasks.load(Ordering::Acquire)
    }

    pub fn queued_tasks(&self) -> usize {
        self.shared.state().jobs.len()
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.state().stopping
    }

    /// Queues `task` and returns a handle to its result. A panic inside the
    /// task is captured in the handle; the worker keeps running.
    pub fn submit<F, T>(&self, task: F) -> Result<TaskHandle<T>, CozipHuffmanError>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (sender, receiver) = mpsc::sync_channel(1);
        let job: Job = Box::new(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(task)).map_err(panic_message);
            // the caller may have dropped its handle
            let _ = sender.send(outcome);
        });

        {
            let mut state = self.shared.state();
            if state.stopping {
                return Err(CozipHuffmanError::PoolShutdown);
            }
            state.jobs.push_back(job);
        }
        self.shared.wake.notify_one();

        Ok(TaskHandle { receiver })
    }

    /// Raises the stop flag, drops every queued job and wakes idle workers
    /// without waiting for running jobs.
    pub fn stop(&self) {
        self.stop_and_drain();
    }

    /// Stops the pool and joins every worker.
    pub fn shutdown(&self) {
        let abandoned = self.stop_and_drain();

        let handles = std::mem::take(&mut *lock(&self.workers));
        let joined = handles.len();
        for handle in handles {
            if handle.join().is_err() {
                log::error!("[cozip-huffman] worker thread terminated abnormally");
            }
        }

        if joined > 0 {
            log::debug!(
                "[cozip-huffman] thread pool joined {joined} workers, abandoned {abandoned} queued tasks"
            );
        }
    }

    /// Returns how many queued jobs were dropped. The jobs, and with them the
    /// senders their handles wait on, are released after the lock.
    fn stop_and_drain(&self) -> usize {
        let abandoned = {
            let mut state = self.shared.state();
            state.stopping = true;
            std::mem::take(&mut state.jobs)
        };
        self.shared.wake.notify_all();
        abandoned.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared) {
    while let Some(job) = next_job(shared) {
        job();
        shared.completed_tasks.fetch_add(1, Ordering::AcqRel);
    }
    shared.live_workers.fetch_sub(1, Ordering::AcqRel);
}

fn next_job(shared: &Shared) -> Option<Job> {
    let mut state = shared.state();
    while state.jobs.is_empty() && !state.stopping {
        state = shared
            .wake
            .wait(state)
            .unwrap_or_else(PoisonError::into_inner);
    }

    if state.stopping {
        return None;
    }
    state.jobs.pop_front()
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "task panicked".to_string()
}
