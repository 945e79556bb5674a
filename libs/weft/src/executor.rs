// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! A fixed-size pool of worker threads.

mod park;

use std::collections::VecDeque;
use std::io;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use park::ParkingLot;
use parking_lot::Mutex;

use crate::error::Closed;
use crate::task::{ExecutionContext, PackagedTask};

/// An [`ExecutionContext`] running tasks on a fixed set of worker threads.
///
/// Tasks are started in the order they were submitted. Idle workers park until new work arrives.
/// Stopping the pool (explicitly through [`ThreadPool::stop`] or by dropping it) lets every worker
/// finish the task it is running, tasks still waiting in the queue are dropped and their futures
/// resolve to canceled.
///
/// ```
/// use weft::executor::ThreadPool;
/// use weft::task::{Task, schedule};
///
/// let pool = ThreadPool::builder().num_workers(2).build().unwrap();
/// let mut future = schedule(&pool, Task::new(|_| "hello")).unwrap();
/// assert_eq!(future.wait(), Ok("hello"));
/// ```
#[derive(Debug)]
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

/// Configures and spawns a [`ThreadPool`].
#[derive(Debug, Clone)]
pub struct ThreadPoolBuilder {
    num_workers: Option<NonZeroUsize>,
    thread_name: String,
    stack_size: Option<usize>,
}

#[derive(Debug)]
struct Shared {
    queue: Mutex<Queue>,
    /// Mirrors `Queue::stopped` so workers can check it without taking the lock.
    stopped: AtomicBool,
    parking_lot: ParkingLot,
}

#[derive(Debug, Default)]
struct Queue {
    tasks: VecDeque<PackagedTask>,
    stopped: bool,
}

enum Next {
    Run(PackagedTask),
    Idle,
    Stop,
}

// === impl ThreadPool ===

impl ThreadPool {
    /// Spawns a pool with one worker per available CPU.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread could not be spawned.
    pub fn new() -> io::Result<Self> {
        Self::builder().build()
    }

    #[must_use]
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    #[must_use]
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Returns the number of workers currently parked waiting for work.
    #[must_use]
    pub fn num_idle(&self) -> usize {
        self.shared.parking_lot.num_parked()
    }

    /// Stops accepting new tasks and tells the workers to exit.
    ///
    /// Workers finish their current task first. Does not wait for them, dropping the pool does.
    pub fn stop(&self) {
        self.shared.stop();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::Acquire)
    }
}

impl ExecutionContext for ThreadPool {
    fn submit(&self, task: PackagedTask) -> Result<(), Closed> {
        {
            let mut queue = self.shared.queue.lock();
            if queue.stopped {
                // dropping the task resolves its future to canceled
                return Err(Closed::new());
            }
            queue.tasks.push_back(task);
        }
        self.shared.parking_lot.unpark_one();
        Ok(())
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.stop();

        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }

        let abandoned = std::mem::take(&mut self.shared.queue.lock().tasks);
        if !abandoned.is_empty() {
            tracing::debug!(tasks = abandoned.len(), "canceling tasks left in the queue");
        }
        drop(abandoned);
    }
}

// === impl Shared ===

impl Shared {
    fn stop(&self) {
        let was_stopped = {
            let mut queue = self.queue.lock();
            std::mem::replace(&mut queue.stopped, true)
        };
        if !was_stopped {
            tracing::debug!("stopping thread pool");
            self.stopped.store(true, Ordering::Release);
        }
        self.parking_lot.unpark_all();
    }

    fn next_task(&self) -> Next {
        let mut queue = self.queue.lock();
        if queue.stopped {
            return Next::Stop;
        }
        queue.tasks.pop_front().map_or(Next::Idle, Next::Run)
    }

    fn should_park(&self) -> bool {
        let queue = self.queue.lock();
        !queue.stopped && queue.tasks.is_empty()
    }

    fn run_worker(&self, index: usize) {
        let _span = tracing::debug_span!("worker", worker = index).entered();
        tracing::debug!("worker started");

        loop {
            match self.next_task() {
                Next::Run(task) => task.run(),
                Next::Idle => {
                    tracing::trace!("no work, parking");
                    self.parking_lot.park(|| self.should_park());
                }
                Next::Stop => break,
            }
        }

        tracing::debug!("worker stopped");
    }
}

// === impl ThreadPoolBuilder ===

impl ThreadPoolBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            num_workers: None,
            thread_name: String::from("weft-worker"),
            stack_size: None,
        }
    }

    /// Sets the number of worker threads.
    ///
    /// Defaults to [`thread::available_parallelism`], or a single worker if that is unknown.
    /// A value of `0` is treated as `1`.
    #[must_use]
    pub fn num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = Some(NonZeroUsize::new(num_workers).unwrap_or(NonZeroUsize::MIN));
        self
    }

    /// Sets the name prefix of worker threads, workers are named `{prefix}-{index}`.
    ///
    /// Defaults to `weft-worker`.
    #[must_use]
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Sets the stack size of worker threads, defaults to the platform default.
    #[must_use]
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Spawns the workers.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread could not be spawned. Workers spawned up to that point
    /// are stopped and joined before returning.
    pub fn build(self) -> io::Result<ThreadPool> {
        let num_workers = self
            .num_workers
            .or_else(|| thread::available_parallelism().ok())
            .map_or(1, NonZeroUsize::get);

        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            stopped: AtomicBool::new(false),
            parking_lot: ParkingLot::with_capacity(num_workers),
        });
        let mut pool = ThreadPool {
            shared,
            workers: Vec::with_capacity(num_workers),
        };

        for index in 0..num_workers {
            let mut builder = thread::Builder::new().name(format!("{}-{index}", self.thread_name));
            if let Some(stack_size) = self.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let shared = pool.shared.clone();
            // on error `pool` is dropped, which stops and joins the workers spawned so far
            let worker = builder.spawn(move || shared.run_worker(index))?;
            pool.workers.push(worker);
        }

        tracing::debug!(num_workers, "thread pool started");
        Ok(pool)
    }
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}
