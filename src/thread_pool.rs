use {
    crate::{
        error::PoolError,
        unique_function::UniqueFunction,
    },
    log::{debug, error, trace},
    std::{
        any::Any,
        collections::VecDeque,
        num::NonZeroUsize,
        panic::{self, AssertUnwindSafe},
        sync::{
            mpsc::{self, Receiver, TryRecvError},
            Arc, Condvar, Mutex, MutexGuard, PoisonError,
        },
        thread::{self, JoinHandle},
    },
};

const DEFAULT_THREAD_NAME: &str = "minifunction-worker";

/// A queued unit of work.
struct Task(UniqueFunction<(), ()>);

// SAFETY: only ever built by `Task::new` from a `Send` closure.
unsafe impl Send for Task {}

impl Task {
    fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut f = Some(f);

        Task(UniqueFunction::new(move || {
            if let Some(f) = f.take() {
                f();
            }
        }))
    }

    fn run(mut self) {
        let result = self.0.call();
        debug_assert!(result.is_ok(), "queued task is never empty");
    }
}

struct State {
    tasks: VecDeque<Task>,
    /// Queued plus currently running tasks.
    pending: usize,
    stopped: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Signalled when a task is queued or the pool stops.
    work: Condvar,
    /// Signalled when `pending` drops to zero or the pool stops.
    idle: Condvar,
}

impl Shared {
    // Tasks run outside the lock, so a poisoned lock still holds consistent state.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, cv: &Condvar, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        cv.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

/// [`ThreadPool`] configuration.
///
/// [`ThreadPool`]: struct.ThreadPool.html
#[derive(Clone, Debug)]
pub struct ThreadPoolBuilder {
    num_threads: usize,
    thread_name: String,
    stack_size: Option<usize>,
}

impl Default for ThreadPoolBuilder {
    fn default() -> Self {
        Self {
            num_threads: thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
            stack_size: None,
        }
    }
}

impl ThreadPoolBuilder {
    /// Default configuration: one worker per available CPU.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of worker threads. Clamped to at least one.
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads.max(1);
        self
    }

    /// Worker thread name prefix; workers are named `<prefix>-<index>`.
    pub fn thread_name<S: Into<String>>(mut self, thread_name: S) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Worker thread stack size in bytes. Uses the platform default if not set.
    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.stack_size = Some(stack_size);
        self
    }

    /// Spawns the workers.
    pub fn build(self) -> Result<ThreadPool, PoolError> {
        let pool = ThreadPool {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    tasks: VecDeque::new(),
                    pending: 0,
                    stopped: false,
                }),
                work: Condvar::new(),
                idle: Condvar::new(),
            }),
            workers: Mutex::new(Vec::new()),
            config: self,
        };

        pool.spawn_workers()?;

        Ok(pool)
    }
}

/// Handle to the result of a task queued with [`ThreadPool::enqueue`].
///
/// [`ThreadPool::enqueue`]: struct.ThreadPool.html#method.enqueue
#[derive(Debug)]
pub struct TaskHandle<R> {
    result: Receiver<R>,
}

impl<R> TaskHandle<R> {
    /// Blocks until the task has run and returns its result.
    ///
    /// Returns [`PoolError::TaskLost`] if the task panicked or was dropped unrun.
    ///
    /// [`PoolError::TaskLost`]: enum.PoolError.html#variant.TaskLost
    pub fn join(self) -> Result<R, PoolError> {
        self.result.recv().map_err(|_| PoolError::TaskLost)
    }

    /// Returns the result if the task has already run, `Ok(None)` if it hasn't yet.
    ///
    /// The result is handed out once: after a call returned `Ok(Some(_))`,
    /// further calls (and [`join`]) return [`PoolError::TaskLost`].
    ///
    /// [`join`]: #method.join
    /// [`PoolError::TaskLost`]: enum.PoolError.html#variant.TaskLost
    pub fn try_join(&self) -> Result<Option<R>, PoolError> {
        match self.result.try_recv() {
            Ok(result) => Ok(Some(result)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(PoolError::TaskLost),
        }
    }
}

/// Fixed-size pool of worker threads running a FIFO queue of [`UniqueFunction`] tasks.
///
/// Each task is moved into the queue, taken out by exactly one worker and called exactly once.
///
/// ```
/// use minifunction::ThreadPool;
///
/// let pool = ThreadPool::new(2).unwrap();
/// let handle = pool.enqueue(|| 6 * 7).unwrap();
///
/// assert_eq!(handle.join().unwrap(), 42);
/// ```
///
/// [`UniqueFunction`]: struct.UniqueFunction.html
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    config: ThreadPoolBuilder,
}

impl ThreadPool {
    /// Creates a pool with `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Result<Self, PoolError> {
        Self::builder().num_threads(num_threads).build()
    }

    /// Returns a [`ThreadPoolBuilder`] to configure a new pool.
    ///
    /// [`ThreadPoolBuilder`]: struct.ThreadPoolBuilder.html
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder::new()
    }

    /// Number of worker threads the pool runs while not stopped.
    pub fn num_threads(&self) -> usize {
        self.config.num_threads
    }

    /// Returns `true` after [`stop`] or a failed worker spawn, until [`restart`].
    ///
    /// [`stop`]: #method.stop
    /// [`restart`]: #method.restart
    pub fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    /// Queues `f` for execution on one of the workers.
    ///
    /// Returns [`PoolError::Stopped`] if the pool was stopped.
    ///
    /// [`PoolError::Stopped`]: enum.PoolError.html#variant.Stopped
    pub fn enqueue<F, R>(&self, f: F) -> Result<TaskHandle<R>, PoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (sender, result) = mpsc::sync_channel(1);

        let task = Task::new(move || {
            // The handle may have been dropped; nobody wants the result then.
            let _ = sender.send(f());
        });

        {
            let mut state = self.shared.lock();

            if state.stopped {
                return Err(PoolError::Stopped);
            }

            state.tasks.push_back(task);
            state.pending += 1;
        }

        self.shared.work.notify_one();

        Ok(TaskHandle { result })
    }

    /// Blocks until every queued task has finished running.
    ///
    /// Returns immediately if the pool is stopped.
    pub fn wait(&self) {
        let mut state = self.shared.lock();

        while state.pending > 0 && !state.stopped {
            state = self.shared.wait(&self.shared.idle, state);
        }
    }

    /// Waits for the queue to drain, then shuts the workers down and joins them.
    ///
    /// New tasks are rejected until [`restart`]. Stopping a stopped pool is a no-op.
    ///
    /// [`restart`]: #method.restart
    pub fn stop(&self) {
        {
            let mut state = self.shared.lock();

            if state.stopped {
                return;
            }

            while state.pending > 0 {
                state = self.shared.wait(&self.shared.idle, state);
            }

            state.stopped = true;
        }

        debug!("stopping thread pool `{}`", self.config.thread_name);

        self.shared.work.notify_all();
        self.shared.idle.notify_all();

        self.join_workers();
    }

    /// Respawns the workers of a stopped pool. No-op if the pool is running.
    pub fn restart(&self) -> Result<(), PoolError> {
        {
            let mut state = self.shared.lock();

            if !state.stopped {
                return Ok(());
            }

            state.stopped = false;
        }

        debug!("restarting thread pool `{}`", self.config.thread_name);

        self.spawn_workers()
    }

    fn spawn_workers(&self) -> Result<(), PoolError> {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);

        for index in 0..self.config.num_threads {
            let mut builder =
                thread::Builder::new().name(format!("{}-{}", self.config.thread_name, index));

            if let Some(stack_size) = self.config.stack_size {
                builder = builder.stack_size(stack_size);
            }

            let shared = self.shared.clone();

            match builder.spawn(move || worker_loop(&shared, index)) {
                Ok(worker) => workers.push(worker),
                Err(err) => {
                    drop(workers);
                    self.shutdown();
                    return Err(err.into());
                }
            }
        }

        Ok(())
    }

    /// Stops without draining the queue and joins the workers.
    /// Undelivered tasks are dropped.
    fn shutdown(&self) {
        let undelivered = {
            let mut state = self.shared.lock();

            state.stopped = true;
            state.pending -= state.tasks.len();
            state.tasks.drain(..).collect::<Vec<_>>()
        };

        if !undelivered.is_empty() {
            debug!(
                "dropping {} undelivered task(s) of thread pool `{}`",
                undelivered.len(),
                self.config.thread_name
            );
        }

        // Drop the tasks outside the lock.
        drop(undelivered);

        self.shared.work.notify_all();
        self.shared.idle.notify_all();

        self.join_workers();
    }

    fn join_workers(&self) {
        let workers = {
            let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
            workers.drain(..).collect::<Vec<_>>()
        };

        for worker in workers {
            if worker.join().is_err() {
                error!("thread pool `{}` worker panicked", self.config.thread_name);
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(shared: &Shared, index: usize) {
    trace!("worker {} started", index);

    loop {
        let task = {
            let mut state = shared.lock();

            loop {
                if state.stopped {
                    trace!("worker {} exiting", index);
                    return;
                }

                if let Some(task) = state.tasks.pop_front() {
                    break task;
                }

                state = shared.wait(&shared.work, state);
            }
        };

        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            error!("worker {}: task panicked: {}", index, panic_message(&*payload));
        }

        let mut state = shared.lock();

        state.pending -= 1;

        if state.pending == 0 {
            shared.idle.notify_all();
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        std::{
            sync::atomic::{AtomicUsize, Ordering},
            time::Duration,
        },
    };

    #[test]
    fn enqueue_and_join() {
        let pool = ThreadPool::new(3).unwrap();

        let res = pool.enqueue(|| 42).unwrap();
        assert_eq!(res.join().unwrap(), 42);

        let text = pool.enqueue(|| "done".to_string()).unwrap();
        assert_eq!(text.join().unwrap(), "done");
    }

    #[test]
    fn wait_runs_everything() {
        let pool = ThreadPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = counter.clone();
            pool.enqueue(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.wait();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn stop_drains_then_rejects() {
        let pool = ThreadPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.enqueue(move || {
                thread::sleep(Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        pool.stop();
        assert!(pool.is_stopped());
        assert_eq!(counter.load(Ordering::SeqCst), 10);

        assert!(matches!(pool.enqueue(|| ()), Err(PoolError::Stopped)));

        // Idempotent.
        pool.stop();
        pool.wait();
    }

    #[test]
    fn restart() {
        let pool = ThreadPool::new(1).unwrap();

        pool.stop();
        assert!(pool.enqueue(|| 1).is_err());

        pool.restart().unwrap();
        assert!(!pool.is_stopped());
        assert_eq!(pool.enqueue(|| 1).unwrap().join().unwrap(), 1);

        // Restarting a running pool does nothing.
        pool.restart().unwrap();
        assert_eq!(pool.enqueue(|| 2).unwrap().join().unwrap(), 2);
    }

    #[test]
    fn panicking_task() {
        let pool = ThreadPool::new(1).unwrap();

        let lost = pool.enqueue(|| -> i32 { panic!("boom") }).unwrap();
        assert!(matches!(lost.join(), Err(PoolError::TaskLost)));

        // The worker survived.
        assert_eq!(pool.enqueue(|| 5).unwrap().join().unwrap(), 5);

        pool.wait();
    }

    #[test]
    fn drop_discards_queue() {
        let pool = ThreadPool::new(1).unwrap();
        let (started_tx, started_rx) = mpsc::channel::<()>();

        // Keep the only worker busy while the pool is dropped.
        let first = pool
            .enqueue(move || {
                let _ = started_tx.send(());
                thread::sleep(Duration::from_millis(100));
            })
            .unwrap();

        started_rx.recv().unwrap();

        let handles = (0..5)
            .map(|i| pool.enqueue(move || i).unwrap())
            .collect::<Vec<_>>();

        drop(pool);

        assert!(first.join().is_ok());

        for handle in handles {
            assert!(matches!(handle.join(), Err(PoolError::TaskLost)));
        }
    }

    #[test]
    fn try_join() {
        let pool = ThreadPool::new(1).unwrap();
        let (go_tx, go_rx) = mpsc::channel::<()>();

        let handle = pool
            .enqueue(move || {
                let _ = go_rx.recv();
                3
            })
            .unwrap();

        assert!(matches!(handle.try_join(), Ok(None)));

        go_tx.send(()).unwrap();
        pool.wait();

        assert!(matches!(handle.try_join(), Ok(Some(3))));

        // Handed out once.
        assert!(matches!(handle.try_join(), Err(PoolError::TaskLost)));
        assert!(matches!(handle.join(), Err(PoolError::TaskLost)));
    }

    #[test]
    fn task_runs_once() {
        let runs = Arc::new(AtomicUsize::new(0));

        let task = {
            let runs = runs.clone();
            Task::new(move || {
                runs.fetch_add(1, Ordering::SeqCst);
            })
        };

        task.run();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn builder() {
        let pool = ThreadPool::builder()
            .num_threads(0)
            .thread_name("custom")
            .stack_size(256 * 1024)
            .build()
            .unwrap();

        assert_eq!(pool.num_threads(), 1);

        let name = pool
            .enqueue(|| thread::current().name().map(str::to_owned))
            .unwrap()
            .join()
            .unwrap();

        assert_eq!(name.as_deref(), Some("custom-0"));
    }
}
