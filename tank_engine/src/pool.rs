//! Pre-provisioned execution environments plus the worker threads that use
//! them. The two are sized independently: running code needs a worker slot
//! *and* a checked-out environment.

use std::{
    any::Any,
    fs,
    ops::{Deref, DerefMut},
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Condvar, Mutex, MutexGuard, PoisonError,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::Sender;
use log::{debug, info, warn};
use tempfile::TempDir;

use crate::{
    env::{Environment, ProcessEnvironment},
    error::{Error, Result},
};

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct Pool {
    scratch_root: PathBuf,
    shelf: Mutex<Vec<Box<dyn Environment>>>,
    returned: Condvar,
    capacity: AtomicUsize,
    checkouts: AtomicUsize,
    checkins: AtomicUsize,
    checkout_timeout: Option<Duration>,
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

/// Counters for environment traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub idle: usize,
    pub checkouts: usize,
    pub checkins: usize,
}

impl Pool {
    /// Creates a pool with `threads` workers and no environments yet.
    pub fn new(threads: usize, scratch_root: impl Into<PathBuf>) -> Result<Self> {
        if threads == 0 {
            return Err(Error::Argument("a pool needs at least one worker thread".into()));
        }
        let scratch_root = scratch_root.into();
        fs::create_dir_all(&scratch_root)?;

        let (sender, receiver) = crossbeam_channel::unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads);
        for i in 0..threads {
            let receiver = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("tank-worker-{}", i))
                .spawn(move || {
                    for job in receiver.iter() {
                        job();
                    }
                })?;
            workers.push(handle);
        }
        info!(
            "pool started with {} worker(s), scratch root {}",
            threads,
            scratch_root.display()
        );

        Ok(Self {
            scratch_root,
            shelf: Mutex::new(Vec::new()),
            returned: Condvar::new(),
            capacity: AtomicUsize::new(0),
            checkouts: AtomicUsize::new(0),
            checkins: AtomicUsize::new(0),
            checkout_timeout: None,
            sender: Some(sender),
            workers,
        })
    }

    /// Creates a pool backed by `environments` process environments.
    pub fn with_process_envs(
        environments: usize,
        threads: usize,
        scratch_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let pool = Self::new(threads, scratch_root)?;
        for id in 0..environments {
            pool.add_env(Box::new(ProcessEnvironment::new(id)?));
        }
        Ok(pool)
    }

    /// Bounds how long `take` waits for environments to come back.
    pub fn with_checkout_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.checkout_timeout = timeout;
        self
    }

    pub fn add_env(&self, env: Box<dyn Environment>) {
        self.lock_shelf().push(env);
        self.capacity.fetch_add(1, Ordering::SeqCst);
        self.returned.notify_all();
    }

    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::SeqCst)
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Checks out `n` environments, blocking until all of them are free.
    pub fn take(&self, n: usize) -> Result<Vec<EnvGuard<'_>>> {
        let capacity = self.capacity();
        if n > capacity {
            return Err(Error::PoolExhausted {
                requested: n,
                available: capacity,
            });
        }

        let deadline = self.checkout_timeout.map(|t| Instant::now() + t);
        let mut shelf = self.lock_shelf();
        while shelf.len() < n {
            shelf = match deadline {
                None => self
                    .returned
                    .wait(shelf)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::PoolExhausted {
                            requested: n,
                            available: shelf.len(),
                        });
                    }
                    self.returned
                        .wait_timeout(shelf, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }

        let at = shelf.len() - n;
        let envs = shelf.split_off(at);
        drop(shelf);
        self.checkouts.fetch_add(n, Ordering::SeqCst);
        Ok(envs
            .into_iter()
            .map(|env| EnvGuard {
                pool: self,
                env: Some(env),
            })
            .collect())
    }

    pub fn take_one(&self) -> Result<EnvGuard<'_>> {
        let mut envs = self.take(1)?;
        envs.pop().ok_or(Error::PoolExhausted {
            requested: 1,
            available: 0,
        })
    }

    fn give_back(&self, env: Box<dyn Environment>) {
        self.lock_shelf().push(env);
        self.checkins.fetch_add(1, Ordering::SeqCst);
        self.returned.notify_all();
    }

    /// Queues `task` on the worker threads and returns immediately. A panic
    /// in the task is caught on the worker.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| Error::SandboxFailure("worker queue is closed".into()))?;
        let job: Job = Box::new(move || {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                warn!("worker task panicked: {}", panic_message(payload.as_ref()));
            }
        });
        sender
            .send(job)
            .map_err(|_| Error::SandboxFailure("worker queue is closed".into()))
    }

    /// Fresh private directory under the scratch root.
    pub fn scratch_dir(&self) -> Result<TempDir> {
        let dir = tempfile::Builder::new()
            .prefix("tank-")
            .tempdir_in(&self.scratch_root)?;
        debug!("created scratch dir {}", dir.path().display());
        Ok(dir)
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            idle: self.lock_shelf().len(),
            checkouts: self.checkouts.load(Ordering::SeqCst),
            checkins: self.checkins.load(Ordering::SeqCst),
        }
    }

    fn lock_shelf(&self) -> MutexGuard<'_, Vec<Box<dyn Environment>>> {
        self.shelf.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        // closing the queue lets workers drain what is left and exit
        drop(self.sender.take());
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("worker thread exited abnormally");
            }
        }
    }
}

/// A checked-out environment. Dropping it returns the environment to its
/// pool.
pub struct EnvGuard<'a> {
    pool: &'a Pool,
    env: Option<Box<dyn Environment>>,
}

impl Deref for EnvGuard<'_> {
    type Target = dyn Environment;

    fn deref(&self) -> &Self::Target {
        self.env.as_deref().expect("environment is held until drop")
    }
}

impl DerefMut for EnvGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.env.as_deref_mut().expect("environment is held until drop")
    }
}

impl Drop for EnvGuard<'_> {
    fn drop(&mut self) {
        if let Some(env) = self.env.take() {
            self.pool.give_back(env);
        }
    }
}

/// Runs `task` and turns a panic into `Error::WorkerPanic`, so a worker
/// always ends with a status value.
pub fn capture<T, F>(task: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(task)) {
        Ok(status) => status,
        Err(payload) => Err(Error::WorkerPanic(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        env::{RunOutcome, RunRequest},
        Limit,
    };
    use std::sync::Arc;

    struct Nop;

    impl Environment for Nop {
        fn run(&mut self, _request: &RunRequest) -> Result<RunOutcome> {
            Ok(RunOutcome::default())
        }
    }

    fn pool_with(envs: usize, threads: usize) -> (Pool, TempDir) {
        let root = tempfile::tempdir().unwrap();
        let pool = Pool::new(threads, root.path()).unwrap();
        for _ in 0..envs {
            pool.add_env(Box::new(Nop));
        }
        (pool, root)
    }

    #[test]
    fn take_and_return() -> Result<()> {
        let (pool, _root) = pool_with(2, 1);
        {
            let mut envs = pool.take(2)?;
            assert_eq!(pool.stats().idle, 0);
            let request = RunRequest::new("/bin/true", "/", Limit::default());
            envs[0].run(&request)?;
        }
        let stats = pool.stats();
        assert_eq!(stats.idle, 2);
        assert_eq!(stats.checkouts, 2);
        assert_eq!(stats.checkins, 2);
        Ok(())
    }

    #[test]
    fn requesting_more_than_capacity_fails() {
        let (pool, _root) = pool_with(1, 1);
        let err = pool.take(2).err().unwrap();
        assert!(matches!(
            err,
            Error::PoolExhausted {
                requested: 2,
                available: 1
            }
        ));
    }

    #[test]
    fn checkout_timeout_is_reported() {
        let (pool, _root) = pool_with(1, 1);
        let pool = pool.with_checkout_timeout(Some(Duration::from_millis(50)));
        let _held = pool.take_one().unwrap();
        let err = pool.take_one().err().unwrap();
        assert!(matches!(err, Error::PoolExhausted { requested: 1, available: 0 }));
    }

    #[test]
    fn take_blocks_until_returned() -> Result<()> {
        let (pool, _root) = pool_with(1, 2);
        let pool = Arc::new(pool);
        let (tx, rx) = crossbeam_channel::bounded(1);
        let held = pool.take_one()?;
        let worker_pool = Arc::clone(&pool);
        pool.submit(move || {
            let got = worker_pool.take_one().is_ok();
            tx.send(got).unwrap();
        })?;
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        drop(held);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), true);
        Ok(())
    }

    #[test]
    fn panicking_task_does_not_kill_worker() -> Result<()> {
        let (pool, _root) = pool_with(0, 1);
        pool.submit(|| panic!("boom"))?;
        let (tx, rx) = crossbeam_channel::bounded(1);
        pool.submit(move || tx.send(42).unwrap())?;
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
        Ok(())
    }

    #[test]
    fn capture_converts_panics() {
        let status: Result<()> = capture(|| panic!("worker exploded"));
        match status {
            Err(Error::WorkerPanic(msg)) => assert_eq!(msg, "worker exploded"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(capture(|| Ok(3)).unwrap(), 3);
    }

    #[test]
    fn zero_threads_is_rejected() {
        let root = tempfile::tempdir().unwrap();
        assert!(matches!(Pool::new(0, root.path()), Err(Error::Argument(_))));
    }

    #[test]
    fn scratch_dirs_live_under_root() -> Result<()> {
        let (pool, root) = pool_with(0, 1);
        let dir = pool.scratch_dir()?;
        assert!(dir.path().starts_with(root.path()));
        Ok(())
    }
}
