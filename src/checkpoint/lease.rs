//! Per-thread mutual exclusion.
//!
//! A thread may only have one run invocation in flight. A second `start` or
//! `resume` on the same thread fails fast instead of racing the first one to
//! write checkpoints. Each store hands out its own kind of lease: the
//! in-memory one below for a single process, a lease row for SQLite.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::CheckpointError;

type Release = Box<dyn FnOnce() + Send>;

/// Proof that the holder has exclusive use of one thread. Released on drop.
pub struct ThreadLease {
    thread_id: String,
    release: Option<Release>,
}

impl ThreadLease {
    /// A lease that runs `release` exactly once when dropped.
    pub fn new(thread_id: impl Into<String>, release: impl FnOnce() + Send + 'static) -> Self {
        Self {
            thread_id: thread_id.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }
}

impl std::fmt::Debug for ThreadLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadLease")
            .field("thread_id", &self.thread_id)
            .finish_non_exhaustive()
    }
}

impl Drop for ThreadLease {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

/// Process-local registry of threads that currently hold a lease.
#[derive(Clone, Default)]
pub struct ThreadLeases {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ThreadLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the lease for `thread_id`. Returns `Ok(None)` if someone else
    /// already holds it.
    pub fn try_acquire(&self, thread_id: &str) -> Result<Option<ThreadLease>, CheckpointError> {
        let mut held = self.held.lock().map_err(|_| CheckpointError::Poisoned)?;
        if !held.insert(thread_id.to_string()) {
            return Ok(None);
        }

        let set = Arc::clone(&self.held);
        let key = thread_id.to_string();
        Ok(Some(ThreadLease::new(thread_id, move || {
            // A poisoned set still needs the entry gone, or the thread stays locked.
            let mut held = match set.lock() {
                Ok(held) => held,
                Err(poisoned) => poisoned.into_inner(),
            };
            held.remove(&key);
        })))
    }

    pub fn is_held(&self, thread_id: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(thread_id))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn second_acquire_fails_until_release() {
        let leases = ThreadLeases::new();

        let first = leases.try_acquire("t1").unwrap();
        assert!(first.is_some());
        assert!(leases.is_held("t1"));
        assert!(leases.try_acquire("t1").unwrap().is_none());

        drop(first);
        assert!(!leases.is_held("t1"));
        assert!(leases.try_acquire("t1").unwrap().is_some());
    }

    #[test]
    fn distinct_threads_do_not_contend() {
        let leases = ThreadLeases::new();
        let a = leases.try_acquire("a").unwrap().unwrap();
        let b = leases.try_acquire("b").unwrap().unwrap();
        assert_eq!(a.thread_id(), "a");
        assert_eq!(b.thread_id(), "b");
    }

    #[test]
    fn release_runs_once_on_drop() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let lease = ThreadLease::new("t1", move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(released.load(Ordering::SeqCst), 0);
        drop(lease);
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn concurrent_acquire_has_one_winner() {
        use std::sync::Barrier;

        let leases = ThreadLeases::new();
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let leases = leases.clone();
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    // Hold the lease (if won) until every contender has tried.
                    let lease = leases.try_acquire("shared").unwrap();
                    let won = lease.is_some();
                    barrier.wait();
                    won
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
