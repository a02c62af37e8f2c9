//! Write coalescing for the encrypted scope.
//!
//! Coalesced writes are staged in a key-indexed map (last write wins) and
//! written by a single deferred flush per burst. The deferral runs on the
//! [`Microtasks`] queue, which the host drains after each synchronous turn.

use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// A staged write: `Some(raw)` to set, `None` to remove.
pub(crate) type PendingWrite = Option<String>;

/// Staged coalesced writes, keyed by raw key.
#[derive(Debug, Default)]
pub(crate) struct PendingWrites {
    staged: Mutex<BTreeMap<String, PendingWrite>>,
}

/// Staged writes split into the two batched backend calls of a flush.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct FlushPlan {
    pub(crate) set_keys: Vec<String>,
    pub(crate) set_values: Vec<String>,
    pub(crate) remove_keys: Vec<String>,
}

impl FlushPlan {
    pub(crate) fn is_empty(&self) -> bool {
        self.set_keys.is_empty() && self.remove_keys.is_empty()
    }
}

impl PendingWrites {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn stage(&self, key: &str, write: PendingWrite) {
        self.staged.lock().insert(key.to_string(), write);
    }

    /// Returns `Some(write)` if `key` has a staged write.
    pub(crate) fn lookup(&self, key: &str) -> Option<PendingWrite> {
        self.staged.lock().get(key).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.staged.lock().len()
    }

    /// Takes every staged write and partitions it into sets and removes.
    pub(crate) fn take_plan(&self) -> FlushPlan {
        let staged = std::mem::take(&mut *self.staged.lock());
        let mut plan = FlushPlan::default();
        for (key, write) in staged {
            match write {
                Some(raw) => {
                    plan.set_keys.push(key);
                    plan.set_values.push(raw);
                }
                None => plan.remove_keys.push(key),
            }
        }
        plan
    }

    /// Puts back writes from a failed flush without overriding newer ones.
    pub(crate) fn restore(&self, plan: FlushPlan) {
        let mut staged = self.staged.lock();
        for (key, raw) in plan.set_keys.into_iter().zip(plan.set_values) {
            staged.entry(key).or_insert(Some(raw));
        }
        for key in plan.remove_keys {
            staged.entry(key).or_insert(None);
        }
    }
}

type Task = Box<dyn FnOnce() + Send>;

/// Queue of deferred tasks run after the current synchronous turn.
///
/// Tasks queued while the queue is draining run in the same drain.
#[derive(Default)]
pub struct Microtasks {
    queue: Mutex<VecDeque<Task>>,
}

impl Microtasks {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `task` to run on the next drain.
    pub fn defer(&self, task: impl FnOnce() + Send + 'static) {
        self.queue.lock().push_back(Box::new(task));
    }

    /// Runs queued tasks until the queue is empty.
    ///
    /// Returns the number of tasks run.
    pub fn run(&self) -> usize {
        let mut ran = 0;
        loop {
            // Popped outside the task call; tasks may queue more work.
            let next = self.queue.lock().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => return ran,
            }
        }
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

impl fmt::Debug for Microtasks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Microtasks")
            .field("queued", &self.len())
            .finish()
    }
}
