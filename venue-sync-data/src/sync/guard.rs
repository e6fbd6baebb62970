use std::{cell::RefCell, collections::BTreeSet, fmt};

/// Kinds of job the orchestrator runs; at most one of each at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobClass {
    /// Catch-up passes run once at startup.
    Bootstrap,
    /// Recurring single-pass runs.
    Incremental,
}

impl fmt::Display for JobClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bootstrap => "bootstrap",
            Self::Incremental => "incremental",
        })
    }
}

/// Set of job classes currently running.
///
/// # Examples
/// ```
/// use venue_sync_data::sync::{JobClass, RunGuards};
///
/// let guards = RunGuards::default();
/// let held = guards.try_acquire(JobClass::Incremental).expect("idle");
/// assert!(guards.try_acquire(JobClass::Incremental).is_none());
/// drop(held);
/// assert!(!guards.is_running(JobClass::Incremental));
/// ```
#[derive(Debug, Default)]
pub struct RunGuards {
    running: RefCell<BTreeSet<JobClass>>,
}

impl RunGuards {
    /// Mark `class` as running, or return `None` if it already is.
    #[must_use]
    pub fn try_acquire(&self, class: JobClass) -> Option<RunGuard<'_>> {
        let inserted = self.running.borrow_mut().insert(class);
        inserted.then(|| RunGuard {
            guards: self,
            class,
        })
    }

    /// Whether `class` is currently running.
    #[must_use]
    pub fn is_running(&self, class: JobClass) -> bool {
        self.running.borrow().contains(&class)
    }
}

/// Marks a job class as running until dropped.
#[derive(Debug)]
#[must_use = "the job class is released as soon as the guard is dropped"]
pub struct RunGuard<'a> {
    guards: &'a RunGuards,
    class: JobClass,
}

impl RunGuard<'_> {
    /// Job class held by this guard.
    pub const fn class(&self) -> JobClass {
        self.class
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.guards.running.borrow_mut().remove(&self.class);
    }
}
