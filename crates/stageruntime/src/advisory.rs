//! One-shot signal that the built topology runs stages concurrently.
//!
//! Collaborators that own a shared dependency with a separate thread-safe
//! mode install a hook here; the hook runs at most once per advisory no
//! matter how many graphs are built or how many builds race each other.

use std::sync::atomic::{fence, AtomicBool, Ordering};
use std::sync::OnceLock;

type Hook = Box<dyn Fn() + Send + Sync>;

static GLOBAL: ParallelismAdvisory = ParallelismAdvisory::new();

/// Process-wide flag that starts `false` and flips to `true` at most once.
pub struct ParallelismAdvisory {
    fired: AtomicBool,
    notified: AtomicBool,
    hook: OnceLock<Hook>,
}

impl ParallelismAdvisory {
    pub const fn new() -> Self {
        Self {
            fired: AtomicBool::new(false),
            notified: AtomicBool::new(false),
            hook: OnceLock::new(),
        }
    }

    /// The advisory shared by the whole process.
    pub fn global() -> &'static ParallelismAdvisory {
        &GLOBAL
    }

    /// Install the notification hook. Only the first call wins; returns
    /// `false` when a hook was already installed. A hook installed after the
    /// advisory fired is called immediately.
    pub fn set_hook<F>(&self, hook: F) -> bool
    where
        F: Fn() + Send + Sync + 'static,
    {
        if self.hook.set(Box::new(hook)).is_err() {
            return false;
        }
        fence(Ordering::SeqCst);
        if self.fired.load(Ordering::SeqCst) {
            self.notify();
        }
        true
    }

    // Either `observe` or a late `set_hook` may get here; the hook runs once.
    fn notify(&self) {
        if let Some(hook) = self.hook.get() {
            if !self.notified.swap(true, Ordering::AcqRel) {
                hook();
            }
        }
    }

    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Report the branching classification of a freshly built graph.
    /// Returns `true` only for the call that performed the false→true flip.
    pub fn observe(&self, branching: bool) -> bool {
        if !branching {
            tracing::debug!("No parallelism detected; advisory left unchanged");
            return false;
        }

        if self
            .fired
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::trace!("Parallelism advisory already fired");
            return false;
        }

        tracing::info!("Parallelism detected; advising thread-safe mode");
        fence(Ordering::SeqCst);
        self.notify();
        true
    }
}

impl Default for ParallelismAdvisory {
    fn default() -> Self {
        Self::new()
    }
}
