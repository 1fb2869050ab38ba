use std::thread::{self, ThreadId};

/// Pins a component to the thread that created it.
///
/// State-mutating entry points call [`MainThread::check`], which panics when
/// invoked from any other thread.
#[derive(Debug, Clone, Copy)]
pub struct MainThread {
    owner: ThreadId,
}

impl MainThread {
    /// Bind to the current thread.
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    /// # Panics
    ///
    /// Panics if called off the owning thread.
    #[track_caller]
    pub fn check(&self, operation: &str) {
        if !self.is_current() {
            panic!(
                "{} must be called on the main thread ({:?}), called from {:?}",
                operation,
                self.owner,
                thread::current().id()
            );
        }
    }
}
