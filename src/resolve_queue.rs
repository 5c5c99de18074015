//! Resolve Queue: the LIFO of settled-but-not-yet-applied batch results.

/// A value paired with the promise it settles, type-erased so that
/// resolutions for Batch Slots of different `K`/`V` can share one queue.
///
/// Settling is deferred until the Driver pops it off the queue, which is
/// what lets the Driver decide exactly when continuations get to run.
pub struct EnqueuedResolution {
    settle: Box<dyn FnOnce()>,
}

impl EnqueuedResolution {
    pub(crate) fn new_ok<T: Clone + 'static>(promise: crate::promise::Promise<T>, value: T) -> Self {
        Self {
            settle: Box::new(move || promise.fulfill(value)),
        }
    }

    pub(crate) fn new_err<T: Clone + 'static>(
        promise: crate::promise::Promise<T>,
        error: crate::error::LookupError,
    ) -> Self {
        Self {
            settle: Box::new(move || promise.fail(error)),
        }
    }

    /// Apply this resolution to its promise. Consumes the resolution, since
    /// an `EnqueuedResolution` is single-use, matching the data model's
    /// "drained by Driver, then discarded".
    pub fn settle(self) {
        (self.settle)()
    }
}

/// LIFO stack of resolutions awaiting application by the Driver.
///
/// LIFO ordering is safe here because each resolution's effects are
/// confined to its own promise's awaiters; ordering across different
/// bulk-function flushes is never observable to callers.
#[derive(Default)]
pub(crate) struct ResolveQueue {
    stack: Vec<EnqueuedResolution>,
}

impl ResolveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, resolution: EnqueuedResolution) {
        self.stack.push(resolution);
    }

    pub fn pop(&mut self) -> Option<EnqueuedResolution> {
        self.stack.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
