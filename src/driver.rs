//! The cooperative Driver: pulls a lazy sequence of lookup futures, keeps a
//! bounded window of them in flight, flushes Batch Slots to make progress,
//! and yields values in strict source order.
//!
//! Grounded on the teacher's `runtime::progress_js_with`/`wait_for_js_event`,
//! a hand-rolled poll loop around a future, handling whatever arrives
//! (a Rust callback there, a Batch Slot flush here) before resuming the
//! thing actually being waited on.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::error::LookupError;
use crate::manager::LookupManager;

/// The type every item pulled from the caller's lazy sequence must have:
/// a boxed, pinned future producing the per-task result.
pub type LookupTask<'a, T> = Pin<Box<dyn Future<Output = Result<T, LookupError>> + 'a>>;

/// Box and pin an `async` block for use as a [`LookupTask`].
pub fn task<'a, T>(fut: impl Future<Output = Result<T, LookupError>> + 'a) -> LookupTask<'a, T> {
    Box::pin(fut)
}

const DEFAULT_WINDOW: usize = 2000;

enum Slot<'a, T> {
    Pending(LookupTask<'a, T>),
    Ready(Result<T, LookupError>),
}

/// Drives `source` to completion against `manager`, yielding each task's
/// result in source order. This is the crate's only consumer-facing
/// iterator; everything else is internal bookkeeping.
pub struct Driver<'a, I, T> {
    source: I,
    manager: &'a LookupManager,
    buf: VecDeque<Slot<'a, T>>,
    window: usize,
    window_reset: bool,
    aborted: bool,
}

/// Build the Driver for `source` against `manager`. `source` yields one
/// [`LookupTask`] per logical item in the caller's stream; `batch_lookup_resolve`
/// returns an iterator of their results, in the same order.
pub fn batch_lookup_resolve<'a, I, T>(source: I, manager: &'a LookupManager) -> Driver<'a, I, T>
where
    I: Iterator<Item = LookupTask<'a, T>>,
{
    Driver {
        source,
        manager,
        buf: VecDeque::new(),
        window: DEFAULT_WINDOW,
        window_reset: false,
        aborted: false,
    }
}

/// A waker that does nothing when woken. Safe here because the Driver never
/// relies on being woken asynchronously during its fill/drain bookkeeping;
/// it always re-polls explicitly right after settling a promise. Real
/// asynchronous wakeups (e.g. a caller awaiting a timer) are handled by
/// [`Driver::block_on_front`], which polls with a real waker instead.
pub(crate) fn noop_waker() -> Waker {
    Waker::noop().clone()
}

fn poll_once<T>(fut: &mut LookupTask<'_, T>) -> Poll<Result<T, LookupError>> {
    let waker = noop_waker();
    let mut cx = Context::from_waker(&waker);
    fut.as_mut().poll(&mut cx)
}

struct WaitOn<'s, 'a, T> {
    fut: &'s mut LookupTask<'a, T>,
}

impl<'s, 'a, T> Future for WaitOn<'s, 'a, T> {
    type Output = Result<T, LookupError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().fut.as_mut().poll(cx)
    }
}

impl<'a, I, T> Driver<'a, I, T>
where
    I: Iterator<Item = LookupTask<'a, T>>,
{
    /// Step 2: pull from `source` while the Resolve Queue is empty and the
    /// window has room. Each task is polled once immediately on arrival,
    /// since Rust futures don't run any code until first polled, so this is
    /// what corresponds to a host async method running synchronously up to
    /// its first suspension point as soon as it's called.
    fn fill(&mut self) {
        while !self.aborted && self.manager.resolve_queue_is_empty() && self.buf.len() < self.window {
            match self.source.next() {
                Some(mut fut) => {
                    let entry = match poll_once(&mut fut) {
                        Poll::Ready(value) => Slot::Ready(value),
                        Poll::Pending => Slot::Pending(fut),
                    };
                    self.buf.push_back(entry);
                }
                None => break,
            }
        }
    }

    /// Re-poll every still-suspended task once. Called after settling
    /// resolutions so their continuations actually run (spec.md §4.3: the
    /// Driver is what resumes awaiters, and resuming may itself enqueue
    /// more keys or arm new flushes).
    fn pump_all(&mut self) {
        for entry in self.buf.iter_mut() {
            if let Slot::Pending(fut) = entry {
                if let Poll::Ready(value) = poll_once(fut) {
                    *entry = Slot::Ready(value);
                }
            }
        }
    }

    /// Step 3: drain the Resolve Queue, settling each resolution and then
    /// resuming continuations. Settling can itself push new resolutions
    /// (a continuation's own lookup reaching its batch size), so this loops
    /// until a full pass leaves the queue empty.
    fn drain(&mut self) {
        loop {
            let mut settled_any = false;
            while let Some(resolution) = self.manager.pop_resolution() {
                resolution.settle();
                settled_any = true;
            }
            if !settled_any {
                return;
            }
            self.pump_all();
        }
    }

    /// Step 6: every buffered task is suspended on something outside the
    /// core (no slot has pending keys to flush). Block the current thread
    /// on the head task with a real waker until it makes progress.
    fn block_on_front(&mut self) {
        let Some(front) = self.buf.front_mut() else {
            return;
        };
        if let Slot::Pending(fut) = front {
            let value = pollster::block_on(WaitOn { fut });
            *front = Slot::Ready(value);
        }
    }

    /// Reset `W` to the largest registered batch size the first time any
    /// slot has flushed, whichever path triggered it (eager enqueue-time
    /// flush or the progress step below).
    fn reset_window_after_first_flush(&mut self) {
        if self.window_reset || !self.manager.has_flushed() {
            return;
        }
        self.window_reset = true;
        let max_batch_size = self.manager.max_batch_size();
        if max_batch_size > 0 {
            self.window = max_batch_size;
        }
    }
}

impl<'a, I, T> Iterator for Driver<'a, I, T>
where
    I: Iterator<Item = LookupTask<'a, T>>,
{
    type Item = Result<T, LookupError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.aborted {
            return None;
        }

        loop {
            self.fill();
            self.reset_window_after_first_flush();
            self.drain();

            if self.buf.is_empty() {
                return None;
            }

            if matches!(self.buf.front(), Some(Slot::Ready(_))) {
                let Slot::Ready(value) = self.buf.pop_front().unwrap() else {
                    unreachable!()
                };
                if value.is_err() {
                    // Spec §4.6 step 7 / §7: abort the iteration at the
                    // first failure, in source order. No output past it.
                    self.aborted = true;
                }
                return Some(value);
            }

            if self.manager.flush_fullest() {
                self.reset_window_after_first_flush();
                continue;
            }

            // Nothing in any slot is eligible to flush, so every buffered
            // task must be suspended on something outside the core (a
            // timer, another future entirely). Block on the head.
            self.block_on_front();
        }
    }
}
