//! Pending Promise: a one-shot, multi-awaiter completion primitive.
//!
//! Settling a promise that already has awaiters registered wakes every one
//! of them; awaiting a promise that is already settled resolves on the very
//! first poll, with no suspension. The Driver's progress argument (see
//! `driver.rs`) depends on that second property.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::LookupError;

enum State<T> {
    Pending,
    Fulfilled(T),
    Failed(LookupError),
}

struct Inner<T> {
    state: State<T>,
    wakers: Vec<Waker>,
}

/// A settable-once, awaitable-many-times result holder.
///
/// Cloning a `Promise` shares the same cell, so every clone observes the
/// same settlement. This is how one Batch Slot flush fans a single result
/// out to every caller that queued a key against it.
pub struct Promise<T: Clone> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T: Clone> Promise<T> {
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                wakers: Vec::new(),
            })),
        }
    }

    /// Settle the promise with a value. Callers must not settle twice.
    pub fn fulfill(&self, value: T) {
        let wakers = {
            let mut inner = self.inner.borrow_mut();
            debug_assert!(
                matches!(inner.state, State::Pending),
                "promise fulfilled after it was already settled"
            );
            inner.state = State::Fulfilled(value);
            std::mem::take(&mut inner.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }

    /// Settle the promise with an error. Callers must not settle twice.
    pub fn fail(&self, error: LookupError) {
        let wakers = {
            let mut inner = self.inner.borrow_mut();
            debug_assert!(
                matches!(inner.state, State::Pending),
                "promise failed after it was already settled"
            );
            inner.state = State::Failed(error);
            std::mem::take(&mut inner.wakers)
        };
        for waker in wakers {
            waker.wake();
        }
    }
}

impl<T: Clone> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Future for Promise<T> {
    type Output = Result<T, LookupError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut inner = this.inner.borrow_mut();
        match &inner.state {
            State::Pending => {
                inner.wakers.push(cx.waker().clone());
                Poll::Pending
            }
            State::Fulfilled(value) => Poll::Ready(Ok(value.clone())),
            State::Failed(error) => Poll::Ready(Err(error.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfilled_promise_resolves_on_first_poll() {
        let promise = Promise::new();
        promise.fulfill(42);
        let waker = crate::driver::noop_waker();
        let mut cx = Context::from_waker(&waker);
        let mut fut = promise;
        match Pin::new(&mut fut).poll(&mut cx) {
            Poll::Ready(Ok(v)) => assert_eq!(v, 42),
            other => panic!("expected immediate Ready, got {other:?}"),
        }
    }

    #[test]
    fn multiple_awaiters_see_same_value() {
        let promise: Promise<i32> = Promise::new();
        let a = promise.clone();
        let b = promise.clone();
        promise.fulfill(7);
        let waker = crate::driver::noop_waker();
        let mut cx = Context::from_waker(&waker);
        assert!(matches!(
            Pin::new(&mut { a }).poll(&mut cx),
            Poll::Ready(Ok(7))
        ));
        assert!(matches!(
            Pin::new(&mut { b }).poll(&mut cx),
            Poll::Ready(Ok(7))
        ));
    }

    #[test]
    #[should_panic(expected = "already settled")]
    fn double_settle_is_rejected_in_debug() {
        let promise = Promise::new();
        promise.fulfill(1);
        promise.fulfill(2);
    }
}
