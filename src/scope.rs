//! Immediate-Scope stack: while any scope is open, every lookup executes
//! synchronously instead of buffering.
//!
//! Grounded on the teacher's `push_borrow_frame`/`pop_borrow_frame` pair in
//! `batch.rs`, a LIFO of saved frames around nested operations, checked on
//! the way back out.

use std::cell::RefCell;
use std::rc::Rc;

use crate::error::LookupError;

#[derive(Default)]
pub(crate) struct ScopeStack {
    open: RefCell<Vec<u64>>,
    next_id: RefCell<u64>,
}

impl ScopeStack {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn is_empty(&self) -> bool {
        self.open.borrow().is_empty()
    }

    fn push(&self) -> u64 {
        let id = {
            let mut next = self.next_id.borrow_mut();
            let id = *next;
            *next += 1;
            id
        };
        self.open.borrow_mut().push(id);
        id
    }

    fn close(&self, id: u64) -> Result<(), LookupError> {
        let mut open = self.open.borrow_mut();
        if open.last().copied() == Some(id) {
            open.pop();
            Ok(())
        } else {
            Err(LookupError::ScopeMisuse)
        }
    }
}

/// A scoped resource returned by [`LookupManager::begin_immediate_scope`].
///
/// Dropping it without calling [`end`](ImmediateScope::end) releases it on
/// a best-effort basis (the host's scoped-acquisition facility guarantees
/// release on every exit path); call `end()` explicitly to observe
/// [`LookupError::ScopeMisuse`] if scopes were closed out of LIFO order.
pub struct ImmediateScope {
    id: u64,
    stack: Rc<ScopeStack>,
    closed: bool,
}

impl ImmediateScope {
    pub(crate) fn begin(stack: Rc<ScopeStack>) -> Self {
        let id = stack.push();
        Self {
            id,
            stack,
            closed: false,
        }
    }

    /// End this scope. Must be the top of the Immediate-Scope stack;
    /// otherwise fails with [`LookupError::ScopeMisuse`] and leaves the
    /// stack untouched.
    pub fn end(mut self) -> Result<(), LookupError> {
        self.close()
    }

    fn close(&mut self) -> Result<(), LookupError> {
        if self.closed {
            return Ok(());
        }
        self.stack.close(self.id)?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for ImmediateScope {
    fn drop(&mut self) {
        // Best-effort LIFO release on unwind/forgotten `end()` calls; a
        // caller that wants to observe ScopeMisuse must call `end()`.
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes_must_close_in_order() {
        let stack = ScopeStack::new();
        assert!(stack.is_empty());
        let outer = ImmediateScope::begin(Rc::clone(&stack));
        let inner = ImmediateScope::begin(Rc::clone(&stack));
        assert!(!stack.is_empty());

        let err = outer.end().unwrap_err();
        assert!(matches!(err, LookupError::ScopeMisuse));

        inner.end().unwrap();
        assert!(stack.is_empty());
    }
}
