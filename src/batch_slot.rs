//! Batch Slot: per-bulk-function buffer of queued keys plus the promise
//! every queued caller is waiting on.
//!
//! Grounded on `batch::BatchState` in the teacher crate: a buffer that
//! accumulates operations and is swapped out wholesale on flush so newly
//! arriving work starts a fresh batch.

use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use crate::error::{LookupError, SlotId};
use crate::promise::Promise;
use crate::resolve_queue::EnqueuedResolution;

/// What a bulk lookup call returns for a batch of keys.
pub type BulkResult<K, V> = HashMap<K, V>;

/// Shared handle to a batch's eventual result map.
pub type SlotPromise<K, V> = Promise<Rc<BulkResult<K, V>>>;

/// Capability surface the Lookup Manager's registry and the Driver need,
/// independent of a slot's concrete `K`/`V`. Typed access (via downcast) is
/// only needed back inside the already-typed lookup methods, per SPEC_FULL.md
/// §11 and the teacher's `ObjectStore` (`Box<dyn Any>` + typed downcast on
/// access).
pub(crate) trait AnyBatchSlot {
    fn pending_count(&self) -> usize;
    fn batch_size(&self) -> usize;
    fn flush(&mut self) -> EnqueuedResolution;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Per-bulk-function key buffer. Idle when empty, armed once `enqueue` has
/// been called. A flush captures the buffer and promise, then installs
/// fresh empties so newly enqueued keys start a new batch.
pub struct BatchSlot<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    slot_id: SlotId,
    bulk_fn: Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>>,
    batch_size: usize,
    buffer: Vec<K>,
    promise: SlotPromise<K, V>,
}

impl<K, V> BatchSlot<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(
        slot_id: SlotId,
        bulk_fn: Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>>,
        batch_size: usize,
    ) -> Self {
        Self {
            slot_id,
            bulk_fn,
            batch_size,
            buffer: Vec::new(),
            promise: Promise::new(),
        }
    }

    /// Append `key` to the buffer, preserving duplicates verbatim (no dedup,
    /// that is the bulk function's responsibility, if it wants it).
    /// Returns the promise this key (and every other key currently queued)
    /// is waiting on.
    pub fn enqueue(&mut self, key: K) -> SlotPromise<K, V> {
        self.buffer.push(key);
        self.promise.clone()
    }
}

impl<K, V> AnyBatchSlot for BatchSlot<K, V>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    fn pending_count(&self) -> usize {
        self.buffer.len()
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn flush(&mut self) -> EnqueuedResolution {
        let keys = std::mem::take(&mut self.buffer);
        let promise = std::mem::replace(&mut self.promise, Promise::new());

        #[cfg(feature = "tracing")]
        tracing::debug!(slot = self.slot_id, batch_len = keys.len(), "flushing batch slot");

        match (self.bulk_fn)(&keys) {
            Ok(map) => EnqueuedResolution::new_ok(promise, Rc::new(map)),
            Err(message) => EnqueuedResolution::new_err(
                promise,
                LookupError::BulkFunctionFailure {
                    slot: self.slot_id,
                    message,
                },
            ),
        }
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Adapt a flat-list bulk function (the Collection shape) into the
/// map-returning shape a Scalar `BatchSlot` expects, by grouping the raw
/// results with `key_selector`. This is the "thin shim" spec.md §4.2
/// describes: a Collection slot is just a Scalar slot over `Vec<V>`.
pub fn make_collection_bulk_fn<K, V>(
    raw: Rc<dyn Fn(&[K]) -> Result<Vec<V>, String>>,
    key_selector: Rc<dyn Fn(&V) -> K>,
) -> Rc<dyn Fn(&[K]) -> Result<BulkResult<K, Vec<V>>, String>>
where
    K: Eq + Hash + Clone + 'static,
    V: Clone + 'static,
{
    Rc::new(move |keys: &[K]| {
        let items = (raw)(keys)?;
        let mut grouped: HashMap<K, Vec<V>> = HashMap::new();
        for item in items {
            grouped.entry((key_selector)(&item)).or_default().push(item);
        }
        Ok(grouped)
    })
}
