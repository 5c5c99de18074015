//! Lookup Manager: the façade callers use. Registers Batch Slots keyed by
//! bulk-function identity, exposes the four lookup variants, enqueues keys,
//! and triggers flushes.

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::hash::Hash;
use std::rc::Rc;

use crate::batch_slot::{make_collection_bulk_fn, BatchSlot, BulkResult};
use crate::error::{default_not_found_factory, LookupError, NotFoundFactory, SlotId};
use crate::resolve_queue::{EnqueuedResolution, ResolveQueue};
use crate::scope::{ImmediateScope, ScopeStack};
use crate::slot_registry::SlotRegistry;

/// One per logical batching session. Owns every Batch Slot, the Resolve
/// Queue, and the Immediate-Scope stack; outlives all lookups issued
/// through it.
pub struct LookupManager {
    slots: RefCell<SlotRegistry>,
    resolve_queue: RefCell<ResolveQueue>,
    scope_stack: Rc<ScopeStack>,
    not_found_factory: NotFoundFactory,
    /// Set the first time any slot flushes, whether triggered eagerly by an
    /// enqueue reaching its own batch size or by the Driver's progress step.
    flushed: Cell<bool>,
}

impl LookupManager {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(SlotRegistry::new()),
            resolve_queue: RefCell::new(ResolveQueue::new()),
            scope_stack: ScopeStack::new(),
            not_found_factory: default_not_found_factory(),
            flushed: Cell::new(false),
        }
    }

    /// Override how `lookup_required` builds its `KeyNotFound` error.
    /// Corresponds to spec.md's overridable `create_not_found_error` hook.
    pub fn with_not_found_factory(
        mut self,
        factory: impl Fn(String, &'static str) -> LookupError + 'static,
    ) -> Self {
        self.not_found_factory = Rc::new(factory);
        self
    }

    /// Open a nested immediate-execution scope. While any scope is open,
    /// every lookup bypasses buffering and calls its bulk function inline.
    pub fn begin_immediate_scope(&self) -> ImmediateScope {
        #[cfg(feature = "tracing")]
        tracing::trace!("entering immediate scope");
        ImmediateScope::begin(Rc::clone(&self.scope_stack))
    }

    pub fn immediate_mode(&self) -> bool {
        !self.scope_stack.is_empty()
    }

    /// Look up a single key; fails with `KeyNotFound` (or the overridden
    /// factory's error) if the bulk result has no entry for it.
    pub async fn lookup_required<K, V>(
        &self,
        key: K,
        slot_id: SlotId,
        bulk_fn: impl Fn(&[K]) -> Result<BulkResult<K, V>, String> + 'static,
        batch_size: usize,
    ) -> Result<V, LookupError>
    where
        K: Eq + Hash + Clone + Debug + 'static,
        V: Clone + 'static,
    {
        let bulk_fn: Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>> = Rc::new(bulk_fn);
        let not_found = || {
            (self.not_found_factory)(format!("{key:?}"), std::any::type_name::<V>())
        };

        if self.immediate_mode() {
            self.register_slot(slot_id, Rc::clone(&bulk_fn), batch_size);
            let map = Self::call_bulk(slot_id, &bulk_fn, std::slice::from_ref(&key))?;
            return map.get(&key).cloned().ok_or_else(not_found);
        }

        let promise = self.enqueue_scalar(slot_id, bulk_fn, batch_size, key.clone());
        let map = promise.await?;
        map.get(&key).cloned().ok_or_else(not_found)
    }

    /// Look up a single key, returning the value type's default instead of
    /// failing when the bulk result has no entry for it.
    pub async fn lookup_optional<K, V>(
        &self,
        key: K,
        slot_id: SlotId,
        bulk_fn: impl Fn(&[K]) -> Result<BulkResult<K, V>, String> + 'static,
        batch_size: usize,
    ) -> Result<V, LookupError>
    where
        K: Eq + Hash + Clone + 'static,
        V: Clone + Default + 'static,
    {
        let bulk_fn: Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>> = Rc::new(bulk_fn);

        if self.immediate_mode() {
            self.register_slot(slot_id, Rc::clone(&bulk_fn), batch_size);
            let map = Self::call_bulk(slot_id, &bulk_fn, std::slice::from_ref(&key))?;
            return Ok(map.get(&key).cloned().unwrap_or_default());
        }

        let promise = self.enqueue_scalar(slot_id, bulk_fn, batch_size, key.clone());
        let map = promise.await?;
        Ok(map.get(&key).cloned().unwrap_or_default())
    }

    /// Look up every key in `keys` (duplicates preserved, no dedup). Keys
    /// absent from the bulk result are silently skipped.
    pub async fn lookup_multi<K, V>(
        &self,
        keys: Vec<K>,
        slot_id: SlotId,
        bulk_fn: impl Fn(&[K]) -> Result<BulkResult<K, V>, String> + 'static,
        batch_size: usize,
    ) -> Result<Vec<V>, LookupError>
    where
        K: Eq + Hash + Clone + 'static,
        V: Clone + 'static,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let bulk_fn: Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>> = Rc::new(bulk_fn);

        if self.immediate_mode() {
            self.register_slot(slot_id, Rc::clone(&bulk_fn), batch_size);
            let map = Self::call_bulk(slot_id, &bulk_fn, &keys)?;
            return Ok(keys.iter().filter_map(|k| map.get(k).cloned()).collect());
        }

        let promise = self.enqueue_many_scalar(slot_id, bulk_fn, batch_size, &keys);
        let map = promise.await?;
        Ok(keys.iter().filter_map(|k| map.get(k).cloned()).collect())
    }

    /// Look up every key in `keys` against a bulk function that returns a
    /// flat list; results are grouped by `key_selector` and flattened back
    /// out in requested-key order.
    pub async fn lookup_collection<K, V>(
        &self,
        keys: Vec<K>,
        slot_id: SlotId,
        bulk_fn: impl Fn(&[K]) -> Result<Vec<V>, String> + 'static,
        key_selector: impl Fn(&V) -> K + 'static,
        batch_size: usize,
    ) -> Result<Vec<V>, LookupError>
    where
        K: Eq + Hash + Clone + 'static,
        V: Clone + 'static,
    {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let raw_fn: Rc<dyn Fn(&[K]) -> Result<Vec<V>, String>> = Rc::new(bulk_fn);
        let key_selector: Rc<dyn Fn(&V) -> K> = Rc::new(key_selector);
        let grouped_fn = make_collection_bulk_fn(raw_fn, key_selector);

        if self.immediate_mode() {
            self.register_slot(slot_id, Rc::clone(&grouped_fn), batch_size);
            let map = Self::call_bulk(slot_id, &grouped_fn, &keys)?;
            return Ok(keys
                .iter()
                .flat_map(|k| map.get(k).cloned().unwrap_or_default())
                .collect());
        }

        let promise = self.enqueue_many_scalar(slot_id, grouped_fn, batch_size, &keys);
        let map = promise.await?;
        Ok(keys
            .iter()
            .flat_map(|k| map.get(k).cloned().unwrap_or_default())
            .collect())
    }

    fn call_bulk<K, V>(
        slot_id: SlotId,
        bulk_fn: &Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>>,
        keys: &[K],
    ) -> Result<BulkResult<K, V>, LookupError> {
        (bulk_fn)(keys).map_err(|message| LookupError::BulkFunctionFailure {
            slot: slot_id,
            message,
        })
    }

    fn register_slot<K, V>(
        &self,
        slot_id: SlotId,
        bulk_fn: Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>>,
        batch_size: usize,
    ) where
        K: Eq + Hash + Clone + 'static,
        V: Clone + 'static,
    {
        self.slots
            .borrow_mut()
            .get_or_insert(slot_id, || BatchSlot::new(slot_id, bulk_fn, batch_size));
    }

    fn enqueue_scalar<K, V>(
        &self,
        slot_id: SlotId,
        bulk_fn: Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>>,
        batch_size: usize,
        key: K,
    ) -> crate::batch_slot::SlotPromise<K, V>
    where
        K: Eq + Hash + Clone + 'static,
        V: Clone + 'static,
    {
        let mut registry = self.slots.borrow_mut();
        let slot = registry.get_or_insert(slot_id, || BatchSlot::new(slot_id, bulk_fn, batch_size));
        let promise = slot.enqueue(key);
        self.maybe_flush(&mut registry, slot_id);
        promise
    }

    fn enqueue_many_scalar<K, V>(
        &self,
        slot_id: SlotId,
        bulk_fn: Rc<dyn Fn(&[K]) -> Result<BulkResult<K, V>, String>>,
        batch_size: usize,
        keys: &[K],
    ) -> crate::batch_slot::SlotPromise<K, V>
    where
        K: Eq + Hash + Clone + 'static,
        V: Clone + 'static,
    {
        let mut registry = self.slots.borrow_mut();
        let slot = registry.get_or_insert(slot_id, || BatchSlot::new(slot_id, bulk_fn, batch_size));
        let mut promise = None;
        for key in keys {
            promise = Some(slot.enqueue(key.clone()));
        }
        self.maybe_flush(&mut registry, slot_id);
        promise.expect("enqueue_many_scalar called with no keys")
    }

    /// If `slot_id`'s own buffer has reached its own preferred batch size,
    /// flush it immediately and queue the resolution. This is the
    /// eager-flush trigger from spec.md §4.5 (distinct from the Driver's
    /// progress decision, which instead picks whichever slot is fullest).
    fn maybe_flush(&self, registry: &mut SlotRegistry, slot_id: SlotId) {
        if registry.is_armed_past_batch_size(slot_id) {
            let resolution = registry.flush(slot_id);
            self.resolve_queue.borrow_mut().push(resolution);
            self.flushed.set(true);
        }
    }

    pub(crate) fn pop_resolution(&self) -> Option<EnqueuedResolution> {
        self.resolve_queue.borrow_mut().pop()
    }

    pub(crate) fn resolve_queue_is_empty(&self) -> bool {
        self.resolve_queue.borrow().is_empty()
    }

    pub(crate) fn max_batch_size(&self) -> usize {
        self.slots.borrow().max_batch_size()
    }

    /// Whether any slot has flushed yet, by either path: this manager's own
    /// eager `maybe_flush` or the Driver's `flush_fullest`.
    pub(crate) fn has_flushed(&self) -> bool {
        self.flushed.get()
    }

    pub(crate) fn flush_fullest(&self) -> bool {
        let slot_id = self.slots.borrow().fullest();
        match slot_id {
            Some(id) => {
                let resolution = self.slots.borrow_mut().flush(id);
                self.resolve_queue.borrow_mut().push(resolution);
                self.flushed.set(true);
                true
            }
            None => false,
        }
    }
}

impl Default for LookupManager {
    fn default() -> Self {
        Self::new()
    }
}
