//! Heterogeneous storage for Batch Slots, keyed by bulk-function identity.
//!
//! Grounded on the teacher's `object_store::ObjectStore`: a map from handle
//! to `Box<dyn Any>`, downcast back to the concrete type on typed access.

use std::collections::HashMap;

use crate::batch_slot::AnyBatchSlot;
use crate::error::SlotId;
use crate::resolve_queue::EnqueuedResolution;

#[derive(Default)]
pub(crate) struct SlotRegistry {
    slots: HashMap<SlotId, Box<dyn AnyBatchSlot>>,
    /// Registration order, used to break ties when several slots are
    /// equally full (spec.md §4.6 step 5: "ties broken by registration order").
    order: Vec<SlotId>,
}

impl SlotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the slot registered under `slot_id`, building it with `build`
    /// on first use. If a slot already exists, `build` does not run and its
    /// parameters are silently ignored, matching the source's behavior
    /// (spec.md §9): the first registration wins.
    pub fn get_or_insert<S: AnyBatchSlot + 'static>(
        &mut self,
        slot_id: SlotId,
        build: impl FnOnce() -> S,
    ) -> &mut S {
        if !self.slots.contains_key(slot_id) {
            self.slots.insert(slot_id, Box::new(build()));
            self.order.push(slot_id);
        }
        self.slots
            .get_mut(slot_id)
            .and_then(|slot| slot.as_any_mut().downcast_mut::<S>())
            .unwrap_or_else(|| {
                panic!("slot \"{slot_id}\" was registered with a different key/value type")
            })
    }

    /// The slot with the most pending keys, or `None` if every slot is idle.
    /// Ties keep the earliest-registered slot.
    pub fn fullest(&self) -> Option<SlotId> {
        let mut best: Option<(SlotId, usize)> = None;
        for &id in &self.order {
            let count = self.slots[id].pending_count();
            if count == 0 {
                continue;
            }
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((id, count)),
            }
        }
        best.map(|(id, _)| id)
    }

    /// Whether `slot_id`'s own buffer has reached (or exceeded) its own
    /// preferred batch size. A batch size of `0` means "never eagerly
    /// flush on count alone" (mirrors `eager_batch_size: None` in the
    /// ultra-batch-style builders this crate's tests are modeled on).
    pub fn is_armed_past_batch_size(&self, slot_id: SlotId) -> bool {
        match self.slots.get(slot_id) {
            Some(slot) => slot.batch_size() > 0 && slot.pending_count() >= slot.batch_size(),
            None => false,
        }
    }

    pub fn flush(&mut self, slot_id: SlotId) -> EnqueuedResolution {
        self.slots
            .get_mut(slot_id)
            .expect("flush requested for an unregistered slot")
            .flush()
    }

    pub fn max_batch_size(&self) -> usize {
        self.slots.values().map(|slot| slot.batch_size()).max().unwrap_or(0)
    }
}
