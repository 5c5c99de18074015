//! batchwise - transparent batching scheduler for deferred lookups
//!
//! Call sites `.await` a single key as if looking it up alone; the
//! scheduler coalesces everything awaited during the same tick into one
//! call to the bulk function, then fans the result back out.
//!
//! # Architecture
//!
//! - [`manager`] - `LookupManager`, the façade lookups are issued through
//! - [`batch_slot`] - per-bulk-function buffer of queued keys
//! - [`promise`] - one-shot, multi-awaiter completion primitive
//! - [`resolve_queue`] - settled-but-not-yet-applied results, LIFO
//! - [`scope`] - immediate-execution scope stack
//! - [`slot_registry`] - heterogeneous Batch Slot storage
//! - [`driver`] - the cooperative loop that actually runs everything
//! - [`error`] - [`LookupError`] and slot identity

mod batch_slot;
mod driver;
mod error;
mod manager;
mod promise;
mod resolve_queue;
mod scope;
mod slot_registry;

pub use batch_slot::BulkResult;
pub use driver::{batch_lookup_resolve, task, Driver, LookupTask};
pub use error::{LookupError, SlotId};
pub use manager::LookupManager;
pub use scope::ImmediateScope;
