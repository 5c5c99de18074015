//! Error kinds produced by the lookup scheduler.

use std::rc::Rc;

/// Stable identity for a bulk lookup function's Batch Slot.
///
/// Rust closures built per call site have no portable identity the way a
/// method handle does in the source system, so callers name their slot
/// explicitly instead (see SPEC_FULL.md §11).
pub type SlotId = &'static str;

/// Everything that can go wrong while resolving a deferred lookup.
#[derive(Debug, Clone, thiserror::Error)]
pub enum LookupError {
    /// `lookup_required` found no entry for its key in the bulk result.
    #[error("no value found for key {key} ({type_tag})")]
    KeyNotFound { key: String, type_tag: &'static str },

    /// The bulk lookup function for a slot returned an error during flush.
    /// Every caller queued on that batch observes the same failure.
    #[error("bulk lookup function for slot \"{slot}\" failed: {message}")]
    BulkFunctionFailure { slot: SlotId, message: String },

    /// An immediate scope was ended out of LIFO order.
    #[error("immediate scope ended out of order")]
    ScopeMisuse,

    /// A caller's own task logic failed downstream of an awaited lookup.
    #[error("caller task failed: {0}")]
    CallerTaskFailure(String),
}

/// Builds the error `lookup_required` raises when a key is absent from the
/// bulk result. Overridable per [`LookupManager`](crate::LookupManager);
/// the default just wraps the key and type name into [`LookupError::KeyNotFound`].
pub type NotFoundFactory = Rc<dyn Fn(String, &'static str) -> LookupError>;

pub(crate) fn default_not_found_factory() -> NotFoundFactory {
    Rc::new(|key, type_tag| LookupError::KeyNotFound { key, type_tag })
}
