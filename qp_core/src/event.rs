//! Events carried between states, queues and the framework.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::signal::Signal;

/// A signal plus an optional type-erased payload.
///
/// The original source attached ad hoc attributes to a base `Event` class
/// (`phil_num`, `key`, ...); Rust has no open class extension, so concrete
/// demos define their own payload types and downcast through `payload_ref`.
/// The payload is held behind an `Arc` rather than a `Box` so a published
/// event can be handed to every subscriber as the same shared reference,
/// matching `qf.py`'s `publish`, where every subscriber's queue holds the
/// identical event object.
#[derive(Clone)]
pub struct Event {
    pub sig: Signal,
    pub payload: Option<Arc<dyn Any + Send + Sync>>,
}

impl Event {
    pub fn new(sig: Signal) -> Self {
        Self { sig, payload: None }
    }

    pub fn with_payload(sig: Signal, payload: Arc<dyn Any + Send + Sync>) -> Self {
        Self {
            sig,
            payload: Some(payload),
        }
    }

    /// Construct one of the reserved `ENTRY`/`EXIT`/`INIT`/`EMPTY` probes.
    pub(crate) fn reserved(sig: Signal) -> Self {
        Self::new(sig)
    }

    pub fn payload_ref<T: 'static>(&self) -> Option<&T> {
        self.payload.as_deref().and_then(|p| p.downcast_ref::<T>())
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("sig", &self.sig)
            .field("has_payload", &self.payload.is_some())
            .finish()
    }
}
