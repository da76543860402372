use thiserror::Error;

use crate::state::StateId;

pub type HsmResult<T> = std::result::Result<T, HsmError>;
pub type QfResult<T> = std::result::Result<T, QfError>;

/// Programmer-contract violations raised by the HSM engine itself. These
/// are all conditions a builder / state-author caused, not conditions an
/// end user's runtime input can trigger; spec.md §7 calls them "halt the
/// offending thread immediately, loud" cases.
#[derive(Error, Debug)]
pub enum HsmError {
    #[error("state {0} referenced as a parent or transition target but never registered with the builder")]
    UnknownState(StateId),
    #[error("no initial-transition handler was registered before build()")]
    InitNeverCalled(),
    #[error("dispatch() called before init() drilled to a leaf state")]
    NotInitialized(),
    #[error("entry/exit path depth {0} exceeds MAX_NEST_DEPTH ({1})")]
    DepthExceeded(usize, usize),
    #[error("state {0} returned Tran/Init from a reserved ENTRY/EXIT/EMPTY probe; only Handled or Super are legal there")]
    IllegalOutcomeDuringProbe(StateId),
    #[error("state {0}'s parent chain never reaches top")]
    ParentCycle(StateId),
}

/// Runtime-facing errors from the active-object / framework layer.
/// Mirrors the teacher's one-enum-per-concern split: `HsmError` covers the
/// engine, `QfError` covers everything built on top of it.
#[derive(Error, Debug)]
pub enum QfError {
    #[error("event queue for active object '{0}' is full (capacity {1}); event dropped")]
    QueueOverflow(String, usize),
    #[error("priority {0} is out of range 1..={1}")]
    PriorityOutOfRange(u8, u8),
    #[error("priority {0} is already occupied by another active object")]
    PrioritySlotTaken(u8),
    #[error("post_in/post_every called with ticks == 0")]
    ZeroTicks(),
    #[error("TimeEvt armed with reserved signal {0} (< USER_SIG)")]
    ReservedSignal(u32),
}
