//! A state is a handler capability plus a slot in the per-HSM parent table.
use std::fmt;

use crate::event::Event;

/// An inexpensive token identifying a state within one HSM's descriptor
/// table. Equality is by value, generalized from the teacher's own
/// `StateId` (a `u16`-wrapping struct private to `state.rs`) into a public,
/// `Copy` index type that consumers build their own named constants from.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct StateId(pub u16);

impl StateId {
    pub const fn new(id: u16) -> Self {
        StateId(id)
    }
}

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The distinguished root of every HSM. Never placed in the descriptor
/// table as an ordinary entry; `Hsm::parent` treats it as having no
/// further superstate.
pub const TOP: StateId = StateId(0);

/// What a state handler did with the event it was offered.
///
/// Replaces the source's `tran_` side-channel flag (see
/// `original_source/qp/qep.py`'s `Fsm.tran_`) with a typed return, per the
/// Design Notes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The event was consumed here; dispatch stops.
    Handled,
    /// Not handled at this level; bubble to the named superstate.
    Super(StateId),
    /// Consume the event by transitioning to the named state.
    Tran(StateId),
    /// Only valid as the answer to an `INIT` probe: take a nested initial
    /// transition to the named child before settling.
    Init(StateId),
}

/// A state's event handler. Implemented automatically for any closure of
/// the right shape, so demos write states as plain `Fn` values instead of
/// implementing a trait per state.
pub trait State<C> {
    fn handle(&self, ctx: &mut C, event: &Event) -> Outcome;
}

impl<C, F> State<C> for F
where
    F: Fn(&mut C, &Event) -> Outcome,
{
    fn handle(&self, ctx: &mut C, event: &Event) -> Outcome {
        self(ctx, event)
    }
}
