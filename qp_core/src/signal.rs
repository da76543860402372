//! Reserved signal values shared by every HSM instance.

/// Signals are plain integers, wide enough that application signals never
/// collide with the reserved range below `USER_SIG`.
pub type Signal = u32;

/// Never delivered to a handler directly; used internally to probe a
/// state's superstate pointer.
pub const EMPTY_SIG: Signal = 0;
pub const ENTRY_SIG: Signal = 1;
pub const EXIT_SIG: Signal = 2;
pub const INIT_SIG: Signal = 3;
/// Sent to an active object's top state just before its worker thread
/// unwinds; handling it is optional.
pub const TERM_SIG: Signal = 4;
/// First signal value applications may use for their own events.
pub const USER_SIG: Signal = 5;
