//! One-shot or periodic timer events armed against the framework's tick
//! counter. Grounded in `original_source/qp/qf.py`'s `TimeEvt` class.
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use crate::errors::QfError;
use crate::signal::{Signal, USER_SIG};

/// Either posted directly to one active object or published to every
/// subscriber of its signal, matching `TimeEvt.post_in`/`publish_in`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimeEvtTarget {
    Post(u8),
    Publish,
}

/// A single armed (or disarmed) timer. Cheap to clone: the counters live
/// behind atomics so the framework's tick loop and whoever calls
/// `disarm`/`rearm` can share one `TimeEvt` via `Arc`. `target` is kept
/// even while disarmed, matching `qf.py`'s `TimeEvt` which only drops
/// itself from `QF._time_evt_list` on disarm but never forgets `_act`/
/// `_interval`, so `rearm` can reactivate it with the last configuration.
pub struct TimeEvt {
    pub sig: Signal,
    ctr: AtomicU32,
    interval: AtomicU32,
    armed: AtomicBool,
    target: std::sync::Mutex<Option<TimeEvtTarget>>,
}

impl TimeEvt {
    pub fn new(sig: Signal) -> Arc<Self> {
        Arc::new(Self {
            sig,
            ctr: AtomicU32::new(0),
            interval: AtomicU32::new(0),
            armed: AtomicBool::new(false),
            target: std::sync::Mutex::new(None),
        })
    }

    fn arm(&self, ticks: u32, interval: u32, target: TimeEvtTarget) -> Result<(), QfError> {
        if ticks == 0 {
            return Err(QfError::ZeroTicks());
        }
        if self.sig < USER_SIG {
            return Err(QfError::ReservedSignal(self.sig));
        }
        self.ctr.store(ticks, Ordering::SeqCst);
        self.interval.store(interval, Ordering::SeqCst);
        *self.target.lock().unwrap() = Some(target);
        self.armed.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn post_in(&self, ticks: u32, prio: u8) -> Result<(), QfError> {
        self.arm(ticks, 0, TimeEvtTarget::Post(prio))
    }

    pub fn post_every(&self, ticks: u32, prio: u8) -> Result<(), QfError> {
        self.arm(ticks, ticks, TimeEvtTarget::Post(prio))
    }

    pub fn publish_in(&self, ticks: u32) -> Result<(), QfError> {
        self.arm(ticks, 0, TimeEvtTarget::Publish)
    }

    pub fn publish_every(&self, ticks: u32) -> Result<(), QfError> {
        self.arm(ticks, ticks, TimeEvtTarget::Publish)
    }

    /// Stops the countdown if armed. The target/interval configuration is
    /// kept around so `rearm` can bring it back. Returns whether the timer
    /// was armed beforehand.
    pub fn disarm(&self) -> bool {
        let was_armed = self.armed.swap(false, Ordering::SeqCst);
        self.ctr.store(0, Ordering::SeqCst);
        was_armed
    }

    /// Reloads the countdown, reusing whatever target `post_in`/`post_every`/
    /// `publish_in`/`publish_every` last configured. Returns whether the
    /// timer was already armed beforehand.
    pub fn rearm(&self, ticks: u32) -> Result<bool, QfError> {
        if ticks == 0 {
            return Err(QfError::ZeroTicks());
        }
        let was_armed = self.armed.swap(true, Ordering::SeqCst);
        self.ctr.store(ticks, Ordering::SeqCst);
        Ok(was_armed)
    }

    pub fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    pub(crate) fn target(&self) -> Option<TimeEvtTarget> {
        if !self.armed.load(Ordering::SeqCst) {
            return None;
        }
        *self.target.lock().unwrap()
    }

    /// Called once per framework tick. Returns `Some(target)` exactly when
    /// the countdown reaches zero this tick; periodic timers reload their
    /// interval, one-shot timers disarm themselves, matching `qf.py`'s
    /// `QF.tick`.
    pub(crate) fn tick(&self) -> Option<TimeEvtTarget> {
        let target = self.target();
        let target = target?;
        let prev = self.ctr.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
            if c == 0 {
                None
            } else {
                Some(c - 1)
            }
        });
        match prev {
            Ok(1) => {
                let interval = self.interval.load(Ordering::SeqCst);
                if interval > 0 {
                    self.ctr.store(interval, Ordering::SeqCst);
                } else {
                    self.armed.store(false, Ordering::SeqCst);
                }
                Some(target)
            }
            _ => None,
        }
    }

    pub(crate) fn signal(&self) -> Signal {
        self.sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once_then_disarms() {
        let te = TimeEvt::new(USER_SIG);
        te.post_in(2, 1).unwrap();
        assert!(te.tick().is_none());
        assert!(te.tick().is_some());
        assert!(!te.is_armed());
        assert!(te.tick().is_none());
    }

    #[test]
    fn periodic_reloads() {
        let te = TimeEvt::new(USER_SIG);
        te.post_every(2, 1).unwrap();
        assert!(te.tick().is_none());
        assert!(te.tick().is_some());
        assert!(te.is_armed());
        assert!(te.tick().is_none());
        assert!(te.tick().is_some());
    }

    #[test]
    fn zero_ticks_rejected() {
        let te = TimeEvt::new(USER_SIG);
        assert!(matches!(te.post_in(0, 1), Err(QfError::ZeroTicks())));
    }

    #[test]
    fn reserved_signal_rejected() {
        let te = TimeEvt::new(1);
        assert!(matches!(te.post_in(1, 1), Err(QfError::ReservedSignal(1))));
    }

    #[test]
    fn disarm_reports_prior_armed_state() {
        let te = TimeEvt::new(USER_SIG);
        te.post_in(5, 1).unwrap();
        assert!(te.disarm());
        assert!(!te.is_armed());
        assert!(!te.disarm());
    }

    #[test]
    fn disarm_after_one_shot_fires_returns_false() {
        let te = TimeEvt::new(USER_SIG);
        te.post_in(1, 1).unwrap();
        assert!(te.tick().is_some());
        assert!(!te.is_armed());
        assert!(!te.disarm());
    }

    #[test]
    fn rearm_reuses_last_target_and_reports_prior_state() {
        let te = TimeEvt::new(USER_SIG);
        te.post_in(1, 3).unwrap();
        assert!(te.tick().is_some());
        assert!(!te.is_armed());
        assert!(!te.rearm(4).unwrap());
        assert!(te.is_armed());
        assert_eq!(te.target(), Some(TimeEvtTarget::Post(3)));
        assert!(te.rearm(2).unwrap());
    }
}
