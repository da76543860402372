//! The HSM event processor: a static descriptor table of `{ handler, parent }`
//! pairs plus the init/dispatch/LCA algorithm from `original_source/qp/qep.py`,
//! transliterated case by case (see `exec_tran` below) rather than reduced to
//! a generic tree-LCA routine, because self-transition and the
//! target-is-a-deep-ancestor-of-source case behave asymmetrically in the
//! source algorithm (see DESIGN.md).
use std::collections::HashMap;

use crate::errors::{HsmError, HsmResult};
use crate::event::Event;
use crate::logger::HSMLogger;
use crate::signal::{ENTRY_SIG, EXIT_SIG, INIT_SIG};
use crate::state::{Outcome, State, StateId, TOP};

/// Matches the source's `MAX_NEST_DEPTH = 6` bound on statechart nesting.
pub const MAX_NEST_DEPTH: usize = 6;

struct StateEntry<C> {
    parent: Option<StateId>,
    handler: Box<dyn State<C> + Send + Sync>,
}

/// One hierarchical state machine instance. `C` is the caller-supplied
/// context carrying whatever application data the concrete states close
/// over (display buffers, timers, counters...).
pub struct Hsm<C> {
    name: &'static str,
    states: HashMap<StateId, StateEntry<C>>,
    initial: Box<dyn Fn(&mut C) -> StateId + Send + Sync>,
    current: StateId,
    initialized: bool,
    logger: HSMLogger,
}

pub struct HsmBuilder<C> {
    name: &'static str,
    states: HashMap<StateId, StateEntry<C>>,
    initial: Option<Box<dyn Fn(&mut C) -> StateId + Send + Sync>>,
}

impl<C> HsmBuilder<C> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            states: HashMap::new(),
            initial: None,
        }
    }

    /// Register a state. `parent` is `None` only for states whose
    /// superstate is `TOP`.
    pub fn state(
        mut self,
        id: StateId,
        parent: Option<StateId>,
        handler: impl State<C> + Send + Sync + 'static,
    ) -> Self {
        self.states.insert(
            id,
            StateEntry {
                parent,
                handler: Box::new(handler),
            },
        );
        self
    }

    /// Register the top-level initial transition: given the fresh
    /// context, return the leaf state `init()` should drill down into.
    pub fn initial(mut self, f: impl Fn(&mut C) -> StateId + Send + Sync + 'static) -> Self {
        self.initial = Some(Box::new(f));
        self
    }

    pub fn build(self) -> HsmResult<Hsm<C>> {
        let initial = self.initial.ok_or_else(HsmError::InitNeverCalled)?;
        Ok(Hsm {
            name: self.name,
            states: self.states,
            initial,
            current: TOP,
            initialized: false,
            logger: HSMLogger,
        })
    }
}

impl<C> Hsm<C> {
    pub fn current(&self) -> StateId {
        self.current
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// True if `s` is the current state or one of its ancestors, per
    /// §4.1.4's `is_in`.
    pub fn is_in(&self, s: StateId) -> bool {
        let mut t = self.current;
        loop {
            if t == s {
                return true;
            }
            match self.parent(t) {
                Some(p) => t = p,
                None => return false,
            }
        }
    }

    fn parent(&self, s: StateId) -> Option<StateId> {
        if s == TOP {
            return None;
        }
        self.states.get(&s).and_then(|e| e.parent)
    }

    /// `top` is never registered as an ordinary entry; probing it (which
    /// only happens when a state's handler bubbles all the way up via
    /// `Outcome::Super(TOP)`) always yields `Handled`, matching the
    /// source's `Hsm.top`, which accepts and swallows every event.
    fn invoke(&self, ctx: &mut C, s: StateId, event: &Event) -> HsmResult<Outcome> {
        if s == TOP {
            return Ok(Outcome::Handled);
        }
        let entry = self.states.get(&s).ok_or(HsmError::UnknownState(s))?;
        Ok(entry.handler.handle(ctx, event))
    }

    fn fire_entry(&self, ctx: &mut C, s: StateId) -> HsmResult<()> {
        self.logger.log_trace(self.name, &format!("{s} ENTRY"));
        match self.invoke(ctx, s, &Event::reserved(ENTRY_SIG))? {
            Outcome::Tran(_) | Outcome::Init(_) => Err(HsmError::IllegalOutcomeDuringProbe(s)),
            Outcome::Handled | Outcome::Super(_) => Ok(()),
        }
    }

    fn fire_exit(&self, ctx: &mut C, s: StateId) -> HsmResult<()> {
        self.logger.log_trace(self.name, &format!("{s} EXIT"));
        match self.invoke(ctx, s, &Event::reserved(EXIT_SIG))? {
            Outcome::Tran(_) | Outcome::Init(_) => Err(HsmError::IllegalOutcomeDuringProbe(s)),
            Outcome::Handled | Outcome::Super(_) => Ok(()),
        }
    }

    fn fire_init(&self, ctx: &mut C, s: StateId) -> HsmResult<Option<StateId>> {
        match self.invoke(ctx, s, &Event::reserved(INIT_SIG))? {
            Outcome::Init(child) => Ok(Some(child)),
            Outcome::Handled | Outcome::Super(_) => Ok(None),
            Outcome::Tran(_) => Err(HsmError::IllegalOutcomeDuringProbe(s)),
        }
    }

    /// Exit `s`, returning its parent. Used while walking up a chain of
    /// ancestors that all need to be exited in turn.
    fn exit_to_parent(&self, ctx: &mut C, s: StateId) -> HsmResult<StateId> {
        self.fire_exit(ctx, s)?;
        self.parent(s).ok_or(HsmError::ParentCycle(s))
    }

    fn check_depth(&self, len: usize) -> HsmResult<()> {
        if len > MAX_NEST_DEPTH {
            Err(HsmError::DepthExceeded(len, MAX_NEST_DEPTH))
        } else {
            Ok(())
        }
    }

    /// §4.1.1: take the top-level initial transition, then drill down,
    /// firing `ENTRY` top-down along the way and repeatedly probing
    /// `INIT` until a state declines to take a nested initial transition.
    pub fn init(&mut self, ctx: &mut C) -> HsmResult<()> {
        let target = (self.initial)(ctx);
        self.current = target;
        let mut s = TOP;
        loop {
            let mut path = vec![self.current];
            let mut t = self.current;
            while t != s {
                t = self.parent(t).ok_or(HsmError::ParentCycle(t))?;
                if t != s {
                    path.push(t);
                }
            }
            self.check_depth(path.len())?;
            for &st in path.iter().rev() {
                self.fire_entry(ctx, st)?;
            }
            s = self.current;
            match self.fire_init(ctx, s)? {
                Some(child) => self.current = child,
                None => break,
            }
        }
        self.initialized = true;
        Ok(())
    }

    /// §4.1.2: walk the event up the parent chain from the current state
    /// until some handler consumes it (`Handled`) or requests a transition
    /// (`Tran`); in the latter case exit from the true current leaf up to
    /// the handling state, then run the LCA-based transition sequence.
    pub fn dispatch(&mut self, ctx: &mut C, event: &Event) -> HsmResult<()> {
        if !self.initialized {
            return Err(HsmError::NotInitialized());
        }
        let original_current = self.current;
        let mut t = original_current;
        let (source, target) = loop {
            match self.invoke(ctx, t, event)? {
                Outcome::Handled => return Ok(()),
                Outcome::Super(parent) => {
                    t = parent;
                    continue;
                }
                Outcome::Tran(tgt) => break (t, tgt),
                Outcome::Init(_) => return Err(HsmError::IllegalOutcomeDuringProbe(t)),
            }
        };

        let mut cur = original_current;
        while cur != source {
            cur = self.exit_to_parent(ctx, cur)?;
        }
        self.current = source;

        self.exec_tran(ctx, source, target)
    }

    /// §4.1.3's seven-case LCA transition, transliterated from
    /// `original_source/qp/qep.py`'s `exec_tran`. `entry_path` plays the
    /// role of the source's `path[]` array, built innermost (target) first
    /// and fired in reverse (outermost first).
    fn exec_tran(&mut self, ctx: &mut C, src: StateId, tgt: StateId) -> HsmResult<()> {
        let mut entry_path: Vec<StateId> = Vec::new();
        let target_super = self.parent(tgt);
        let source_super = self.parent(src);

        if src == tgt {
            // (a) self-transition: exit and re-enter unconditionally.
            self.fire_exit(ctx, src)?;
            entry_path.push(tgt);
        } else if target_super == Some(src) {
            // (b) target is a direct child of source.
            entry_path.push(tgt);
        } else if source_super == target_super {
            // (c) source and target are siblings.
            self.fire_exit(ctx, src)?;
            entry_path.push(tgt);
        } else if source_super == Some(tgt) {
            // (d) source's parent is target: exit only, nothing to enter.
            self.fire_exit(ctx, src)?;
        } else {
            // (e)/(f)/(g): walk up from target looking for source among
            // its ancestors.
            entry_path.push(tgt);
            let mut found_lca = false;
            if let Some(ts) = target_super {
                entry_path.push(ts);
                let mut walker = self.parent(ts);
                while let Some(w) = walker {
                    if w == src {
                        // (e) source is a deeper ancestor of target.
                        found_lca = true;
                        break;
                    }
                    entry_path.push(w);
                    walker = self.parent(w);
                }
            }
            self.check_depth(entry_path.len())?;

            if !found_lca {
                self.fire_exit(ctx, src)?;

                let mut truncated = false;
                if let Some(ss) = source_super {
                    if let Some(idx) = entry_path.iter().position(|&x| x == ss) {
                        // (f) source's immediate superstate is already on
                        // target's ancestor path.
                        entry_path.truncate(idx);
                        truncated = true;
                    }
                }

                if !truncated {
                    // (g) fully general: keep exiting upward from source's
                    // superstate (source itself was already exited above)
                    // until the walk lands on one of target's collected
                    // ancestors.
                    let mut walker = source_super.ok_or(HsmError::ParentCycle(src))?;
                    loop {
                        walker = self.exit_to_parent(ctx, walker)?;
                        if let Some(idx) = entry_path.iter().position(|&x| x == walker) {
                            entry_path.truncate(idx);
                            break;
                        }
                    }
                }
            }
        }

        for &st in entry_path.iter().rev() {
            self.fire_entry(ctx, st)?;
        }
        self.current = tgt;

        // Drill in exactly like init()'s second loop, starting at target.
        let mut s = tgt;
        loop {
            match self.fire_init(ctx, s)? {
                None => break,
                Some(child) => {
                    let mut drill_path = vec![child];
                    let mut t = child;
                    while t != s {
                        t = self.parent(t).ok_or(HsmError::ParentCycle(t))?;
                        if t != s {
                            drill_path.push(t);
                        }
                    }
                    self.check_depth(drill_path.len())?;
                    for &st in drill_path.iter().rev() {
                        self.fire_entry(ctx, st)?;
                    }
                    self.current = child;
                    s = self.current;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Ctx {
        trace: String,
    }

    const A: StateId = StateId::new(1);
    const B: StateId = StateId::new(2);
    const B1: StateId = StateId::new(3);

    fn log(ctx: &mut Ctx, name: &str, sig: u32) {
        let tag = match sig {
            ENTRY_SIG => "ENTRY",
            EXIT_SIG => "EXIT",
            INIT_SIG => "INIT",
            _ => "EVT",
        };
        ctx.trace.push_str(name);
        ctx.trace.push('-');
        ctx.trace.push_str(tag);
        ctx.trace.push(';');
    }

    fn build() -> Hsm<Ctx> {
        HsmBuilder::new("test")
            .state(A, None, |ctx: &mut Ctx, e: &Event| {
                log(ctx, "a", e.sig);
                Outcome::Handled
            })
            .state(B, None, |ctx: &mut Ctx, e: &Event| {
                log(ctx, "b", e.sig);
                if e.sig == INIT_SIG {
                    return Outcome::Init(B1);
                }
                Outcome::Handled
            })
            .state(B1, Some(B), |ctx: &mut Ctx, e: &Event| {
                log(ctx, "b1", e.sig);
                Outcome::Handled
            })
            .initial(|_ctx| B)
            .build()
            .unwrap()
    }

    #[test]
    fn init_drills_through_nested_initial_transition() {
        let mut ctx = Ctx::default();
        let mut hsm = build();
        hsm.init(&mut ctx).unwrap();
        assert_eq!(hsm.current(), B1);
        assert_eq!(ctx.trace, "b-ENTRY;b-INIT;b1-ENTRY;b1-INIT;");
    }

    #[test]
    fn is_in_walks_ancestors() {
        let mut ctx = Ctx::default();
        let mut hsm = build();
        hsm.init(&mut ctx).unwrap();
        assert!(hsm.is_in(B1));
        assert!(hsm.is_in(B));
        assert!(!hsm.is_in(A));
    }

    #[test]
    fn self_transition_exits_and_reenters() {
        let mut ctx = Ctx::default();
        let mut hsm = HsmBuilder::new("self-tran")
            .state(A, None, |ctx: &mut Ctx, e: &Event| {
                log(ctx, "a", e.sig);
                if e.sig >= crate::signal::USER_SIG {
                    return Outcome::Tran(A);
                }
                Outcome::Handled
            })
            .initial(|_ctx| A)
            .build()
            .unwrap();
        hsm.init(&mut ctx).unwrap();
        ctx.trace.clear();
        hsm.dispatch(&mut ctx, &Event::new(crate::signal::USER_SIG))
            .unwrap();
        assert_eq!(ctx.trace, "a-EVT;a-EXIT;a-ENTRY;a-INIT;");
    }
}
