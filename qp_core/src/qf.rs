//! The active-object framework (QF): a priority-indexed slot table, a
//! signal -> ascending-priority subscriber map, and a tick-driven list of
//! armed `TimeEvt`s, guarded by one non-reentrant mutex.
//!
//! Grounded in `original_source/qp/qf.py`'s `QF` class, but per the Design
//! Notes, expressed as an explicit `Framework` value (constructed with
//! `Framework::new`, shared via `Arc`) rather than the source's
//! module-level classmethods operating on implicit global state.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::{QfError, QfResult};
use crate::event::Event;
use crate::hsm::Hsm;
use crate::queue::EventQueue;
use crate::signal::{Signal, TERM_SIG, USER_SIG};
use crate::time_evt::{TimeEvt, TimeEvtTarget};

pub const QF_MAX_ACTIVE: u8 = 63;
pub const TICK_MS: u64 = 10;

struct ActiveSlot {
    name: String,
    queue: Arc<EventQueue>,
}

struct Inner {
    active: Vec<Option<ActiveSlot>>,
    subscribers: HashMap<Signal, Vec<u8>>,
    time_evts: Vec<Arc<TimeEvt>>,
    tick_ctr: u64,
    running: bool,
}

/// The framework singleton value. One process normally constructs a
/// single `Arc<Framework>` and shares it with every active object, but
/// nothing here relies on global state, so tests can build as many as
/// they like in isolation.
pub struct Framework {
    inner: Mutex<Inner>,
}

impl Framework {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                active: (0..=QF_MAX_ACTIVE as usize).map(|_| None).collect(),
                subscribers: HashMap::new(),
                time_evts: Vec::new(),
                tick_ctr: 0,
                running: true,
            }),
        })
    }

    pub(crate) fn add(&self, priority: u8, name: impl Into<String>, queue: Arc<EventQueue>) -> QfResult<()> {
        if priority == 0 || priority > QF_MAX_ACTIVE {
            return Err(QfError::PriorityOutOfRange(priority, QF_MAX_ACTIVE));
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.active[priority as usize].is_some() {
            return Err(QfError::PrioritySlotTaken(priority));
        }
        inner.active[priority as usize] = Some(ActiveSlot {
            name: name.into(),
            queue,
        });
        inner.running = true;
        Ok(())
    }

    pub(crate) fn remove(&self, priority: u8) {
        let mut inner = self.inner.lock().unwrap();
        if (priority as usize) < inner.active.len() {
            inner.active[priority as usize] = None;
        }
        if inner.active.iter().all(Option::is_none) {
            inner.running = false;
        }
    }

    pub fn subscribe(&self, sig: Signal, priority: u8) {
        let mut inner = self.inner.lock().unwrap();
        let list = inner.subscribers.entry(sig).or_default();
        if let Err(idx) = list.binary_search(&priority) {
            list.insert(idx, priority);
        }
    }

    pub fn unsubscribe(&self, sig: Signal, priority: u8) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(list) = inner.subscribers.get_mut(&sig) {
            list.retain(|&p| p != priority);
        }
    }

    pub(crate) fn unsubscribe_all(&self, priority: u8, signals: &[Signal]) {
        for &sig in signals {
            self.unsubscribe(sig, priority);
        }
    }

    pub fn register_time_evt(&self, te: Arc<TimeEvt>) {
        self.inner.lock().unwrap().time_evts.push(te);
    }

    /// Multicast: the lock is taken once to snapshot the subscriber list
    /// and their queues, then released before any `post_fifo` runs. Since
    /// `post_fifo` never touches framework state, the lock is never
    /// re-entered (see DESIGN.md for why this sidesteps needing a
    /// reentrant mutex).
    pub fn publish(&self, event: Event) {
        let queues: Vec<Arc<EventQueue>> = {
            let inner = self.inner.lock().unwrap();
            inner
                .subscribers
                .get(&event.sig)
                .map(|prios| {
                    prios
                        .iter()
                        .filter_map(|p| inner.active[*p as usize].as_ref().map(|s| s.queue.clone()))
                        .collect()
                })
                .unwrap_or_default()
        };
        for q in queues {
            let _ = q.post_fifo(event.clone());
        }
    }

    /// One framework tick: every armed `TimeEvt` is decremented, and any
    /// that expire this tick are posted or published, matching
    /// `qf.py`'s `QF.tick`.
    pub fn tick(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.tick_ctr += 1;
        let evts: Vec<Arc<TimeEvt>> = inner.time_evts.clone();
        for te in evts {
            let Some(target) = te.tick() else { continue };
            let event = Event::new(te.signal());
            match target {
                TimeEvtTarget::Post(prio) => {
                    if let Some(slot) = &inner.active[prio as usize] {
                        let _ = slot.queue.post_fifo(event);
                    }
                }
                TimeEvtTarget::Publish => {
                    if let Some(prios) = inner.subscribers.get(&te.signal()) {
                        for &p in prios {
                            if let Some(slot) = &inner.active[p as usize] {
                                let _ = slot.queue.post_fifo(event.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    pub fn get_time(&self) -> u64 {
        self.inner.lock().unwrap().tick_ctr
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    pub fn stop(&self) {
        self.inner.lock().unwrap().running = false;
    }

    /// `qf.py`'s `get_queue_margin`/`get_queue_margins`, restored as
    /// non-invariant telemetry (see SPEC_FULL.md §4.5).
    pub fn queue_margins(&self) -> Vec<(String, u8, usize)> {
        let inner = self.inner.lock().unwrap();
        inner
            .active
            .iter()
            .enumerate()
            .filter_map(|(p, slot)| slot.as_ref().map(|s| (s.name.clone(), p as u8, s.queue.margin())))
            .collect()
    }

    pub fn print_queue_margins(&self) {
        for (name, prio, margin) in self.queue_margins() {
            log::info!("queue margin: {name} (prio {prio}) = {margin}");
        }
    }

    pub fn clear_queuemargins(&self) {
        let inner = self.inner.lock().unwrap();
        for slot in inner.active.iter().flatten() {
            slot.queue.clear_watermark();
        }
    }

    /// Blocking tick loop for demo/production use; tests drive `tick()`
    /// directly in a bounded loop instead so they stay deterministic.
    pub fn run(self: &Arc<Self>) {
        while self.is_running() {
            self.tick();
            std::thread::sleep(std::time::Duration::from_millis(TICK_MS));
        }
    }
}

/// One HSM, its queue, and the worker thread that runs it to completion
/// one event at a time. Grounded in `original_source/qp/qf.py`'s `Active`.
pub struct ActiveObject<C> {
    priority: u8,
    framework: Arc<Framework>,
    queue: Arc<EventQueue>,
    stop_tx: crossbeam_channel::Sender<()>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl<C: Send + 'static> ActiveObject<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn start(
        framework: &Arc<Framework>,
        name: impl Into<String>,
        priority: u8,
        queue_size: usize,
        signals: Vec<Signal>,
        mut hsm: Hsm<C>,
        mut ctx: C,
    ) -> QfResult<Self> {
        let name = name.into();
        let queue = Arc::new(EventQueue::new(name.clone(), queue_size));
        framework.add(priority, name.clone(), queue.clone())?;
        for &sig in &signals {
            framework.subscribe(sig, priority);
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let worker_queue = queue.clone();
        let worker_framework = framework.clone();
        let worker_signals = signals.clone();
        let worker_name = name.clone();

        let handle = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                if let Err(e) = hsm.init(&mut ctx) {
                    log::error!("[{worker_name}] init failed: {e}");
                    worker_framework.remove(priority);
                    return;
                }
                loop {
                    crossbeam_channel::select! {
                        recv(worker_queue.receiver()) -> msg => {
                            match msg {
                                Ok(event) => {
                                    if event.sig == TERM_SIG {
                                        break;
                                    }
                                    if let Err(e) = hsm.dispatch(&mut ctx, &event) {
                                        log::error!("[{worker_name}] dispatch failed: {e}");
                                        break;
                                    }
                                }
                                Err(_) => break,
                            }
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                worker_framework.unsubscribe_all(priority, &worker_signals);
                worker_framework.remove(priority);
            })
            .expect("failed to spawn active object worker thread");

        Ok(Self {
            priority,
            framework: framework.clone(),
            queue,
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn post_fifo(&self, event: Event) -> QfResult<()> {
        self.queue.post_fifo(event)
    }

    /// Adds this active object as a subscriber of `sig`, so a future
    /// `Framework::publish` of that signal reaches its queue. Only
    /// application signals may be subscribed at runtime; the reserved
    /// signals below `USER_SIG` are wired internally.
    pub fn subscribe(&self, sig: Signal) -> QfResult<()> {
        if sig < USER_SIG {
            return Err(QfError::ReservedSignal(sig));
        }
        self.framework.subscribe(sig, self.priority);
        Ok(())
    }

    /// Removes this active object as a subscriber of `sig`.
    pub fn unsubscribe(&self, sig: Signal) -> QfResult<()> {
        if sig < USER_SIG {
            return Err(QfError::ReservedSignal(sig));
        }
        self.framework.unsubscribe(sig, self.priority);
        Ok(())
    }

    /// Exposes this active object's queue so a late-bound reference can be
    /// handed to state handlers that were built before `start` ran (self-stop,
    /// or posting to one active object from another's handler).
    pub fn queue_handle(&self) -> Arc<EventQueue> {
        self.queue.clone()
    }

    /// Ask the worker to finish its current event and unwind. Blocks
    /// until the thread has actually joined.
    pub fn stop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

impl<C> Drop for ActiveObject<C> {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            let _ = self.stop_tx.send(());
            let _ = h.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hsm::HsmBuilder;
    use crate::signal::USER_SIG;
    use crate::state::{Outcome, StateId};

    const S: StateId = StateId::new(1);

    #[test]
    fn posted_event_reaches_active_object() {
        let framework = Framework::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_in_handler = seen.clone();
        let hsm = HsmBuilder::new("recorder")
            .state(S, None, move |_ctx: &mut (), e: &Event| {
                if e.sig >= USER_SIG {
                    seen_in_handler.lock().unwrap().push(e.sig);
                }
                Outcome::Handled
            })
            .initial(|_ctx| S)
            .build()
            .unwrap();
        let mut ao =
            ActiveObject::start(&framework, "recorder", 1, 4, vec![USER_SIG], hsm, ()).unwrap();
        ao.post_fifo(Event::new(USER_SIG)).unwrap();
        ao.stop();
        assert_eq!(*seen.lock().unwrap(), vec![USER_SIG]);
        assert!(!framework.is_running());
    }

    #[test]
    fn publish_reaches_every_subscriber_in_priority_order() {
        let framework = Framework::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut objects = Vec::new();

        for prio in [3u8, 1u8, 2u8] {
            let order = order.clone();
            let hsm = HsmBuilder::new("sub")
                .state(S, None, move |_ctx: &mut (), e: &Event| {
                    if e.sig == USER_SIG {
                        order.lock().unwrap().push(prio);
                    }
                    Outcome::Handled
                })
                .initial(|_ctx| S)
                .build()
                .unwrap();
            objects.push(
                ActiveObject::start(&framework, format!("sub{prio}"), prio, 4, vec![USER_SIG], hsm, ())
                    .unwrap(),
            );
        }

        framework.publish(Event::new(USER_SIG));
        std::thread::sleep(std::time::Duration::from_millis(50));
        for mut ao in objects {
            ao.stop();
        }

        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }
}
