//! Dining-philosophers active-object demo, grounded in
//! `original_source/examples/qdpp/qdpp.py`'s `Table`/`Philosopher` pair:
//! forks arbitrated by priority-ordered pub/sub events, timing by `TimeEvt`.
use std::sync::{Arc, Mutex};

use qp_core::event::Event;
use qp_core::hsm::{Hsm, HsmBuilder};
use qp_core::qf::{ActiveObject, Framework};
use qp_core::queue::EventQueue;
use qp_core::signal::{Signal, ENTRY_SIG, EXIT_SIG, TERM_SIG, USER_SIG};
use qp_core::state::{Outcome, StateId};
use qp_core::time_evt::TimeEvt;

pub const HUNGRY_SIG: Signal = USER_SIG;
pub const DONE_SIG: Signal = USER_SIG + 1;
pub const EAT_SIG: Signal = USER_SIG + 2;
pub const STOP_SIG: Signal = USER_SIG + 3;
pub const TERMINATE_SIG: Signal = USER_SIG + 4;
/// Posted, never published: each philosopher's private countdown expiry.
pub const TIMEOUT_SIG: Signal = USER_SIG + 5;

pub const THINK_TICKS: u32 = 7;
pub const EAT_TICKS: u32 = 5;

const SERVING: StateId = StateId::new(1);
const THINKING: StateId = StateId::new(1);
const HUNGRY: StateId = StateId::new(2);
const EATING: StateId = StateId::new(3);
const DONE_EATING: StateId = StateId::new(4);

/// A late-bound handle: filled in once the owning `ActiveObject` exists, so
/// state handlers built before `ActiveObject::start` can still reach their
/// own queue (to self-stop) or another active object's queue (to post to it).
type QueueHandle = Arc<Mutex<Option<Arc<EventQueue>>>>;

fn phil_num(e: &Event) -> usize {
    *e.payload_ref::<usize>().expect("dining events always carry a seat number")
}

fn seat_evt(sig: Signal, n: usize) -> Event {
    Event::with_payload(sig, Arc::new(n))
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Fork {
    Free,
    UsedLeft,
    UsedRight,
}

pub struct TableCtx {
    count: usize,
    fork: Vec<Fork>,
    is_hungry: Vec<bool>,
    stopped: usize,
}

impl TableCtx {
    fn left(&self, n: usize) -> usize {
        (n + 1) % self.count
    }
    fn right(&self, n: usize) -> usize {
        (n + self.count - 1) % self.count
    }
}

pub fn build_table(
    count: usize,
    framework: Arc<Framework>,
    self_queue: QueueHandle,
) -> Hsm<TableCtx> {
    HsmBuilder::new("table")
        .state(SERVING, None, move |ctx: &mut TableCtx, e: &Event| match e.sig {
            ENTRY_SIG | EXIT_SIG => Outcome::Handled,
            s if s == HUNGRY_SIG => {
                let n = phil_num(e);
                let m = ctx.left(n);
                if ctx.fork[m] == Fork::Free && ctx.fork[n] == Fork::Free {
                    ctx.fork[m] = Fork::UsedLeft;
                    ctx.fork[n] = Fork::UsedRight;
                    framework.publish(seat_evt(EAT_SIG, n));
                } else {
                    ctx.is_hungry[n] = true;
                }
                Outcome::Handled
            }
            s if s == DONE_SIG => {
                let n = phil_num(e);
                ctx.fork[ctx.left(n)] = Fork::Free;
                ctx.fork[n] = Fork::Free;

                let right_neighbor = ctx.right(n);
                if ctx.is_hungry[right_neighbor] && ctx.fork[right_neighbor] == Fork::Free {
                    ctx.fork[n] = Fork::UsedLeft;
                    ctx.fork[right_neighbor] = Fork::UsedRight;
                    ctx.is_hungry[right_neighbor] = false;
                    framework.publish(seat_evt(EAT_SIG, right_neighbor));
                }
                let left_neighbor = ctx.left(n);
                if ctx.is_hungry[left_neighbor] && ctx.fork[ctx.left(left_neighbor)] == Fork::Free
                {
                    let seat = ctx.left(left_neighbor);
                    ctx.fork[seat] = Fork::UsedLeft;
                    ctx.fork[left_neighbor] = Fork::UsedRight;
                    ctx.is_hungry[left_neighbor] = false;
                    framework.publish(seat_evt(EAT_SIG, left_neighbor));
                }
                Outcome::Handled
            }
            s if s == STOP_SIG => {
                ctx.stopped += 1;
                if ctx.stopped == ctx.count {
                    framework.publish(Event::new(TERMINATE_SIG));
                }
                Outcome::Handled
            }
            s if s == TERMINATE_SIG => {
                if let Some(q) = self_queue.lock().unwrap().as_ref() {
                    let _ = q.post_fifo(Event::new(TERM_SIG));
                }
                Outcome::Handled
            }
            _ => Outcome::Super(qp_core::state::TOP),
        })
        .initial(move |ctx: &mut TableCtx| {
            ctx.fork = vec![Fork::Free; ctx.count];
            ctx.is_hungry = vec![false; ctx.count];
            SERVING
        })
        .build()
        .unwrap()
}

pub fn table_ctx(count: usize) -> TableCtx {
    TableCtx {
        count,
        fork: Vec::new(),
        is_hungry: Vec::new(),
        stopped: 0,
    }
}

pub struct PhilosopherCtx {
    pub num: usize,
    pub feed_ctr: u32,
    pub max_feed: u32,
}

#[allow(clippy::too_many_arguments)]
pub fn build_philosopher(
    num: usize,
    priority: u8,
    framework: Arc<Framework>,
    te: Arc<TimeEvt>,
    table_queue: QueueHandle,
    self_queue: QueueHandle,
    eating_seats: Arc<Mutex<Vec<bool>>>,
    seat_count: usize,
) -> Hsm<PhilosopherCtx> {
    let te_thinking = te.clone();
    let te_eating = te.clone();
    let framework_eating = framework.clone();
    let framework_done = framework;
    HsmBuilder::new("philosopher")
        .state(THINKING, None, move |_ctx: &mut PhilosopherCtx, e: &Event| match e.sig {
            ENTRY_SIG => {
                te_thinking.post_in(THINK_TICKS, priority).unwrap();
                Outcome::Handled
            }
            s if s == TIMEOUT_SIG => Outcome::Tran(HUNGRY),
            _ => Outcome::Super(qp_core::state::TOP),
        })
        .state(HUNGRY, None, move |ctx: &mut PhilosopherCtx, e: &Event| match e.sig {
            ENTRY_SIG => {
                if let Some(q) = table_queue.lock().unwrap().as_ref() {
                    let _ = q.post_fifo(seat_evt(HUNGRY_SIG, ctx.num));
                }
                Outcome::Handled
            }
            s if s == EAT_SIG && phil_num(e) == ctx.num => Outcome::Tran(EATING),
            _ => Outcome::Super(qp_core::state::TOP),
        })
        .state(EATING, None, move |ctx: &mut PhilosopherCtx, e: &Event| match e.sig {
            ENTRY_SIG => {
                ctx.feed_ctr += 1;
                te_eating.post_in(EAT_TICKS, priority).unwrap();
                let mut seats = eating_seats.lock().unwrap();
                let left = (ctx.num + 1) % seat_count;
                let right = (ctx.num + seat_count - 1) % seat_count;
                assert!(!seats[left] && !seats[right], "adjacent philosophers ate simultaneously");
                seats[ctx.num] = true;
                Outcome::Handled
            }
            EXIT_SIG => {
                eating_seats.lock().unwrap()[ctx.num] = false;
                framework_eating.publish(seat_evt(DONE_SIG, ctx.num));
                Outcome::Handled
            }
            s if s == TIMEOUT_SIG => {
                if ctx.feed_ctr < ctx.max_feed {
                    Outcome::Tran(THINKING)
                } else {
                    Outcome::Tran(DONE_EATING)
                }
            }
            _ => Outcome::Super(qp_core::state::TOP),
        })
        .state(DONE_EATING, None, move |ctx: &mut PhilosopherCtx, e: &Event| match e.sig {
            ENTRY_SIG => {
                framework_done.publish(seat_evt(STOP_SIG, ctx.num));
                if let Some(q) = self_queue.lock().unwrap().as_ref() {
                    let _ = q.post_fifo(Event::new(TERM_SIG));
                }
                Outcome::Handled
            }
            _ => Outcome::Super(qp_core::state::TOP),
        })
        .initial(move |_ctx: &mut PhilosopherCtx| THINKING)
        .build()
        .unwrap()
}

/// Starts one table and `count` philosophers, wires up the late-bound queue
/// handles, and returns the running active objects plus the shared
/// eating-seat invariant tracker (for tests) and feed counters.
pub fn spawn_table(
    framework: &Arc<Framework>,
    count: usize,
    max_feed: u32,
) -> (ActiveObject<TableCtx>, Vec<ActiveObject<PhilosopherCtx>>, Arc<Mutex<Vec<bool>>>) {
    let table_self_queue: QueueHandle = Arc::new(Mutex::new(None));
    let table_priority = (count + 1) as u8;
    let table_hsm = build_table(count, framework.clone(), table_self_queue.clone());
    let table = ActiveObject::start(
        framework,
        "table",
        table_priority,
        count * 2 + 4,
        vec![HUNGRY_SIG, DONE_SIG, STOP_SIG, TERMINATE_SIG],
        table_hsm,
        table_ctx(count),
    )
    .unwrap();
    *table_self_queue.lock().unwrap() = Some(table.queue_handle());

    let eating_seats = Arc::new(Mutex::new(vec![false; count]));
    let mut philosophers = Vec::with_capacity(count);
    for num in 0..count {
        let priority = (num + 1) as u8;
        let phil_self_queue: QueueHandle = Arc::new(Mutex::new(None));
        let te = TimeEvt::new(TIMEOUT_SIG);
        framework.register_time_evt(te.clone());
        let hsm = build_philosopher(
            num,
            priority,
            framework.clone(),
            te,
            table_self_queue.clone(),
            phil_self_queue.clone(),
            eating_seats.clone(),
            count,
        );
        let ctx = PhilosopherCtx {
            num,
            feed_ctr: 0,
            max_feed,
        };
        let ao = ActiveObject::start(framework, format!("phil{num}"), priority, 4, vec![EAT_SIG], hsm, ctx)
            .unwrap();
        *phil_self_queue.lock().unwrap() = Some(ao.queue_handle());
        philosophers.push(ao);
    }
    (table, philosophers, eating_seats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_philosophers_all_reach_max_feed_without_adjacent_eating() {
        let framework = Framework::new();
        let count = 5;
        let max_feed = 3;
        let (mut table, mut philosophers, _eating) = spawn_table(&framework, count, max_feed);

        let mut ticks = 0;
        while framework.is_running() && ticks < 20_000 {
            framework.tick();
            std::thread::sleep(std::time::Duration::from_micros(200));
            ticks += 1;
        }

        assert!(!framework.is_running(), "table never reached all-stopped state");
        table.stop();
        for p in &mut philosophers {
            p.stop();
        }
    }
}
