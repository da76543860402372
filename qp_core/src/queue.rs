//! Bounded, blocking event queue backing each active object, grounded in
//! `original_source/qp/qf.py`'s `QEQueue` (a `Queue.Queue` subclass that
//! tracks a high-water mark) but built on `crossbeam_channel` for the
//! try-send-with-overflow-as-error semantics `std::sync::mpsc` lacks.
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, RecvError, Sender, TrySendError};

use crate::errors::QfError;
use crate::event::Event;

pub struct EventQueue {
    name: String,
    capacity: usize,
    tx: Sender<Event>,
    rx: Receiver<Event>,
    watermark: AtomicUsize,
}

impl EventQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self {
            name: name.into(),
            capacity,
            tx,
            rx,
            watermark: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Non-blocking enqueue. Mirrors `QEQueue.post_fifo`: raises on a full
    /// queue rather than blocking the poster, and records the new
    /// high-water mark for telemetry.
    pub fn post_fifo(&self, event: Event) -> Result<(), QfError> {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.bump_watermark(self.tx.len());
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                Err(QfError::QueueOverflow(self.name.clone(), self.capacity))
            }
            Err(TrySendError::Disconnected(_)) => {
                Err(QfError::QueueOverflow(self.name.clone(), self.capacity))
            }
        }
    }

    fn bump_watermark(&self, depth: usize) {
        let mut prev = self.watermark.load(Ordering::Relaxed);
        while depth > prev {
            match self.watermark.compare_exchange_weak(
                prev,
                depth,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(actual) => prev = actual,
            }
        }
    }

    /// Blocking dequeue, used by the active object's worker thread.
    /// Returns `Err` only once the sender half has been dropped, which the
    /// caller treats as a stop request (the source's `None` sentinel in
    /// `Active.run`).
    pub fn take(&self) -> Result<Event, RecvError> {
        self.rx.recv()
    }

    pub fn sender(&self) -> Sender<Event> {
        self.tx.clone()
    }

    pub(crate) fn receiver(&self) -> &Receiver<Event> {
        &self.rx
    }

    /// `qf.py`'s `get_queue_margin`: how much headroom is left below the
    /// worst depth this queue has ever reached.
    pub fn margin(&self) -> usize {
        self.capacity
            .saturating_sub(self.watermark.load(Ordering::Relaxed))
    }

    pub fn high_water_mark(&self) -> usize {
        self.watermark.load(Ordering::Relaxed)
    }

    pub fn clear_watermark(&self) {
        self.watermark.store(0, Ordering::Relaxed);
    }
}
