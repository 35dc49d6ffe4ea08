//! 🚦 DeliveryQueue: the bouncer between the pump and whoever is consuming.
//!
//! 🎬 *[a queue fills. a consumer naps. the pump waits politely at the door.]*
//!
//! A credit-limited, ordered, single-owner buffer. Items go in with [`DeliveryQueue::write`],
//! come out one at a time through the registered item handler, and only when the
//! consumer has granted credit (`resume` = unlimited, `fetch(n)` = n more, `pause` = none).
//!
//! 🧠 Knowledge graph:
//! - `write` returns `false` once the backlog reaches `capacity`. That is the producer's cue to stop.
//! - The drain handler fires once per transition from "full" back to "accepting". Not per item.
//! - No interior locking: the owner holds `&mut` and every call happens on the owner's task.
//!   Handlers are plain `FnMut` boxes and can't re-enter the queue, the borrow checker sees to that.
//! - Delivery order == enqueue order. No reordering, no duplicates, no drama. 🦆

use std::collections::VecDeque;

use crate::error::StreamError;

/// 📬 Receives each delivered item.
pub type ItemHandler<T> = Box<dyn FnMut(T) + Send>;
/// 🚰 Told when the queue starts accepting writes again.
pub type DrainHandler = Box<dyn FnMut() + Send>;

// -- ♾️ "flowing" mode. credits so plentiful we stopped counting.
const UNLIMITED: u64 = u64::MAX;

pub struct DeliveryQueue<T> {
    pending: VecDeque<T>,
    capacity: usize,
    demand: u64,
    overflow: bool,
    handler: Option<ItemHandler<T>>,
    drain_handler: Option<DrainHandler>,
}

impl<T> std::fmt::Debug for DeliveryQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 handlers are closures and closures don't Debug. we show the numbers instead.
        f.debug_struct("DeliveryQueue")
            .field("pending", &self.pending.len())
            .field("capacity", &self.capacity)
            .field("demand", &self.demand)
            .field("overflow", &self.overflow)
            .finish()
    }
}

impl<T> DeliveryQueue<T> {
    /// 🏗️ New queue in flowing mode. `capacity` must be at least 1.
    pub fn new(capacity: usize) -> Result<Self, StreamError> {
        if capacity == 0 {
            return Err(StreamError::configuration(
                "queue_capacity must be at least 1, a zero-sized queue never accepts anything",
            ));
        }
        Ok(Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            demand: UNLIMITED,
            overflow: false,
            handler: None,
            drain_handler: None,
        })
    }

    pub fn handler(&mut self, handler: ItemHandler<T>) {
        self.handler = Some(handler);
    }

    pub fn drain_handler(&mut self, handler: DrainHandler) {
        self.drain_handler = Some(handler);
    }

    /// 📥 Enqueue one item. Delivered on the spot when there is credit and no backlog.
    ///
    /// Returns whether the queue still accepts writes after this one.
    pub fn write(&mut self, item: T) -> bool {
        if self.demand > 0 && self.pending.is_empty() {
            self.take_credit();
            self.deliver(item);
            return self.check_writable();
        }
        self.pending.push_back(item);
        self.check_writable()
    }

    /// ⏸️ Zero credit. Items keep piling up to `capacity`.
    pub fn pause(&mut self) {
        self.demand = 0;
    }

    /// ▶️ Unlimited credit, and flush whatever was waiting.
    pub fn resume(&mut self) {
        self.demand = UNLIMITED;
        self.emit_pending();
    }

    /// 🎟️ Grant `amount` more deliveries, paused or not.
    pub fn fetch(&mut self, amount: u64) {
        self.demand = self.demand.saturating_add(amount);
        self.emit_pending();
    }

    /// 🗑️ Drop everything not yet delivered. No drain notification: nobody is waiting on one.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.overflow = false;
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn is_paused(&self) -> bool {
        self.demand == 0
    }

    pub fn is_writable(&self) -> bool {
        self.pending.len() < self.capacity
    }

    fn take_credit(&mut self) {
        if self.demand != UNLIMITED {
            self.demand -= 1;
        }
    }

    fn deliver(&mut self, item: T) {
        // -- 📭 no handler means nobody is listening. the item goes where unread mail goes.
        if let Some(handler) = self.handler.as_mut() {
            handler(item);
        }
    }

    fn check_writable(&mut self) -> bool {
        if self.is_writable() {
            true
        } else {
            self.overflow = true;
            false
        }
    }

    fn emit_pending(&mut self) {
        while self.demand > 0 {
            let Some(item) = self.pending.pop_front() else {
                break;
            };
            self.take_credit();
            self.deliver(item);
        }
        if self.overflow && self.is_writable() {
            self.overflow = false;
            if let Some(drain) = self.drain_handler.as_mut() {
                drain();
            }
        }
    }
}
