use std::collections::VecDeque;

use foundation::ids::EpochId;
use serde::Serialize;

/// One traced occurrence, tagged with the round it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event<E> {
    /// Position in the overall trace; never reused, even after eviction.
    pub seq: u64,
    pub epoch: EpochId,
    pub payload: E,
}

/// Bounded, ordered trace of events.
///
/// The bus lives for the whole page, so it keeps at most `capacity` events and
/// discards the oldest ones first. Sequence numbers keep counting across
/// evictions, which lets readers notice gaps.
#[derive(Debug)]
pub struct EventBus<E> {
    capacity: usize,
    next_seq: u64,
    events: VecDeque<Event<E>>,
}

impl<E> EventBus<E> {
    pub const DEFAULT_CAPACITY: usize = 512;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            next_seq: 0,
            events: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn emit(&mut self, epoch: EpochId, payload: E) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        if self.events.len() == self.capacity {
            self.events.pop_front();
        }
        self.events.push_back(Event {
            seq,
            epoch,
            payload,
        });
        seq
    }

    pub fn events(&self) -> impl Iterator<Item = &Event<E>> {
        self.events.iter()
    }

    pub fn for_epoch(&self, epoch: EpochId) -> impl Iterator<Item = &Event<E>> {
        self.events.iter().filter(move |e| e.epoch == epoch)
    }

    pub fn drain(&mut self) -> Vec<Event<E>> {
        self.events.drain(..).collect()
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}
