use crate::cache::Level;
use crate::packet::Packet;
use crate::port::PortId;
use crate::system::Node;
use crate::Cycle;

use std::collections::BinaryHeap;
use std::collections::binary_heap::Iter as BinaryHeapIter;
use std::cmp::Ordering;
use std::fmt;

/// This is reponsible for handling events and timing of the hierarchy in general.
pub struct Schedule {
    /// The absolute cycle number, which is the amount of cycles the hierarchy has run since
    /// startup.
    cycle: Cycle,
    /// Event queue. Events are sorted in the binary queue such that the next event to run is the
    /// root item.
    events: BinaryHeap<EventEntry>,
    /// Incremented for every scheduled event. Events scheduled for the same cycle run in the order
    /// they were scheduled, which keeps runs deterministic.
    seq: u64,
}

impl Schedule {
    pub fn new() -> Self {
        Self {
            cycle: 0,
            events: BinaryHeap::with_capacity(16),
            seq: 0,
        }
    }

    /// Returns iter of all event entries in the event heap in arbitary order.
    pub fn iter(&self) -> BinaryHeapIter<'_, EventEntry> {
        self.events.iter()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Schedule an ['Event'] at a given absolute cycle. Cycles in the past are moved to the
    /// current cycle.
    pub fn schedule_at(&mut self, cycle: Cycle, event: Event) {
        trace!("scheduled '{event}' at cycle {cycle}");
        let cycle = cycle.max(self.cycle);
        self.events.push(EventEntry { cycle, seq: self.seq, event });
        self.seq += 1;
    }

    /// Schedule an ['Event'] in a given number of cycles.
    pub fn schedule_in(&mut self, cycles: Cycle, event: Event) {
        self.schedule_at(self.cycle + cycles, event);
    }

    /// Schedule an ['Event'] to be executed as soon as possible, after all other events of the
    /// current cycle.
    pub fn schedule_now(&mut self, event: Event) {
        self.schedule_at(self.cycle, event);
    }

    /// The cycle of the next event, if any.
    pub fn next_event(&self) -> Option<Cycle> {
        self.events.peek().map(|entry| entry.cycle)
    }

    /// Returns an event if any is ready at the current cycle.
    pub fn pop_event(&mut self) -> Option<Event> {
        if self.next_event()? <= self.cycle {
            self.events.pop().map(|entry| entry.event)
        } else {
            None
        }
    }

    /// Skip forward to the next event and return it.
    pub fn advance(&mut self) -> Option<Event> {
        let entry = self.events.pop()?;
        self.skip_to(entry.cycle);
        Some(entry.event)
    }

    pub fn cycle(&self) -> Cycle {
        self.cycle
    }

    /// Move a given amount of cycles forward.
    pub fn tick(&mut self, cycles: Cycle) {
        self.cycle += cycles;
    }

    /// Skip to a cycle. It can only skip forward, so if a cycle given is less than the current
    /// cycle, nothing happens.
    pub fn skip_to(&mut self, cycle: Cycle) {
        self.cycle = self.cycle.max(cycle);
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Event {
    /// A requester should try to issue it's next access.
    CpuIssue(PortId),
    /// The access latency of a cache has passed and the access can be resolved.
    CacheAccess(Level),
    /// Memory is done with the oldest access in it's queue.
    MemoryRespond,
    /// A response traveling up to a node.
    Response(Node, Packet),
    /// A node that was refused earlier may now try to send again.
    RetryReq(Node),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Event::CpuIssue(port) => {
                write!(f, "Issue from requester {port}")
            }
            Event::CacheAccess(level) => {
                write!(f, "Access {level}")
            }
            Event::MemoryRespond => {
                write!(f, "Memory respond")
            }
            Event::Response(node, pkt) => {
                write!(f, "Response {pkt} to {node}")
            }
            Event::RetryReq(node) => {
                write!(f, "Retry request from {node}")
            }
        }
    }
}

pub struct EventEntry {
    pub cycle: Cycle,
    seq: u64,
    pub event: Event,
}

impl PartialEq for EventEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cycle == other.cycle && self.seq == other.seq
    }
}

impl Eq for EventEntry {}

impl PartialOrd for EventEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EventEntry {
    /// Sort smallest to largest cycle, then by the order scheduled.
    fn cmp(&self, other: &Self) -> Ordering {
        other.cycle
            .cmp(&self.cycle)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_run_in_cycle_order() {
        let mut schedule = Schedule::new();
        schedule.schedule_in(3, Event::CacheAccess(Level::L2));
        schedule.schedule_in(1, Event::CacheAccess(Level::L1));
        schedule.schedule_in(2, Event::MemoryRespond);

        assert_eq!(schedule.pop_event(), None);
        assert_eq!(schedule.advance(), Some(Event::CacheAccess(Level::L1)));
        assert_eq!(schedule.cycle(), 1);
        assert_eq!(schedule.advance(), Some(Event::MemoryRespond));
        assert_eq!(schedule.advance(), Some(Event::CacheAccess(Level::L2)));
        assert_eq!(schedule.cycle(), 3);
        assert_eq!(schedule.advance(), None);
    }

    #[test]
    fn same_cycle_is_fifo() {
        let mut schedule = Schedule::new();
        schedule.tick(10);
        schedule.schedule_now(Event::CpuIssue(2));
        schedule.schedule_now(Event::CpuIssue(0));
        schedule.schedule_at(4, Event::CpuIssue(1));

        assert_eq!(schedule.pop_event(), Some(Event::CpuIssue(2)));
        assert_eq!(schedule.pop_event(), Some(Event::CpuIssue(0)));
        assert_eq!(schedule.pop_event(), Some(Event::CpuIssue(1)));
        assert_eq!(schedule.cycle(), 10);
    }
}
