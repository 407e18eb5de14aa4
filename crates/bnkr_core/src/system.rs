//! The whole hierarchy: requesters on top of a shared L1, an L2 below it and memory at the
//! bottom. Everything is driven by events in a single ['Schedule'].

use crate::cache::{CacheController, Level};
use crate::config::SystemConfig;
use crate::error::Error;
use crate::memory::Memory;
use crate::packet::Packet;
use crate::port::{CpuSide, MemSide, PortId};
use crate::requester::{Access, Requester};
use crate::schedule::{Event, Schedule};
use crate::{Addr, Cycle};

use bnkr_util::Block;

use std::fmt;

/// Something that can receive responses and retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Node {
    Cpu(PortId),
    L1,
    L2,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Cpu(port) => write!(f, "requester {port}"),
            Node::L1 => write!(f, "L1"),
            Node::L2 => write!(f, "L2"),
        }
    }
}

/// Why ['System::run_until'] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every requester is done.
    Done,
    /// The cycle limit was reached.
    Time,
}

pub struct System {
    schedule: Schedule,
    cpus: Vec<Requester>,
    l1: CacheController,
    l2: CacheController,
    memory: Memory,
    think_time: Cycle,
}

impl System {
    /// Build the hierarchy with a requester for each workload.
    pub fn new(config: &SystemConfig, workloads: Vec<Vec<Access>>) -> Result<Self, Error> {
        config.validate()?;

        if workloads.is_empty() {
            return Err(Error::config("at least one requester is required"));
        }

        // Packets carry a buffer of the access size, so this has to fail before any are made.
        let spanning = workloads.iter().flatten().find(|access| {
            access.size as u64 > config.block_size
                || access.addr.spans_blocks(access.size as u64, config.block_size)
        });
        if let Some(access) = spanning {
            return Err(Error::SpanningAccessUnsupported {
                addr: access.addr,
                size: access.size,
            });
        }

        let mut schedule = Schedule::new();
        let cpus: Vec<Requester> = workloads
            .into_iter()
            .enumerate()
            .map(|(port, accesses)| Requester::new(port, accesses))
            .collect();

        for cpu in &cpus {
            schedule.schedule_now(Event::CpuIssue(cpu.port()));
        }

        let memory = Memory::new(&config.memory);

        // Each cache gets it's own seed, so they don't evict in lockstep.
        let mut l2 = CacheController::new(
            Level::L2,
            &config.l2,
            config.block_size,
            1,
            config.seed.wrapping_add(1),
        )?;
        let mut l1 = CacheController::new(
            Level::L1,
            &config.l1,
            config.block_size,
            cpus.len(),
            config.seed,
        )?;

        l2.recv_range_change(vec![memory.range()]);
        l1.recv_range_change(l2.addr_ranges().to_vec());

        info!(
            "built hierarchy with {} requesters, {} byte lines, {} kB L1 and {} kB L2",
            cpus.len(),
            config.block_size,
            config.l1.size / 1024,
            config.l2.size / 1024,
        );

        Ok(Self {
            schedule,
            cpus,
            l1,
            l2,
            memory,
            think_time: config.think_time,
        })
    }

    pub fn cycle(&self) -> Cycle {
        self.schedule.cycle()
    }

    pub fn l1(&self) -> &CacheController {
        &self.l1
    }

    pub fn l2(&self) -> &CacheController {
        &self.l2
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn requesters(&self) -> &[Requester] {
        &self.cpus
    }

    pub fn is_done(&self) -> bool {
        self.cpus.iter().all(|cpu| cpu.is_done())
    }

    /// True if no event is left, so no writeback is still on its way down.
    pub fn is_idle(&self) -> bool {
        self.schedule.is_empty()
    }

    /// Run until there is nothing left to do, and return the cycle the last event ran at. Fails
    /// with ['Error::Stalled'] if the events run out before every requester is done.
    pub fn run(&mut self) -> Result<Cycle, Error> {
        while self.step()? {}

        if !self.is_done() {
            return Err(Error::Stalled(self.cycle()));
        }

        Ok(self.cycle())
    }

    /// Run until every requester is done or `end` has been reached.
    pub fn run_until(&mut self, end: Cycle) -> Result<StopReason, Error> {
        while self.schedule.next_event().map_or(false, |cycle| cycle <= end) {
            self.step()?;
        }

        if self.is_done() {
            return Ok(StopReason::Done);
        }

        if self.schedule.is_empty() {
            return Err(Error::Stalled(self.cycle()));
        }

        self.schedule.skip_to(end);
        Ok(StopReason::Time)
    }

    /// Run the next event. Returns false if there was none.
    pub fn step(&mut self) -> Result<bool, Error> {
        match self.schedule.advance() {
            Some(event) => {
                self.handle_event(event)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn handle_event(&mut self, event: Event) -> Result<(), Error> {
        trace!("cycle {}: {event}", self.schedule.cycle());

        let now = self.schedule.cycle();

        match event {
            Event::CpuIssue(port) | Event::RetryReq(Node::Cpu(port)) => {
                self.issue(port);
            }
            Event::CacheAccess(Level::L1) => {
                let mut links = L1Links { schedule: &mut self.schedule, l2: &mut self.l2 };
                self.l1.access_timing(now, &mut links)?;
            }
            Event::CacheAccess(Level::L2) => {
                let mut links = L2Links { schedule: &mut self.schedule, memory: &mut self.memory };
                self.l2.access_timing(now, &mut links)?;
            }
            Event::MemoryRespond => {
                self.memory.respond(&mut MemoryLinks { schedule: &mut self.schedule })?;
            }
            Event::Response(Node::Cpu(port), pkt) => {
                self.cpus[port].recv_response(pkt, now)?;
                self.schedule.schedule_in(self.think_time, Event::CpuIssue(port));
            }
            Event::Response(Node::L1, pkt) => {
                let mut links = L1Links { schedule: &mut self.schedule, l2: &mut self.l2 };
                self.l1.handle_response(pkt, now, &mut links)?;
            }
            Event::Response(Node::L2, pkt) => {
                let mut links = L2Links { schedule: &mut self.schedule, memory: &mut self.memory };
                self.l2.handle_response(pkt, now, &mut links)?;
            }
            Event::RetryReq(Node::L1) => {
                let mut links = L1Links { schedule: &mut self.schedule, l2: &mut self.l2 };
                self.l1.recv_req_retry(&mut links);
            }
            Event::RetryReq(Node::L2) => {
                let mut links = L2Links { schedule: &mut self.schedule, memory: &mut self.memory };
                self.l2.recv_req_retry(&mut links);
            }
        }

        Ok(())
    }

    fn issue(&mut self, port: PortId) {
        let cpu = &mut self.cpus[port];
        let Some(pkt) = cpu.take_packet() else {
            return;
        };
        match self.l1.accept_request(port, pkt.clone(), &mut self.schedule) {
            Ok(()) => cpu.sent(&pkt, self.schedule.cycle()),
            Err(pkt) => cpu.refused(pkt),
        }
    }

    /// Read `size` bytes at `addr` from wherever the newest copy is, without any timing.
    pub fn functional_read(&mut self, addr: Addr, size: usize) -> Result<Vec<u8>, Error> {
        let mut pkt = Packet::read(0, addr, size);
        if !self.l1.functional(&mut pkt)? && !self.l2.functional(&mut pkt)? {
            self.memory.functional(&mut pkt)?;
        }
        Ok(pkt.into_data())
    }

    /// Write to every copy of the data at `addr`, without any timing.
    pub fn functional_write(&mut self, addr: Addr, data: Vec<u8>) -> Result<(), Error> {
        let mut pkt = Packet::write(0, addr, data);
        self.l1.functional(&mut pkt)?;
        self.l2.functional(&mut pkt)?;
        self.memory.functional(&mut pkt)
    }
}

/// What the L1 sees around it while handling an event.
struct L1Links<'a> {
    schedule: &'a mut Schedule,
    l2: &'a mut CacheController,
}

impl CpuSide for L1Links<'_> {
    fn try_deliver(&mut self, port: PortId, pkt: Packet) -> Result<(), Packet> {
        self.schedule.schedule_now(Event::Response(Node::Cpu(port), pkt));
        Ok(())
    }

    fn notify_ready(&mut self, port: PortId) {
        self.schedule.schedule_now(Event::RetryReq(Node::Cpu(port)));
    }
}

impl MemSide for L1Links<'_> {
    fn try_send(&mut self, pkt: Packet) -> Result<(), Packet> {
        self.l2.accept_request(0, pkt, self.schedule)
    }
}

/// What the L2 sees around it while handling an event.
struct L2Links<'a> {
    schedule: &'a mut Schedule,
    memory: &'a mut Memory,
}

impl CpuSide for L2Links<'_> {
    fn try_deliver(&mut self, _: PortId, pkt: Packet) -> Result<(), Packet> {
        self.schedule.schedule_now(Event::Response(Node::L1, pkt));
        Ok(())
    }

    fn notify_ready(&mut self, _: PortId) {
        self.schedule.schedule_now(Event::RetryReq(Node::L1));
    }
}

impl MemSide for L2Links<'_> {
    fn try_send(&mut self, pkt: Packet) -> Result<(), Packet> {
        self.memory.accept(pkt, self.schedule)
    }
}

struct MemoryLinks<'a> {
    schedule: &'a mut Schedule,
}

impl CpuSide for MemoryLinks<'_> {
    fn try_deliver(&mut self, _: PortId, pkt: Packet) -> Result<(), Packet> {
        self.schedule.schedule_now(Event::Response(Node::L2, pkt));
        Ok(())
    }

    fn notify_ready(&mut self, _: PortId) {
        self.schedule.schedule_now(Event::RetryReq(Node::L2));
    }
}
