//! A blocking cache. Only a single request can be outstanding at a time: while one is being
//! served, new requests are refused and the requester is told to retry once the cache is free.
//!
//! ```text
//!            accept_request
//!    Idle ------------------> AccessPending
//!     ^                           |
//!     |  hit, or absorbed         | latency passed (access_timing)
//!     |  writeback                v
//!     +-------------------- resolve --- miss ---> MissPending
//!     ^                                               |
//!     +-------------- handle_response <---------------+
//! ```
//!
//! Writebacks caused by evictions don't occupy the outstanding slot. They are simply sent
//! downstream, and queued if the next level is busy.

pub mod bunker;

use bnkr_util::Block;

use crate::config::{AddrRange, CacheConfig};
use crate::error::Error;
use crate::packet::Packet;
use crate::port::{CpuSide, CpuSidePort, MemSide, MemSidePort, PortId};
use crate::schedule::{Event, Schedule};
use crate::stats::Stats;
use crate::store::BlockStore;
use crate::{Addr, Cycle};

use bunker::Bunker;

use std::fmt;
use std::mem;

/// Where in the hierarchy a cache sits. This decides how writebacks from upstream are treated:
/// the L2 absorbs them, while the L1 has nothing above it that could send one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    L1,
    L2,
}

impl Level {
    pub fn absorbs_writebacks(self) -> bool {
        self == Level::L2
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match *self {
            Level::L1 => "L1",
            Level::L2 => "L2",
        })
    }
}

/// A miss waiting for it's block to arrive from downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    /// The port to respond on.
    pub port: PortId,
    /// The cycle the miss was detected.
    pub issued_at: Cycle,
    /// The block being fetched.
    pub fetch: Addr,
    /// Set if the request was smaller than a block or misaligned, and a whole block fetch was
    /// sent in it's place. It's applied to the block once it arrives.
    pub original: Option<Packet>,
}

enum State {
    Idle,
    /// Waiting for the access latency to pass.
    AccessPending {
        port: PortId,
        pkt: Packet,
    },
    /// Waiting for a block from downstream.
    MissPending(PendingRequest),
}

pub struct CacheController {
    level: Level,
    latency: Cycle,
    block_size: u64,
    store: BlockStore,
    bunker: Option<Bunker>,
    state: State,
    cpu_ports: Vec<CpuSidePort>,
    mem_port: MemSidePort,
    ranges: Vec<AddrRange>,
    stats: Stats,
}

impl CacheController {
    /// Create a cache with `ports` upstream ports.
    pub fn new(
        level: Level,
        config: &CacheConfig,
        block_size: u64,
        ports: usize,
        seed: u64,
    ) -> Result<Self, Error> {
        if ports == 0 {
            return Err(Error::config(format!("{level} needs at least one upstream port")));
        }
        let bunker = config.bunker
            .as_ref()
            .map(|bunker| Bunker::new(bunker, config.size, block_size, seed ^ 0xb0b0))
            .transpose()?;
        Ok(Self {
            level,
            latency: config.latency,
            block_size,
            store: BlockStore::new(config.size, block_size, seed)?,
            bunker,
            state: State::Idle,
            cpu_ports: (0..ports).map(|_| CpuSidePort::new()).collect(),
            mem_port: MemSidePort::new(),
            ranges: Vec::new(),
            stats: Stats::default(),
        })
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn latency(&self) -> Cycle {
        self.latency
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn bunker(&self) -> Option<&Bunker> {
        self.bunker.as_ref()
    }

    pub fn is_blocked(&self) -> bool {
        !matches!(self.state, State::Idle)
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        match &self.state {
            State::MissPending(pending) => Some(pending),
            _ => None,
        }
    }

    /// Requests waiting to be sent downstream.
    pub fn queued_requests(&self) -> usize {
        self.mem_port.queued()
    }

    /// The address ranges this cache serves, which are the ranges of whatever is below.
    pub fn addr_ranges(&self) -> &[AddrRange] {
        &self.ranges
    }

    /// The next level changed it's ranges.
    pub fn recv_range_change(&mut self, ranges: Vec<AddrRange>) {
        debug!("{} serving new ranges {ranges:x?}", self.level);
        self.ranges = ranges;
    }

    /// The data of the block containing `addr`, if resident.
    pub fn peek(&self, addr: Addr) -> Option<&[u8]> {
        let block_addr = addr.block_addr(self.block_size);
        match &self.bunker {
            Some(bunker) if bunker.covers(block_addr) => bunker.lookup(block_addr),
            _ => self.store.lookup(block_addr).map(|block| &block.data[..]),
        }
    }

    /// Handle a request from upstream port `port`. The packet is handed back if the cache is
    /// busy, and the requester is told to retry once it isn't.
    pub fn accept_request(
        &mut self,
        port: PortId,
        pkt: Packet,
        schedule: &mut Schedule,
    ) -> Result<(), Packet> {
        debug_assert!(port < self.cpu_ports.len(), "no port {port}");
        if self.is_blocked() {
            trace!("{} blocked, refusing {pkt} on port {port}", self.level);
            self.cpu_ports[port].refuse();
            return Err(pkt);
        }
        trace!("{} got request {pkt} on port {port}", self.level);
        self.state = State::AccessPending { port, pkt };
        schedule.schedule_in(self.latency, Event::CacheAccess(self.level));
        Ok(())
    }

    /// Called when the access latency has passed.
    pub fn access_timing<P>(&mut self, now: Cycle, ports: &mut P) -> Result<(), Error>
    where
        P: CpuSide + MemSide,
    {
        let (port, mut pkt) = match mem::replace(&mut self.state, State::Idle) {
            State::AccessPending { port, pkt } => (port, pkt),
            state => {
                self.state = state;
                return Err(Error::NoPendingAccess(self.level));
            }
        };

        if pkt.kind.is_writeback() && !self.level.absorbs_writebacks() {
            return Err(Error::UnexpectedWriteback(self.level, pkt.addr));
        }
        if pkt.kind.is_writeback() && !pkt.is_whole_block(self.block_size) {
            return Err(Error::MisalignedWriteback {
                addr: pkt.addr,
                size: pkt.size(),
            });
        }
        if pkt.spans_blocks(self.block_size) {
            return Err(Error::SpanningAccessUnsupported {
                addr: pkt.addr,
                size: pkt.size(),
            });
        }

        let hit = self.access_functional(&mut pkt)?;
        trace!("{} {} for {pkt}", self.level, if hit { "hit" } else { "miss" });

        let block_addr = pkt.block_addr(self.block_size);

        if hit {
            self.stats.hits += 1;
            self.record_alias(block_addr);
            if pkt.kind.is_writeback() {
                // Nothing to respond with. Just make room for the next request.
                self.stats.absorbed += 1;
                self.send_retries(ports);
            } else {
                pkt.make_response();
                self.send_response(port, pkt, ports);
            }
            return Ok(());
        }

        self.stats.misses += 1;

        if pkt.is_whole_block(self.block_size) {
            if pkt.kind.is_writeback() {
                // Writebacks always succeed locally, there is nothing to fetch.
                self.insert(&pkt, ports)?;
                self.stats.absorbed += 1;
                self.send_retries(ports);
            } else {
                self.state = State::MissPending(PendingRequest {
                    port,
                    issued_at: now,
                    fetch: block_addr,
                    original: None,
                });
                self.mem_port.send_packet(pkt, ports);
            }
            return Ok(());
        }

        let fetch = pkt.upgraded(self.block_size);
        debug!("{} upgrading {pkt} to {fetch}", self.level);
        self.stats.upgrades += 1;
        self.state = State::MissPending(PendingRequest {
            port,
            issued_at: now,
            fetch: block_addr,
            original: Some(pkt),
        });
        self.mem_port.send_packet(fetch, ports);

        Ok(())
    }

    /// Handle a response from downstream.
    pub fn handle_response<P>(
        &mut self,
        pkt: Packet,
        now: Cycle,
        ports: &mut P,
    ) -> Result<(), Error>
    where
        P: CpuSide + MemSide,
    {
        let pending = match mem::replace(&mut self.state, State::Idle) {
            State::MissPending(pending) => pending,
            State::Idle => return Err(Error::NotBlocked(self.level, pkt.addr)),
            state @ State::AccessPending { .. } => {
                self.state = state;
                return Err(Error::UnexpectedResponse(self.level, pkt.addr));
            }
        };

        trace!("{} got response {pkt}", self.level);
        debug_assert_eq!(pkt.addr, pending.fetch);

        // Inserting is assumed to be off the critical path, so it doesn't add latency.
        self.insert(&pkt, ports)?;
        self.stats.miss_latency.sample(now - pending.issued_at);

        let response = match pending.original {
            Some(mut original) => {
                if !self.access_functional(&mut original)? {
                    return Err(Error::ShouldHaveHitAfterInsert(original.addr));
                }
                original.make_response();
                original
            }
            None => pkt,
        };

        self.send_response(pending.port, response, ports);
        Ok(())
    }

    /// The next level can take requests again.
    pub fn recv_req_retry(&mut self, ports: &mut impl MemSide) {
        trace!("{} got request retry", self.level);
        self.mem_port.recv_req_retry(ports);
    }

    /// The requester on `port` can take responses again.
    pub fn recv_resp_retry(&mut self, port: PortId, ports: &mut impl CpuSide) {
        self.cpu_ports[port].recv_resp_retry(port, ports);
        if !self.is_blocked() {
            self.cpu_ports[port].try_send_retry(port, ports);
        }
    }

    /// Debug access which reads or writes data in place without timing. Returns false if the
    /// block isn't resident, in which case the caller should go to the next level.
    pub fn functional(&mut self, pkt: &mut Packet) -> Result<bool, Error> {
        if pkt.spans_blocks(self.block_size) {
            return Err(Error::SpanningAccessUnsupported {
                addr: pkt.addr,
                size: pkt.size(),
            });
        }
        self.access_functional(pkt)
    }

    fn access_functional(&mut self, pkt: &mut Packet) -> Result<bool, Error> {
        let block_addr = pkt.block_addr(self.block_size);
        match &mut self.bunker {
            Some(bunker) if bunker.covers(block_addr) => bunker.access(pkt),
            _ => {
                if !self.store.contains(block_addr) {
                    return Ok(false);
                }
                self.store.access(block_addr, pkt)?;
                Ok(true)
            }
        }
    }

    fn record_alias(&mut self, block_addr: Addr) {
        if let Some(bunker) = &mut self.bunker {
            if bunker.covers(block_addr) {
                bunker.record_alias(block_addr);
            }
        }
    }

    /// Insert the whole block `pkt`, and write back whatever had to be evicted.
    fn insert(&mut self, pkt: &Packet, ports: &mut impl MemSide) -> Result<(), Error> {
        debug_assert!(pkt.is_whole_block(self.block_size));
        trace!("{} inserting {pkt}", self.level);

        let writebacks = match &mut self.bunker {
            Some(bunker) if bunker.covers(pkt.addr) => bunker.insert(pkt.addr, pkt.data())?,
            _ => self.store
                .insert(pkt.addr, pkt.data())?
                .map(|victim| vec![Packet::writeback(victim.key, victim.data.into_vec())]),
        };

        if let Some(writebacks) = writebacks {
            self.stats.evictions += 1;
            for wb in writebacks {
                debug!("{} writing back {wb}", self.level);
                self.stats.writebacks += 1;
                self.mem_port.send_packet(wb, ports);
            }
        }

        Ok(())
    }

    /// Send a response upstream. The cache must be free at this point, since the requester may
    /// want to send a new request straight away.
    fn send_response<P: CpuSide>(&mut self, port: PortId, pkt: Packet, ports: &mut P) {
        debug_assert!(!self.is_blocked());
        self.cpu_ports[port].send_packet(port, pkt, ports);
        self.send_retries(ports);
    }

    /// Tell every requester that was refused while the cache was busy to try again.
    fn send_retries(&mut self, ports: &mut impl CpuSide) {
        for (id, port) in self.cpu_ports.iter_mut().enumerate() {
            port.try_send_retry(id, ports);
        }
    }
}
