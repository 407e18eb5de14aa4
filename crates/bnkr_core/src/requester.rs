//! Requesters sit on top of the hierarchy and issue a fixed list of accesses, one at a time.

use crate::error::Error;
use crate::packet::{Packet, PacketId, PacketKind};
use crate::port::PortId;
use crate::{Addr, Cycle};

use std::collections::VecDeque;

/// A single access a requester should make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub kind: PacketKind,
    pub addr: Addr,
    pub size: usize,
    /// Only used by writes.
    pub data: Vec<u8>,
}

impl Access {
    pub fn read(addr: Addr, size: usize) -> Self {
        Self {
            kind: PacketKind::Read,
            addr,
            size,
            data: Vec::new(),
        }
    }

    pub fn write(addr: Addr, data: Vec<u8>) -> Self {
        Self {
            kind: PacketKind::Write,
            addr,
            size: data.len(),
            data,
        }
    }

    fn into_packet(self, id: PacketId) -> Packet {
        match self.kind {
            PacketKind::Read => Packet::read(id, self.addr, self.size),
            PacketKind::Write => Packet::write(id, self.addr, self.data),
            PacketKind::Writeback => Packet::writeback(self.addr, self.data),
        }
    }
}

/// A finished access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub id: PacketId,
    pub kind: PacketKind,
    pub addr: Addr,
    pub data: Vec<u8>,
    /// Cycles from the request being accepted until the response arrived.
    pub latency: Cycle,
}

#[derive(Clone, Debug, Default)]
pub struct RequesterStats {
    pub issued: u64,
    pub completed: u64,
    /// Requests refused by the cache.
    pub refused: u64,
    pub total_latency: Cycle,
}

impl RequesterStats {
    pub fn mean_latency(&self) -> f64 {
        match self.completed {
            0 => 0.0,
            n => self.total_latency as f64 / n as f64,
        }
    }
}

pub struct Requester {
    port: PortId,
    accesses: VecDeque<Access>,
    next_id: PacketId,
    /// A request refused by the cache, waiting for a retry.
    refused: Option<Packet>,
    /// The id and issue cycle of the request in flight.
    outstanding: Option<(PacketId, Cycle)>,
    completions: Vec<Completion>,
    stats: RequesterStats,
}

impl Requester {
    pub fn new(port: PortId, accesses: impl IntoIterator<Item = Access>) -> Self {
        Self {
            port,
            accesses: accesses.into_iter().collect(),
            // Id 0 is used for packets made by the caches.
            next_id: 1,
            refused: None,
            outstanding: None,
            completions: Vec::new(),
            stats: RequesterStats::default(),
        }
    }

    pub fn port(&self) -> PortId {
        self.port
    }

    pub fn stats(&self) -> &RequesterStats {
        &self.stats
    }

    pub fn completions(&self) -> &[Completion] {
        &self.completions
    }

    pub fn remaining(&self) -> usize {
        self.accesses.len()
    }

    /// If every access has been made and answered.
    pub fn is_done(&self) -> bool {
        self.accesses.is_empty() && self.refused.is_none() && self.outstanding.is_none()
    }

    /// The next packet to send, if the requester isn't waiting on anything. A refused packet is
    /// sent again before anything new.
    pub fn take_packet(&mut self) -> Option<Packet> {
        if self.outstanding.is_some() {
            return None;
        }
        if let Some(pkt) = self.refused.take() {
            return Some(pkt);
        }
        let access = self.accesses.pop_front()?;
        let id = self.next_id;
        self.next_id += 1;
        Some(access.into_packet(id))
    }

    /// The packet taken was accepted.
    pub fn sent(&mut self, pkt: &Packet, now: Cycle) {
        trace!("requester {} sent {pkt}", self.port);
        self.stats.issued += 1;
        if pkt.kind.needs_response() {
            self.outstanding = Some((pkt.id, now));
        }
    }

    /// The packet taken was refused. It's kept until the cache signals a retry.
    pub fn refused(&mut self, pkt: Packet) {
        trace!("requester {} refused {pkt}", self.port);
        self.stats.refused += 1;
        self.refused = Some(pkt);
    }

    pub fn recv_response(&mut self, pkt: Packet, now: Cycle) -> Result<(), Error> {
        let (id, issued) = match self.outstanding {
            Some((id, issued)) if id == pkt.id => (id, issued),
            _ => {
                return Err(Error::UnmatchedResponse {
                    port: self.port,
                    id: pkt.id,
                });
            }
        };
        self.outstanding = None;

        let latency = now - issued;
        self.stats.completed += 1;
        self.stats.total_latency += latency;

        trace!("requester {} got {pkt} after {latency} cycles", self.port);

        self.completions.push(Completion {
            id,
            kind: pkt.kind,
            addr: pkt.addr,
            latency,
            data: pkt.into_data(),
        });

        Ok(())
    }
}
