//! The two sides of a cache. A cache talks to whatever is above it through ['CpuSide'] and to
//! whatever is below through ['MemSide']. Both hand a packet back if the other end is busy, in
//! which case the packet is buffered in ['CpuSidePort'] or ['MemSidePort'] until the other end
//! signals that it's ready again.

use crate::packet::Packet;

use std::collections::VecDeque;

/// Index of an upstream port of a cache.
pub type PortId = usize;

/// What a cache sees above it.
pub trait CpuSide {
    /// Try to deliver a response on `port`. The packet is handed back if the receiver is busy.
    fn try_deliver(&mut self, port: PortId, pkt: Packet) -> Result<(), Packet>;

    /// Tell the requester on `port` that a request it had refused may now succeed.
    fn notify_ready(&mut self, port: PortId);
}

/// What a cache sees below it.
pub trait MemSide {
    /// Try to send a request downstream. The packet is handed back if the receiver is busy.
    fn try_send(&mut self, pkt: Packet) -> Result<(), Packet>;
}

/// Bookkeeping for a single upstream port.
#[derive(Default)]
pub struct CpuSidePort {
    /// Responses refused by the requester, oldest first.
    blocked: VecDeque<Packet>,
    /// A request was refused on this port, so the requester is waiting to be told when to retry.
    need_retry: bool,
}

impl CpuSidePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }

    pub fn needs_retry(&self) -> bool {
        self.need_retry
    }

    /// Remember that a request on this port was refused.
    pub fn refuse(&mut self) {
        self.need_retry = true;
    }

    /// Send a response, or buffer it if the requester is busy. Responses are never reordered.
    pub fn send_packet(&mut self, id: PortId, pkt: Packet, up: &mut impl CpuSide) {
        if self.has_blocked() {
            self.blocked.push_back(pkt);
            return;
        }
        trace!("sending {pkt} on port {id}");
        if let Err(pkt) = up.try_deliver(id, pkt) {
            trace!("port {id} busy, holding {pkt}");
            self.blocked.push_back(pkt);
        }
    }

    /// The requester is ready for responses again.
    pub fn recv_resp_retry(&mut self, id: PortId, up: &mut impl CpuSide) {
        while let Some(pkt) = self.blocked.pop_front() {
            trace!("retrying response {pkt} on port {id}");
            if let Err(pkt) = up.try_deliver(id, pkt) {
                self.blocked.push_front(pkt);
                break;
            }
        }
    }

    /// Send a retry if the requester was refused and there are no responses stuck on the port.
    pub fn try_send_retry(&mut self, id: PortId, up: &mut impl CpuSide) {
        if self.need_retry && !self.has_blocked() {
            trace!("sending retry on port {id}");
            self.need_retry = false;
            up.notify_ready(id);
        }
    }
}

/// Outgoing requests that couldn't be sent yet, oldest first.
#[derive(Default)]
pub struct MemSidePort {
    blocked: VecDeque<Packet>,
}

impl MemSidePort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocked.is_empty()
    }

    /// Number of packets waiting to be sent.
    pub fn queued(&self) -> usize {
        self.blocked.len()
    }

    /// Send a request downstream, or queue it behind earlier requests.
    pub fn send_packet(&mut self, pkt: Packet, down: &mut impl MemSide) {
        if self.is_blocked() {
            trace!("queueing {pkt} behind {} blocked packets", self.blocked.len());
            self.blocked.push_back(pkt);
            return;
        }
        if let Err(pkt) = down.try_send(pkt) {
            trace!("sending {pkt} downstream failed, holding it");
            self.blocked.push_back(pkt);
        }
    }

    /// The next level is ready again. Send as many queued requests as it will take.
    pub fn recv_req_retry(&mut self, down: &mut impl MemSide) {
        while let Some(pkt) = self.blocked.pop_front() {
            if let Err(pkt) = down.try_send(pkt) {
                self.blocked.push_front(pkt);
                break;
            }
        }
    }
}
