mod hierarchy;

use crate::packet::Packet;
use crate::port::{CpuSide, MemSide, PortId};

/// Stands in for everything around a cache. Records what the cache sends, and refuses packets
/// when told to.
#[derive(Default)]
pub struct MockPorts {
    pub sent: Vec<Packet>,
    pub delivered: Vec<(PortId, Packet)>,
    pub retries: Vec<PortId>,
    pub refuse_down: bool,
    pub refuse_up: bool,
}

impl MemSide for MockPorts {
    fn try_send(&mut self, pkt: Packet) -> Result<(), Packet> {
        if self.refuse_down {
            return Err(pkt);
        }
        self.sent.push(pkt);
        Ok(())
    }
}

impl CpuSide for MockPorts {
    fn try_deliver(&mut self, port: PortId, pkt: Packet) -> Result<(), Packet> {
        if self.refuse_up {
            return Err(pkt);
        }
        self.delivered.push((port, pkt));
        Ok(())
    }

    fn notify_ready(&mut self, port: PortId) {
        self.retries.push(port);
    }
}
