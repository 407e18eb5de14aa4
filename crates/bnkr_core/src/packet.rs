//! Requests and responses traveling between the levels of the hierarchy.

use bnkr_util::Block;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::Addr;

use std::fmt;
use std::str::FromStr;

/// Identifies a request and the response to it. Packets created by a cache on it's own, such as
/// writebacks, use ['INTERNAL_ID'].
pub type PacketId = u64;

pub const INTERNAL_ID: PacketId = 0;

/// The kind of access. This is a closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PacketKind {
    Read,
    Write,
    /// Dirty data being pushed down the hierarchy. Never gets a response.
    Writeback,
}

impl PacketKind {
    pub fn is_read(self) -> bool {
        self == PacketKind::Read
    }

    /// Writebacks carry data to be written, so they count as writes.
    pub fn is_write(self) -> bool {
        matches!(self, PacketKind::Write | PacketKind::Writeback)
    }

    pub fn is_writeback(self) -> bool {
        self == PacketKind::Writeback
    }

    pub fn needs_response(self) -> bool {
        !self.is_writeback()
    }
}

impl FromStr for PacketKind {
    type Err = Error;

    fn from_str(val: &str) -> Result<Self, Error> {
        let kind = match val.to_ascii_lowercase().as_str() {
            "r" | "read" => PacketKind::Read,
            "w" | "write" => PacketKind::Write,
            "wb" | "writeback" => PacketKind::Writeback,
            _ => return Err(Error::UnknownRequestKind(val.to_string())),
        };
        Ok(kind)
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", match *self {
            PacketKind::Read => "ReadReq",
            PacketKind::Write => "WriteReq",
            PacketKind::Writeback => "WritebackDirty",
        })
    }
}

/// A single memory access. The packet owns it's data buffer, which always has the size of the
/// access. For reads it's filled in when the access is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: PacketId,
    pub kind: PacketKind,
    pub addr: Addr,
    data: Vec<u8>,
    response: bool,
}

impl Packet {
    pub fn read(id: PacketId, addr: Addr, size: usize) -> Self {
        Self {
            id,
            kind: PacketKind::Read,
            addr,
            data: vec![0; size],
            response: false,
        }
    }

    pub fn write(id: PacketId, addr: Addr, data: Vec<u8>) -> Self {
        Self {
            id,
            kind: PacketKind::Write,
            addr,
            data,
            response: false,
        }
    }

    pub fn writeback(addr: Addr, data: Vec<u8>) -> Self {
        Self {
            id: INTERNAL_ID,
            kind: PacketKind::Writeback,
            addr,
            data,
            response: false,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    pub fn is_response(&self) -> bool {
        self.response
    }

    /// Turn the request into it's response.
    pub fn make_response(&mut self) {
        debug_assert!(self.kind.needs_response(), "writebacks never get a response");
        debug_assert!(!self.response, "packet is already a response");
        self.response = true;
    }

    pub fn block_addr(&self, block_size: u64) -> Addr {
        self.addr.block_addr(block_size)
    }

    /// If the packet covers exactly one whole block.
    pub fn is_whole_block(&self, block_size: u64) -> bool {
        self.addr.is_block_aligned(block_size) && self.size() as u64 == block_size
    }

    pub fn spans_blocks(&self, block_size: u64) -> bool {
        self.addr.spans_blocks(self.size() as u64, block_size)
    }

    /// A read of the whole block containing this packet. The new packet keeps the id, since it's
    /// issued on behalf of this packet.
    pub fn upgraded(&self, block_size: u64) -> Packet {
        Packet::read(self.id, self.block_addr(block_size), block_size as usize)
    }

    /// Copy the packet data into `block` at the packet's offset into the block.
    pub fn write_data_to_block(&self, block: &mut [u8], block_size: u64) {
        let offset = self.addr.block_offset(block_size) as usize;
        block[offset..offset + self.size()].copy_from_slice(&self.data);
    }

    /// Fill the packet with data from `block` at the packet's offset into the block.
    pub fn set_data_from_block(&mut self, block: &[u8], block_size: u64) {
        let offset = self.addr.block_offset(block_size) as usize;
        let size = self.size();
        self.data.copy_from_slice(&block[offset..offset + size]);
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let end = self.addr + (self.size() as u64).saturating_sub(1);
        write!(f, "{} [{:#x}:{:#x}]", self.kind, self.addr, end)?;
        if self.response {
            write!(f, " (response)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_str() {
        assert_eq!("R".parse::<PacketKind>(), Ok(PacketKind::Read));
        assert_eq!("write".parse::<PacketKind>(), Ok(PacketKind::Write));
        assert_eq!("WB".parse::<PacketKind>(), Ok(PacketKind::Writeback));
        assert_eq!(
            "prefetch".parse::<PacketKind>(),
            Err(Error::UnknownRequestKind("prefetch".to_string())),
        );
    }

    #[test]
    fn block_data_at_offset() {
        let mut block = vec![0_u8; 16];
        let pkt = Packet::write(1, 0x24, vec![1, 2, 3, 4]);
        pkt.write_data_to_block(&mut block, 16);
        assert_eq!(&block[4..8], &[1, 2, 3, 4]);

        let mut pkt = Packet::read(2, 0x26, 2);
        pkt.set_data_from_block(&block, 16);
        assert_eq!(pkt.data(), &[3, 4]);
    }

    #[test]
    fn upgrade_is_aligned_block() {
        let pkt = Packet::write(7, 0x1044, vec![0xaa; 4]);
        let fetch = pkt.upgraded(64);
        assert_eq!(fetch.kind, PacketKind::Read);
        assert_eq!(fetch.addr, 0x1040);
        assert_eq!(fetch.size(), 64);
        assert_eq!(fetch.id, 7);
        assert!(fetch.is_whole_block(64));
        assert!(!pkt.is_whole_block(64));
    }

    #[test]
    fn display() {
        let mut pkt = Packet::read(1, 0x240, 8);
        assert_eq!(pkt.to_string(), "ReadReq [0x240:0x247]");
        pkt.make_response();
        assert_eq!(pkt.to_string(), "ReadReq [0x240:0x247] (response)");
    }
}
