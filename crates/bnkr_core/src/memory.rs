use crate::config::{AddrRange, MemoryConfig};
use crate::error::Error;
use crate::packet::Packet;
use crate::port::{CpuSide, CpuSidePort};
use crate::schedule::{Event, Schedule};
use crate::{Addr, Cycle};

use std::collections::{HashMap, VecDeque};

const PAGE_SIZE: u64 = 4096;

#[derive(Clone, Debug, Default)]
pub struct MemoryStats {
    pub reads: u64,
    pub writes: u64,
    pub writebacks: u64,
}

/// The backing memory at the bottom of the hierarchy. Every access takes the same amount of
/// cycles, and accesses are served in the order they arrive.
///
/// Pages are allocated when first written. Bytes never written read as zero.
pub struct Memory {
    latency: Cycle,
    range: AddrRange,
    max_outstanding: usize,
    pages: HashMap<u64, Box<[u8]>>,
    /// Accesses in flight, oldest first.
    queue: VecDeque<Packet>,
    port: CpuSidePort,
    stats: MemoryStats,
}

impl Memory {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            latency: config.latency,
            range: config.range,
            max_outstanding: config.max_outstanding,
            pages: HashMap::new(),
            queue: VecDeque::with_capacity(config.max_outstanding),
            port: CpuSidePort::new(),
            stats: MemoryStats::default(),
        }
    }

    pub fn range(&self) -> AddrRange {
        self.range
    }

    pub fn latency(&self) -> Cycle {
        self.latency
    }

    pub fn stats(&self) -> &MemoryStats {
        &self.stats
    }

    pub fn in_flight(&self) -> usize {
        self.queue.len()
    }

    /// Start an access. The packet is handed back if too many accesses are already in flight.
    pub fn accept(&mut self, pkt: Packet, schedule: &mut Schedule) -> Result<(), Packet> {
        if self.queue.len() >= self.max_outstanding {
            trace!("memory full, refusing {pkt}");
            self.port.refuse();
            return Err(pkt);
        }
        trace!("memory got {pkt}");
        self.queue.push_back(pkt);
        schedule.schedule_in(self.latency, Event::MemoryRespond);
        Ok(())
    }

    /// Finish the oldest access in flight.
    pub fn respond(&mut self, up: &mut impl CpuSide) -> Result<(), Error> {
        let Some(mut pkt) = self.queue.pop_front() else {
            warn!("memory asked to respond with nothing in flight");
            return Ok(());
        };

        self.functional(&mut pkt)?;

        match pkt.kind {
            kind if kind.is_writeback() => self.stats.writebacks += 1,
            kind if kind.is_write() => self.stats.writes += 1,
            _ => self.stats.reads += 1,
        }

        if pkt.kind.needs_response() {
            pkt.make_response();
            self.port.send_packet(0, pkt, up);
        }

        self.port.try_send_retry(0, up);
        Ok(())
    }

    /// Read or write the data of `pkt` without any timing.
    pub fn functional(&mut self, pkt: &mut Packet) -> Result<(), Error> {
        if pkt.kind.is_write() {
            self.write_bytes(pkt.addr, pkt.data())
        } else {
            self.read_bytes(pkt.addr, pkt.data_mut())
        }
    }

    fn check_range(&self, addr: Addr, len: usize) -> Result<(), Error> {
        let last = addr.saturating_add((len as u64).saturating_sub(1));
        if !self.range.contains(addr) {
            return Err(Error::Unmapped(addr));
        }
        if !self.range.contains(last) {
            return Err(Error::Unmapped(last));
        }
        Ok(())
    }

    pub fn read_bytes(&self, addr: Addr, out: &mut [u8]) -> Result<(), Error> {
        self.check_range(addr, out.len())?;
        let mut addr = addr;
        let mut done = 0;
        while done < out.len() {
            let offset = (addr % PAGE_SIZE) as usize;
            let len = (PAGE_SIZE as usize - offset).min(out.len() - done);
            let chunk = &mut out[done..done + len];
            match self.pages.get(&(addr / PAGE_SIZE)) {
                Some(page) => chunk.copy_from_slice(&page[offset..offset + len]),
                None => chunk.fill(0),
            }
            addr += len as u64;
            done += len;
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, addr: Addr, data: &[u8]) -> Result<(), Error> {
        self.check_range(addr, data.len())?;
        let mut addr = addr;
        let mut done = 0;
        while done < data.len() {
            let offset = (addr % PAGE_SIZE) as usize;
            let len = (PAGE_SIZE as usize - offset).min(data.len() - done);
            let page = self.pages
                .entry(addr / PAGE_SIZE)
                .or_insert_with(|| vec![0; PAGE_SIZE as usize].into_boxed_slice());
            page[offset..offset + len].copy_from_slice(&data[done..done + len]);
            addr += len as u64;
            done += len;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Sink {
        responses: Vec<Packet>,
        retries: usize,
    }

    impl CpuSide for Sink {
        fn try_deliver(&mut self, _: usize, pkt: Packet) -> Result<(), Packet> {
            self.responses.push(pkt);
            Ok(())
        }

        fn notify_ready(&mut self, _: usize) {
            self.retries += 1;
        }
    }

    fn memory(max_outstanding: usize) -> Memory {
        Memory::new(&MemoryConfig {
            latency: 10,
            range: AddrRange::new(0, 0xffff),
            max_outstanding,
        })
    }

    #[test]
    fn unwritten_reads_zero() {
        let mut mem = memory(1);
        let mut pkt = Packet::read(1, 0x100, 8);
        mem.functional(&mut pkt).unwrap();
        assert_eq!(pkt.data(), &[0; 8]);
    }

    #[test]
    fn write_across_pages() {
        let mut mem = memory(1);
        let data: Vec<u8> = (0..16).collect();
        mem.write_bytes(PAGE_SIZE - 8, &data).unwrap();

        let mut out = [0; 16];
        mem.read_bytes(PAGE_SIZE - 8, &mut out).unwrap();
        assert_eq!(&out[..], &data[..]);
    }

    #[test]
    fn out_of_range() {
        let mem = memory(1);
        let mut out = [0; 4];
        assert_eq!(mem.read_bytes(0x10000, &mut out), Err(Error::Unmapped(0x10000)));
        assert_eq!(mem.read_bytes(0xfffe, &mut out), Err(Error::Unmapped(0x10001)));
    }

    #[test]
    fn refuses_when_full_and_retries() {
        let mut mem = memory(1);
        let mut schedule = Schedule::new();
        let mut sink = Sink::default();

        assert!(mem.accept(Packet::read(1, 0x0, 4), &mut schedule).is_ok());
        assert!(mem.accept(Packet::read(2, 0x40, 4), &mut schedule).is_err());

        assert_eq!(schedule.advance(), Some(Event::MemoryRespond));
        assert_eq!(schedule.cycle(), 10);
        mem.respond(&mut sink).unwrap();

        assert_eq!(sink.responses.len(), 1);
        assert!(sink.responses[0].is_response());
        assert_eq!(sink.retries, 1);
        assert_eq!(mem.stats().reads, 1);
    }

    #[test]
    fn writebacks_get_no_response() {
        let mut mem = memory(4);
        let mut schedule = Schedule::new();
        let mut sink = Sink::default();

        mem.accept(Packet::writeback(0x40, vec![9; 64]), &mut schedule).unwrap();
        mem.respond(&mut sink).unwrap();

        assert!(sink.responses.is_empty());
        assert_eq!(mem.stats().writebacks, 1);

        let mut out = [0; 2];
        mem.read_bytes(0x7e, &mut out).unwrap();
        assert_eq!(out, [9, 9]);
    }
}
