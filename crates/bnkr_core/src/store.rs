use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::Error;
use crate::packet::Packet;
use crate::Addr;

use std::collections::HashMap;

/// A block of cached data and the key it's stored under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheBlock {
    pub key: Addr,
    pub data: Box<[u8]>,
}

/// Fully associative block storage with random replacement.
///
/// The blocks are kept densely in a vector so a victim can be picked uniformly in constant time,
/// with a map from key to index on the side.
pub struct BlockStore {
    capacity: usize,
    block_size: u64,
    blocks: Vec<CacheBlock>,
    index: HashMap<Addr, usize>,
    rng: StdRng,
}

impl BlockStore {
    /// Create a store holding `size` bytes worth of blocks. The victims picked for eviction only
    /// depend on `seed` and the sequence of operations.
    pub fn new(size: u64, block_size: u64, seed: u64) -> Result<Self, Error> {
        if block_size == 0 {
            return Err(Error::config("block size must be at least 1"));
        }
        let capacity = (size / block_size) as usize;
        if capacity == 0 {
            return Err(Error::config(format!(
                "cache of {size} bytes can't hold a single {block_size} byte block"
            )));
        }
        Ok(Self {
            capacity,
            block_size,
            blocks: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            rng: StdRng::seed_from_u64(seed),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    pub fn contains(&self, key: Addr) -> bool {
        self.index.contains_key(&key)
    }

    pub fn lookup(&self, key: Addr) -> Option<&CacheBlock> {
        self.index.get(&key).map(|idx| &self.blocks[*idx])
    }

    pub fn keys(&self) -> impl Iterator<Item = Addr> + '_ {
        self.blocks.iter().map(|block| block.key)
    }

    fn lookup_mut(&mut self, key: Addr) -> Result<&mut CacheBlock, Error> {
        let idx = *self.index.get(&key).ok_or(Error::NotPresent(key))?;
        Ok(&mut self.blocks[idx])
    }

    /// Copy from the block stored under `key` into `pkt`.
    pub fn read_into(&mut self, key: Addr, pkt: &mut Packet) -> Result<(), Error> {
        let block_size = self.block_size;
        let block = self.lookup_mut(key)?;
        pkt.set_data_from_block(&block.data, block_size);
        Ok(())
    }

    /// Copy the data of `pkt` into the block stored under `key`.
    pub fn write_from(&mut self, key: Addr, pkt: &Packet) -> Result<(), Error> {
        let block_size = self.block_size;
        let block = self.lookup_mut(key)?;
        pkt.write_data_to_block(&mut block.data, block_size);
        Ok(())
    }

    /// Read or write depending on the kind of `pkt`.
    pub fn access(&mut self, key: Addr, pkt: &mut Packet) -> Result<(), Error> {
        if pkt.kind.is_write() {
            self.write_from(key, pkt)
        } else {
            self.read_into(key, pkt)
        }
    }

    /// Insert a block under `key`. If the store is full a random block is evicted first and
    /// returned, so the caller can write it back.
    pub fn insert(&mut self, key: Addr, data: &[u8]) -> Result<Option<CacheBlock>, Error> {
        if self.contains(key) {
            return Err(Error::DuplicateKey(key));
        }
        debug_assert_eq!(data.len() as u64, self.block_size);

        let victim = if self.is_full() {
            self.evict_one()
        } else {
            None
        };

        self.index.insert(key, self.blocks.len());
        self.blocks.push(CacheBlock {
            key,
            data: data.into(),
        });

        Ok(victim)
    }

    /// Remove a uniformly random block.
    pub fn evict_one(&mut self) -> Option<CacheBlock> {
        if self.blocks.is_empty() {
            return None;
        }
        let idx = self.rng.gen_range(0..self.blocks.len());
        let victim = self.blocks.swap_remove(idx);
        self.index.remove(&victim.key);

        // Fix the index of the block moved into the hole.
        if let Some(moved) = self.blocks.get(idx) {
            self.index.insert(moved.key, idx);
        }

        debug!("evicting block {:#x}", victim.key);
        Some(victim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(val: u8) -> Vec<u8> {
        vec![val; 16]
    }

    #[test]
    fn capacity_from_size() {
        let store = BlockStore::new(256, 16, 0).unwrap();
        assert_eq!(store.capacity(), 16);
        assert!(BlockStore::new(8, 16, 0).is_err());
        assert!(BlockStore::new(64, 0, 0).is_err());
    }

    #[test]
    fn hit_after_insert() {
        let mut store = BlockStore::new(64, 16, 0).unwrap();
        assert!(store.insert(0x40, &block(7)).unwrap().is_none());
        assert!(store.lookup(0x40).is_some());

        let mut pkt = Packet::read(1, 0x44, 4);
        store.read_into(0x40, &mut pkt).unwrap();
        assert_eq!(pkt.data(), &[7; 4]);
    }

    #[test]
    fn write_in_place() {
        let mut store = BlockStore::new(64, 16, 0).unwrap();
        store.insert(0x40, &block(0)).unwrap();

        let mut pkt = Packet::write(1, 0x42, vec![1, 2]);
        store.access(0x40, &mut pkt).unwrap();

        let data = &store.lookup(0x40).unwrap().data;
        assert_eq!(&data[..4], &[0, 0, 1, 2]);
    }

    #[test]
    fn missing_key() {
        let mut store = BlockStore::new(64, 16, 0).unwrap();
        let mut pkt = Packet::read(1, 0x0, 4);
        assert_eq!(store.read_into(0x0, &mut pkt), Err(Error::NotPresent(0x0)));
        assert_eq!(store.write_from(0x0, &pkt), Err(Error::NotPresent(0x0)));
    }

    #[test]
    fn duplicate_key() {
        let mut store = BlockStore::new(64, 16, 0).unwrap();
        store.insert(0x10, &block(1)).unwrap();
        assert_eq!(store.insert(0x10, &block(2)), Err(Error::DuplicateKey(0x10)));
        assert_eq!(store.lookup(0x10).unwrap().data[0], 1);
    }

    #[test]
    fn one_eviction_per_insert_when_full() {
        let mut store = BlockStore::new(4 * 16, 16, 42).unwrap();
        for key in 0..4 {
            assert!(store.insert(key * 16, &block(key as u8)).unwrap().is_none());
        }
        for key in 4..64 {
            let victim = store.insert(key * 16, &block(key as u8)).unwrap();
            let victim = victim.expect("full store must evict");
            assert!(!store.contains(victim.key));
            assert_eq!(victim.data[0] as u64, victim.key / 16);
            assert_eq!(store.len(), 4);
        }
        // The index must still agree with the blocks after all the swaps.
        for key in store.keys().collect::<Vec<_>>() {
            assert_eq!(store.lookup(key).unwrap().key, key);
        }
    }

    #[test]
    fn eviction_is_reproducible() {
        let victims = |seed| {
            let mut store = BlockStore::new(8 * 16, 16, seed).unwrap();
            (0..64)
                .filter_map(|key| store.insert(key * 16, &block(0)).unwrap())
                .map(|victim| victim.key)
                .collect::<Vec<_>>()
        };
        assert_eq!(victims(7), victims(7));
        assert_eq!(victims(7).len(), 56);
    }
}
