use crate::config::{AddrRange, BunkerConfig};
use crate::directory::AliasDirectory;
use crate::error::Error;
use crate::packet::Packet;
use crate::remap::Remapper;
use crate::store::BlockStore;
use crate::Addr;

/// The bunkered part of a cache. Blocks are stored under their remapped block number, so up to
/// `radix` physical blocks share one slot.
///
/// Two live aliases of a slot read and write the same data. This isn't detected.
pub struct Bunker {
    remapper: Remapper,
    range: Option<AddrRange>,
    block_size: u64,
    store: BlockStore,
    directory: AliasDirectory,
}

impl Bunker {
    pub fn new(
        config: &BunkerConfig,
        size: u64,
        block_size: u64,
        seed: u64,
    ) -> Result<Self, Error> {
        let remapper = Remapper::new(config.stride, config.radix)?;
        Ok(Self {
            remapper,
            range: config.range,
            block_size,
            store: BlockStore::new(size, block_size, seed)?,
            directory: AliasDirectory::new(remapper, block_size),
        })
    }

    pub fn remapper(&self) -> &Remapper {
        &self.remapper
    }

    pub fn store(&self) -> &BlockStore {
        &self.store
    }

    pub fn directory(&self) -> &AliasDirectory {
        &self.directory
    }

    /// If the block at `block_addr` is stored here rather than in the plain store.
    pub fn covers(&self, block_addr: Addr) -> bool {
        self.range.map_or(true, |range| range.contains(block_addr))
    }

    /// The slot of the block at `block_addr`.
    pub fn key(&self, block_addr: Addr) -> Addr {
        self.remapper.forward(block_addr / self.block_size)
    }

    /// The block data of the slot `block_addr` maps to, if resident.
    pub fn lookup(&self, block_addr: Addr) -> Option<&[u8]> {
        self.store
            .lookup(self.key(block_addr))
            .map(|block| &block.data[..])
    }

    /// Access the slot `pkt` maps to. Returns false on a miss.
    pub fn access(&mut self, pkt: &mut Packet) -> Result<bool, Error> {
        let key = self.key(pkt.block_addr(self.block_size));
        if !self.store.contains(key) {
            return Ok(false);
        }
        self.store.access(key, pkt)?;
        Ok(true)
    }

    pub fn record_alias(&mut self, block_addr: Addr) {
        self.directory.record_alias(block_addr);
    }

    /// Insert the block at `block_addr`. If a slot had to be evicted, a writeback for each
    /// recorded alias of it is returned, all carrying the slot's data.
    pub fn insert(&mut self, block_addr: Addr, data: &[u8]) -> Result<Option<Vec<Packet>>, Error> {
        let key = self.key(block_addr);
        let evicted = self.store.insert(key, data)?.map(|victim| {
            let aliases = self.directory.take_aliases(victim.key);
            debug!(
                "evicted bunker slot {:#x}, writing back {} aliases",
                victim.key,
                aliases.len(),
            );
            aliases
                .into_iter()
                .map(|addr| Packet::writeback(addr, victim.data.to_vec()))
                .collect()
        });
        self.directory.record_alias(block_addr);
        Ok(evicted)
    }
}
