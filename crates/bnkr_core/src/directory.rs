use crate::remap::Remapper;
use crate::Addr;

use std::collections::HashSet;

/// Keeps track of which physical blocks currently live in a bunker slot. Since several physical
/// blocks share a slot, the slot's data has to be written back to every one of them when it's
/// evicted.
pub struct AliasDirectory {
    remapper: Remapper,
    block_size: u64,
    /// Block addresses of the resident aliases.
    present: HashSet<Addr>,
}

impl AliasDirectory {
    pub fn new(remapper: Remapper, block_size: u64) -> Self {
        Self {
            remapper,
            block_size,
            present: HashSet::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.present.len()
    }

    pub fn is_empty(&self) -> bool {
        self.present.is_empty()
    }

    pub fn contains(&self, block_addr: Addr) -> bool {
        self.present.contains(&block_addr)
    }

    /// Mark `block_addr` as living in it's slot. Returns false if it already was.
    pub fn record_alias(&mut self, block_addr: Addr) -> bool {
        let new = self.present.insert(block_addr);
        if new {
            trace!("recorded alias {block_addr:#x}");
        }
        new
    }

    pub fn forget_alias(&mut self, block_addr: Addr) -> bool {
        self.present.remove(&block_addr)
    }

    /// The block addresses of the aliases of slot `key` that are recorded, in alias order. `key`
    /// is in the bunker's address space, which counts blocks rather than bytes.
    pub fn aliases_of(&self, key: Addr) -> Vec<Addr> {
        self.remapper
            .aliases(key)
            .map(|block| block * self.block_size)
            .filter(|addr| self.present.contains(addr))
            .collect()
    }

    /// Same as ['aliases_of'] but also forgets them. Used when the slot is evicted.
    pub fn take_aliases(&mut self, key: Addr) -> Vec<Addr> {
        let aliases = self.aliases_of(key);
        for addr in &aliases {
            self.forget_alias(*addr);
        }
        aliases
    }
}
