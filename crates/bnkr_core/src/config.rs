//! Configuration of the hierarchy. Everything is fixed once the hierarchy is built.
//!
//! Sizes and addresses may be written either as integers or as strings such as `"128kB"` and
//! `"0xd3d40"`.

use bnkr_util::{parse_int, parse_size};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;
use crate::remap::Remapper;
use crate::{Addr, Cycle};

/// An inclusive range of byte addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddrRange {
    #[serde(deserialize_with = "addr")]
    pub start: Addr,
    #[serde(deserialize_with = "addr")]
    pub end: Addr,
}

impl AddrRange {
    pub fn new(start: Addr, end: Addr) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, addr: Addr) -> bool {
        (self.start..=self.end).contains(&addr)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BunkerConfig {
    /// Spacing in blocks between the aliases of a slot.
    pub stride: u64,
    /// Number of aliases per slot.
    pub radix: u64,
    /// Only blocks in this range are bunkered. Everything is bunkered if not set.
    #[serde(default)]
    pub range: Option<AddrRange>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Total size of the data store in bytes.
    #[serde(deserialize_with = "size")]
    pub size: u64,
    /// Cycles taken on a hit or to resolve a miss.
    pub latency: Cycle,
    pub bunker: Option<BunkerConfig>,
}

impl CacheConfig {
    pub fn l1() -> Self {
        Self {
            size: 128 * 1024,
            latency: 1,
            bunker: None,
        }
    }

    pub fn l2() -> Self {
        Self {
            size: 1024 * 1024,
            latency: 3,
            bunker: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            size: 16 * 1024,
            latency: 1,
            bunker: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub latency: Cycle,
    pub range: AddrRange,
    /// Accesses the memory can have in flight before refusing more.
    pub max_outstanding: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            latency: 50,
            range: AddrRange::new(0, 1024 * 1024 * 1024 - 1),
            max_outstanding: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Cache line size in bytes, shared by all levels.
    #[serde(deserialize_with = "size")]
    pub block_size: u64,
    /// Seed for the random replacement of all caches.
    pub seed: u64,
    /// Cycles a requester waits after a response before issuing it's next access.
    pub think_time: Cycle,
    pub l1: CacheConfig,
    pub l2: CacheConfig,
    pub memory: MemoryConfig,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            block_size: 64,
            seed: 5489,
            think_time: 1,
            l1: CacheConfig::l1(),
            l2: CacheConfig::l2(),
            memory: MemoryConfig::default(),
        }
    }
}

impl SystemConfig {
    /// Check everything that can be checked before building the hierarchy.
    pub fn validate(&self) -> Result<(), Error> {
        if self.block_size == 0 {
            return Err(Error::config("block size must be at least 1"));
        }
        for (name, cache) in [("l1", &self.l1), ("l2", &self.l2)] {
            if cache.size < self.block_size {
                return Err(Error::config(format!(
                    "{name} size {} is smaller than a block",
                    cache.size,
                )));
            }
            if let Some(bunker) = &cache.bunker {
                Remapper::new(bunker.stride, bunker.radix).map_err(|err| match err {
                    Error::InvalidConfig(msg) => Error::config(format!("{name} {msg}")),
                    err => err,
                })?;
                if let Some(range) = bunker.range {
                    if range.start > range.end {
                        return Err(Error::config(format!("{name} bunker range is empty")));
                    }
                }
            }
        }
        if self.memory.max_outstanding == 0 {
            return Err(Error::config("memory must allow at least one access in flight"));
        }
        if self.memory.range.start > self.memory.range.end {
            return Err(Error::config("memory range is empty"));
        }
        Ok(())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Number {
    Int(u64),
    Str(String),
}

fn size<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    match Number::deserialize(de)? {
        Number::Int(val) => Ok(val),
        Number::Str(val) => parse_size(&val).map_err(serde::de::Error::custom),
    }
}

fn addr<'de, D: Deserializer<'de>>(de: D) -> Result<Addr, D::Error> {
    match Number::deserialize(de)? {
        Number::Int(val) => Ok(val),
        Number::Str(val) => parse_int(&val).map_err(serde::de::Error::custom),
    }
}
