#[macro_use]
extern crate log;

#[cfg(test)]
mod test;

pub mod cache;
pub mod config;
pub mod directory;
pub mod error;
pub mod memory;
pub mod packet;
pub mod port;
pub mod remap;
pub mod requester;
pub mod schedule;
pub mod stats;
pub mod store;
pub mod system;

pub use cache::{CacheController, Level};
pub use config::{AddrRange, BunkerConfig, CacheConfig, MemoryConfig, SystemConfig};
pub use error::Error;
pub use packet::{Packet, PacketKind};
pub use remap::Remapper;
pub use requester::{Access, Completion};
pub use stats::Stats;
pub use system::{StopReason, System};

/// Used to represent an absolute cycle number.
pub type Cycle = u64;

/// A byte address. Inside a bunker, addresses count blocks instead.
pub type Addr = u64;
