use thiserror::Error;

use crate::cache::Level;
use crate::port::PortId;
use crate::{Addr, Cycle};

/// Everything that can abort a run. Apart from ['Error::InvalidConfig'] these are all broken
/// invariants of the blocking protocol, and never something to recover from.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("block {0:#x} is not present in the store")]
    NotPresent(Addr),

    #[error("block {0:#x} is already present in the store")]
    DuplicateKey(Addr),

    #[error("cannot handle access of {size} bytes at {addr:#x} spanning multiple cache lines")]
    SpanningAccessUnsupported {
        addr: Addr,
        size: usize,
    },

    #[error("access at {0:#x} should always hit after inserting")]
    ShouldHaveHitAfterInsert(Addr),

    #[error("{0} got a response for {1:#x} while not blocked")]
    NotBlocked(Level, Addr),

    #[error("{0} got a response for {1:#x} before resolving it's access")]
    UnexpectedResponse(Level, Addr),

    #[error("{0} resolved an access with nothing pending")]
    NoPendingAccess(Level),

    #[error("{0} got a writeback for {1:#x} from upstream")]
    UnexpectedWriteback(Level, Addr),

    #[error("writeback of {size} bytes at {addr:#x} isn't an aligned block")]
    MisalignedWriteback {
        addr: Addr,
        size: usize,
    },

    #[error("access at {0:#x} is outside of memory")]
    Unmapped(Addr),

    #[error("requester {port} got a response to request {id} it never sent")]
    UnmatchedResponse {
        port: PortId,
        id: u64,
    },

    #[error("unknown request kind '{0}'")]
    UnknownRequestKind(String),

    #[error("hierarchy stalled at cycle {0} with requests left")]
    Stalled(Cycle),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfig(msg.into())
    }
}
