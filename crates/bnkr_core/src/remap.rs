//! The bunker transform.
//!
//! Original addresses are split into windows of `radix * stride`. Within a window, the addresses
//! `offset`, `offset + stride`, ..., `offset + (radix - 1) * stride` all collapse onto the same
//! bunker address, so a window of `radix * stride` addresses only needs `stride` slots.
//!
//! ```text
//!   stride = 3, radix = 2, window = 6
//!
//!   original  0 1 2 3 4 5 | 6 7 8 9 10 11
//!   bunker    0 1 2 0 1 2 | 3 4 5 3  4  5
//! ```
//!
//! Going back only gives the first address of the alias set. All the aliases have to be
//! enumerated with ['Remapper::aliases'].

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Remapper {
    stride: u64,
    radix: u64,
    window: u64,
}

impl Remapper {
    pub fn new(stride: u64, radix: u64) -> Result<Self, Error> {
        if stride == 0 {
            return Err(Error::config("bunker stride must be at least 1"));
        }
        if radix == 0 {
            return Err(Error::config("bunker radix must be at least 1"));
        }
        let Some(window) = stride.checked_mul(radix) else {
            return Err(Error::config(format!(
                "bunker window of stride {stride} times radix {radix} doesn't fit in 64 bits",
            )));
        };
        Ok(Self { stride, radix, window })
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn radix(&self) -> u64 {
        self.radix
    }

    pub fn window(&self) -> u64 {
        self.window
    }

    pub fn forward(&self, addr: u64) -> u64 {
        let group = addr / self.window();
        let offset = (addr % self.window()) % self.stride;
        group * self.stride + offset
    }

    /// The alias with index 0 of `bunker`.
    pub fn backward(&self, bunker: u64) -> u64 {
        let group = bunker / self.stride;
        let offset = bunker % self.stride;
        group * self.window() + offset
    }

    /// Which of the aliases of it's bunker address `addr` is.
    pub fn alias_index(&self, addr: u64) -> u64 {
        (addr % self.window()) / self.stride
    }

    /// All `radix` original addresses mapping to `bunker`, starting with the representative.
    pub fn aliases(&self, bunker: u64) -> impl Iterator<Item = u64> {
        let first = self.backward(bunker);
        let stride = self.stride;
        // Aliases past the end of the address space don't exist.
        (0..self.radix).map_while(move |i| first.checked_add(i * stride))
    }
}
