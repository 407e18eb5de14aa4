//! Lists of accesses for the requesters to make.

use bnkr_core::{Access, Addr, PacketKind};
use bnkr_util::{parse_int, ParseError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

use std::path::{Path, PathBuf};
use std::{fs, io};

/// Where the arrays of ['daxpy'] start. Both arrays fit inside the default bunker range.
pub const DAXPY_BASE: Addr = 0xd3d40;

pub const DAXPY_ALPHA: f64 = 0.5;
const DAXPY_X: f64 = 4.0;
const DAXPY_Y: f64 = 8.0;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("failed to read trace {}: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: io::Error,
    },

    #[error("line {line}: expected '<R|W> <addr> <size> [value]'")]
    Malformed {
        line: usize,
    },

    #[error("line {line}: {err}")]
    Kind {
        line: usize,
        #[source]
        err: bnkr_core::Error,
    },

    #[error("line {line}: {err}")]
    Number {
        line: usize,
        #[source]
        err: ParseError,
    },

    #[error("line {line}: writebacks can only come from a cache")]
    Writeback {
        line: usize,
    },

    #[error("line {line}: access of {size} bytes is larger than a {block_size} byte block")]
    TooLarge {
        line: usize,
        size: u64,
        block_size: u64,
    },

    #[error("line {line}: value {value:#x} doesn't fit in {size} bytes")]
    ValueTooLarge {
        line: usize,
        value: u64,
        size: usize,
    },
}

/// `y[i] = alpha * x[i] + y[i]` over two arrays of `n` doubles. The arrays are first filled,
/// then the loop runs, and at last `y` is summed, so the final sum is `n * 10`.
pub fn daxpy(base: Addr, n: u64) -> Vec<Access> {
    let x = |i: u64| base + i * 8;
    let y = |i: u64| daxpy_y(base, n, i);

    let mut accesses = Vec::with_capacity(n as usize * 6);

    for i in 0..n {
        accesses.push(Access::write(x(i), DAXPY_X.to_le_bytes().to_vec()));
        accesses.push(Access::write(y(i), DAXPY_Y.to_le_bytes().to_vec()));
    }

    let result = DAXPY_ALPHA * DAXPY_X + DAXPY_Y;
    for i in 0..n {
        accesses.push(Access::read(x(i), 8));
        accesses.push(Access::read(y(i), 8));
        accesses.push(Access::write(y(i), result.to_le_bytes().to_vec()));
    }

    accesses.extend((0..n).map(|i| Access::read(y(i), 8)));
    accesses
}

/// The address of `y[i]` of ['daxpy'].
pub fn daxpy_y(base: Addr, n: u64, i: u64) -> Addr {
    base + (n + i) * 8
}

pub fn sequential(base: Addr, count: u64, size: usize) -> Vec<Access> {
    strided(base, count, size as u64, size)
}

/// Reads `stride` bytes apart.
pub fn strided(base: Addr, count: u64, stride: u64, size: usize) -> Vec<Access> {
    (0..count)
        .map(|i| Access::read(base + i * stride, size))
        .collect()
}

/// Random reads and writes of `size` bytes, aligned to `size`, in `base..base + len`.
pub fn random(seed: u64, base: Addr, len: u64, count: u64, size: usize) -> Vec<Access> {
    let mut rng = StdRng::seed_from_u64(seed);
    let slots = (len / size as u64).max(1);
    (0..count)
        .map(|_| {
            let addr = base + rng.gen_range(0..slots) * size as u64;
            if rng.gen_bool(0.25) {
                let mut data = vec![0; size];
                rng.fill(&mut data[..]);
                Access::write(addr, data)
            } else {
                Access::read(addr, size)
            }
        })
        .collect()
}

/// Parse a trace. Each line is `<R|W> <addr> <size> [value]`, where value is only given for
/// writes and written little endian. Empty lines and lines starting with `#` are skipped.
/// Accesses can't be larger than `block_size`.
pub fn parse_trace(src: &str, block_size: u64) -> Result<Vec<Access>, TraceError> {
    let mut accesses = Vec::new();

    for (i, text) in src.lines().enumerate() {
        let line = i + 1;
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = text.split_whitespace().collect();
        let [kind, addr, size, rest @ ..] = fields.as_slice() else {
            return Err(TraceError::Malformed { line });
        };

        let kind: PacketKind = kind
            .parse()
            .map_err(|err| TraceError::Kind { line, err })?;
        let number = |val: &str| parse_int(val).map_err(|err| TraceError::Number { line, err });
        let addr = number(*addr)?;
        let size = number(*size)?;
        if size > block_size {
            return Err(TraceError::TooLarge { line, size, block_size });
        }
        let size = size as usize;

        let access = match (kind, rest) {
            (PacketKind::Read, []) => Access::read(addr, size),
            (PacketKind::Write, [value]) => {
                let value = number(*value)?;
                if size < 8 && value >> (8 * size) != 0 {
                    return Err(TraceError::ValueTooLarge { line, value, size });
                }
                let mut data = value.to_le_bytes().to_vec();
                data.resize(size, 0);
                Access::write(addr, data)
            }
            (PacketKind::Write, []) => Access::write(addr, vec![0; size]),
            (PacketKind::Writeback, _) => return Err(TraceError::Writeback { line }),
            _ => return Err(TraceError::Malformed { line }),
        };

        accesses.push(access);
    }

    Ok(accesses)
}

pub fn load_trace(path: &Path, block_size: u64) -> Result<Vec<Access>, TraceError> {
    let src = fs::read_to_string(path).map_err(|err| TraceError::Io {
        path: path.to_path_buf(),
        err,
    })?;
    let accesses = parse_trace(&src, block_size)?;
    info!("loaded {} accesses from {}", accesses.len(), path.display());
    Ok(accesses)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daxpy_shape() {
        let accesses = daxpy(0x1000, 4);
        assert_eq!(accesses.len(), 4 * 2 + 4 * 3 + 4);

        // The loop writes the result to y.
        let write = &accesses[8 + 2];
        assert_eq!(write.kind, PacketKind::Write);
        assert_eq!(write.addr, daxpy_y(0x1000, 4, 0));
        assert_eq!(write.data, 10.0_f64.to_le_bytes().to_vec());
    }

    #[test]
    fn random_is_seeded_and_aligned() {
        let a = random(9, 0x4000, 0x1000, 100, 8);
        assert_eq!(a, random(9, 0x4000, 0x1000, 100, 8));
        assert!(a.iter().all(|access| access.addr % 8 == 0));
        assert!(a.iter().all(|access| (0x4000..0x5000).contains(&access.addr)));
    }

    #[test]
    fn trace() {
        let src = "
            # warm up
            R 0x240 8
            w 0x248 4 0xdeadbeef

            W 0x300 2
        ";
        let accesses = parse_trace(src, 64).unwrap();
        assert_eq!(accesses, vec![
            Access::read(0x240, 8),
            Access::write(0x248, vec![0xef, 0xbe, 0xad, 0xde]),
            Access::write(0x300, vec![0, 0]),
        ]);
    }

    #[test]
    fn bad_traces() {
        assert!(matches!(parse_trace("R 0x10", 64), Err(TraceError::Malformed { line: 1 })));
        assert!(matches!(parse_trace("\nX 0 8", 64), Err(TraceError::Kind { line: 2, .. })));
        assert!(matches!(parse_trace("R zz 8", 64), Err(TraceError::Number { line: 1, .. })));
        assert!(matches!(parse_trace("WB 0x40 64", 64), Err(TraceError::Writeback { line: 1 })));
        assert!(matches!(parse_trace("R 0x40 8 7", 64), Err(TraceError::Malformed { line: 1 })));
        assert!(matches!(
            parse_trace("W 0x40 1 0x100", 64),
            Err(TraceError::ValueTooLarge { line: 1, value: 0x100, size: 1 }),
        ));
        assert!(matches!(
            parse_trace("R 0x0 0x10000000000", 64),
            Err(TraceError::TooLarge { line: 1, size: 0x100_0000_0000, block_size: 64 }),
        ));
        assert!(matches!(
            parse_trace("R 0x0 64\nW 0x0 65", 64),
            Err(TraceError::TooLarge { line: 2, size: 65, .. }),
        ));
    }
}
