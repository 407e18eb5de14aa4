use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{AddrRange, BunkerConfig, CacheConfig, MemoryConfig, SystemConfig};
use crate::error::Error;
use crate::packet::PacketKind;
use crate::requester::Access;
use crate::system::{StopReason, System};

/// A hierarchy small enough to evict all the time.
fn small_config() -> SystemConfig {
    SystemConfig {
        block_size: 64,
        seed: 17,
        think_time: 1,
        l1: CacheConfig { size: 4 * 64, latency: 1, bunker: None },
        l2: CacheConfig { size: 16 * 64, latency: 3, bunker: None },
        memory: MemoryConfig {
            latency: 20,
            range: AddrRange::new(0, 0xf_ffff),
            max_outstanding: 4,
        },
    }
}

fn reads(system: &System, port: usize) -> Vec<(u64, Vec<u8>)> {
    system.requesters()[port]
        .completions()
        .iter()
        .filter(|done| done.kind == PacketKind::Read)
        .map(|done| (done.addr, done.data.clone()))
        .collect()
}

#[test]
fn cold_miss_latency() {
    let config = SystemConfig::default();
    let mut system = System::new(&config, vec![vec![Access::read(0x1000, 8)]]).unwrap();
    system.run().unwrap();

    let done = &system.requesters()[0].completions()[0];
    let expected = config.l1.latency + config.l2.latency + config.memory.latency;
    assert_eq!(done.latency, expected);
    assert_eq!(done.data, vec![0; 8]);
    assert_eq!(system.l1().stats().upgrades, 1);
    assert_eq!(system.l2().stats().misses, 1);
    assert_eq!(system.memory().stats().reads, 1);
}

#[test]
fn write_then_read_back() {
    let blocks = 64_u64;
    let mut accesses: Vec<Access> = (0..blocks)
        .map(|i| Access::write(i * 0x40 + 8, i.to_le_bytes().to_vec()))
        .collect();
    accesses.extend((0..blocks).map(|i| Access::read(i * 0x40 + 8, 8)));

    let mut system = System::new(&small_config(), vec![accesses]).unwrap();
    system.run().unwrap();

    let reads = reads(&system, 0);
    assert_eq!(reads.len(), blocks as usize);
    for (i, (addr, data)) in reads.into_iter().enumerate() {
        assert_eq!(addr, i as u64 * 0x40 + 8);
        assert_eq!(data, (i as u64).to_le_bytes().to_vec(), "block {i}");
    }

    assert!(system.l1().stats().evictions > 0);
    assert!(system.l2().stats().evictions > 0);
    assert_eq!(system.functional_read(5 * 0x40 + 8, 8).unwrap(), 5_u64.to_le_bytes().to_vec());
}

#[test]
fn l2_absorbs_l1_writebacks() {
    let mut config = small_config();
    config.l1.size = 64;

    let accesses = vec![
        Access::write(0x0, vec![0xee; 4]),
        // Evicts block 0 from the L1, which writes it back to the L2.
        Access::read(0x40, 4),
        Access::read(0x0, 4),
    ];
    let mut system = System::new(&config, vec![accesses]).unwrap();
    system.run().unwrap();

    assert_eq!(system.l1().stats().writebacks, 2);
    assert!(system.l2().stats().absorbed >= 1);
    assert_eq!(system.memory().stats().writebacks, 0);

    let reads = reads(&system, 0);
    assert_eq!(reads[1], (0x0, vec![0xee; 4]));
}

#[test]
fn bunkered_aliases_read_stale_data() {
    let mut config = small_config();
    config.l2.bunker = Some(BunkerConfig { stride: 4, radix: 2, range: None });

    let mut system = System::new(&config, vec![vec![
        Access::read(0x0, 8),
        // Block 4 shares a slot with block 0.
        Access::read(0x100, 8),
    ]]).unwrap();

    system.functional_write(0x0, vec![1; 8]).unwrap();
    system.functional_write(0x100, vec![2; 8]).unwrap();
    system.run().unwrap();

    let reads = reads(&system, 0);
    assert_eq!(reads[0].1, vec![1; 8]);
    assert_eq!(reads[1].1, vec![1; 8]);

    assert_eq!(system.l2().stats().hits, 1);
    let directory = system.l2().bunker().unwrap().directory();
    assert!(directory.contains(0x0));
    assert!(directory.contains(0x100));
}

#[test]
fn bunker_range_leaves_other_blocks_alone() {
    let mut config = small_config();
    config.l2.bunker = Some(BunkerConfig {
        stride: 4,
        radix: 2,
        range: Some(AddrRange::new(0x1000, 0x1fff)),
    });

    let mut system = System::new(&config, vec![vec![
        Access::read(0x0, 8),
        Access::read(0x100, 8),
    ]]).unwrap();

    system.functional_write(0x100, vec![2; 8]).unwrap();
    system.run().unwrap();

    let reads = reads(&system, 0);
    assert_eq!(reads[1].1, vec![2; 8]);
    assert_eq!(system.l2().stats().hits, 0);
    assert!(system.l2().bunker().unwrap().directory().is_empty());
}

#[test]
fn refused_requester_retries() {
    let config = small_config();
    let workloads = (0..2)
        .map(|cpu| (0..8).map(|i| Access::read(cpu * 0x1000 + i * 0x40, 8)).collect())
        .collect();

    let mut system = System::new(&config, workloads).unwrap();
    system.run().unwrap();

    for cpu in system.requesters() {
        assert!(cpu.is_done());
        assert_eq!(cpu.completions().len(), 8);
    }
    // Both issue at cycle 0, so the one behind has to be refused.
    assert!(system.requesters()[1].stats().refused >= 1);
}

#[test]
fn runs_are_deterministic() {
    let workload = |seed: u64| -> Vec<Access> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..200)
            .map(|_| {
                let addr = rng.gen_range(0..0x2000_u64) & !0x7;
                if rng.gen_bool(0.3) {
                    Access::write(addr, vec![rng.gen(); 8])
                } else {
                    Access::read(addr, 8)
                }
            })
            .collect()
    };

    let run = || {
        let mut system = System::new(&small_config(), vec![workload(1), workload(2)]).unwrap();
        let end = system.run().unwrap();
        let completions: Vec<_> = system
            .requesters()
            .iter()
            .map(|cpu| cpu.completions().to_vec())
            .collect();
        (end, completions, system.l1().stats().hits, system.l2().stats().evictions)
    };

    assert_eq!(run(), run());
}

#[test]
fn run_until_stops_at_limit() {
    let mut system = System::new(&SystemConfig::default(), vec![vec![
        Access::read(0x0, 8),
        Access::read(0x40, 8),
    ]]).unwrap();

    assert_eq!(system.run_until(10), Ok(StopReason::Time));
    assert_eq!(system.cycle(), 10);
    assert_eq!(system.run_until(1000), Ok(StopReason::Done));
}

#[test]
fn out_of_memory_access_is_fatal() {
    let mut system = System::new(&small_config(), vec![vec![Access::read(0x10_0000, 8)]]).unwrap();
    assert_eq!(system.run(), Err(Error::Unmapped(0x10_0000)));
}

#[test]
fn oversized_access_is_rejected() {
    let huge = System::new(&SystemConfig::default(), vec![vec![Access::read(0x0, 1 << 40)]]);
    assert!(matches!(
        huge,
        Err(Error::SpanningAccessUnsupported { addr: 0x0, size }) if size == 1 << 40,
    ));

    let straddling = System::new(&small_config(), vec![vec![
        Access::read(0x0, 8),
        Access::write(0x7c, vec![1; 8]),
    ]]);
    assert!(matches!(
        straddling,
        Err(Error::SpanningAccessUnsupported { addr: 0x7c, size: 8 }),
    ));
}

#[test]
fn writebacks_outlive_the_requesters() {
    let mut config = small_config();
    config.l1.size = 64;
    let mut system = System::new(&config, vec![vec![
        Access::write(0x0, vec![7; 8]),
        Access::read(0x40, 8),
    ]]).unwrap();

    while !system.is_done() {
        assert!(system.step().unwrap());
    }

    // The eviction of 0x0 is still on its way to the L2.
    assert!(!system.is_idle());
    assert_eq!(system.l2().stats().absorbed, 0);
    system.run().unwrap();
    assert!(system.is_idle());
    assert_eq!(system.l2().stats().absorbed, 1);
    assert_eq!(system.functional_read(0x0, 8).unwrap(), vec![7; 8]);
}

#[test]
fn ranges_come_from_memory() {
    let system = System::new(&small_config(), vec![vec![]]).unwrap();
    let range = AddrRange::new(0, 0xf_ffff);
    assert_eq!(system.l2().addr_ranges(), &[range]);
    assert_eq!(system.l1().addr_ranges(), &[range]);
}

#[test]
fn rejects_bad_config() {
    let mut config = small_config();
    config.block_size = 0;
    assert!(System::new(&config, vec![vec![]]).is_err());
    assert!(System::new(&small_config(), vec![]).is_err());
}
