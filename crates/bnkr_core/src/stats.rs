//! Statistics gathered by a cache.

use crate::Cycle;

const HISTOGRAM_BUCKETS: usize = 16;

#[derive(Clone, Debug, Default)]
pub struct Stats {
    pub hits: u64,
    pub misses: u64,
    /// Blocks evicted to make room for new ones.
    pub evictions: u64,
    /// Writeback packets sent downstream. A bunker eviction can send more than one.
    pub writebacks: u64,
    /// Writebacks from upstream absorbed by this cache.
    pub absorbed: u64,
    /// Sub-block accesses that had to be upgraded to a full block fetch.
    pub upgrades: u64,
    /// Cycles from a miss until the block arrived.
    pub miss_latency: Histogram,
}

impl Stats {
    pub fn accesses(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn hit_ratio(&self) -> f64 {
        match self.accesses() {
            0 => 0.0,
            total => self.hits as f64 / total as f64,
        }
    }
}

/// Histogram with a fixed number of equally sized buckets. When a sample doesn't fit, the bucket
/// size is doubled and neighbouring buckets are merged.
#[derive(Clone, Debug)]
pub struct Histogram {
    buckets: [u64; HISTOGRAM_BUCKETS],
    bucket_size: Cycle,
    samples: u64,
    sum: Cycle,
    min: Cycle,
    max: Cycle,
}

impl Default for Histogram {
    fn default() -> Self {
        Self {
            buckets: [0; HISTOGRAM_BUCKETS],
            bucket_size: 1,
            samples: 0,
            sum: 0,
            min: Cycle::MAX,
            max: 0,
        }
    }
}

impl Histogram {
    pub fn sample(&mut self, val: Cycle) {
        while val >= self.bucket_size * HISTOGRAM_BUCKETS as Cycle {
            self.grow();
        }
        self.buckets[(val / self.bucket_size) as usize] += 1;
        self.samples += 1;
        self.sum += val;
        self.min = self.min.min(val);
        self.max = self.max.max(val);
    }

    fn grow(&mut self) {
        for i in 0..HISTOGRAM_BUCKETS / 2 {
            self.buckets[i] = self.buckets[2 * i] + self.buckets[2 * i + 1];
        }
        for bucket in &mut self.buckets[HISTOGRAM_BUCKETS / 2..] {
            *bucket = 0;
        }
        self.bucket_size *= 2;
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }

    pub fn mean(&self) -> f64 {
        match self.samples {
            0 => 0.0,
            n => self.sum as f64 / n as f64,
        }
    }

    pub fn min(&self) -> Option<Cycle> {
        (self.samples > 0).then(|| self.min)
    }

    pub fn max(&self) -> Option<Cycle> {
        (self.samples > 0).then(|| self.max)
    }

    pub fn bucket_size(&self) -> Cycle {
        self.bucket_size
    }

    /// Iterate over `(start, count)` for each bucket.
    pub fn buckets(&self) -> impl Iterator<Item = (Cycle, u64)> + '_ {
        self.buckets
            .iter()
            .enumerate()
            .map(|(i, count)| (i as Cycle * self.bucket_size, *count))
    }
}
