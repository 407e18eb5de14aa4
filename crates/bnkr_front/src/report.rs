use bnkr_core::{CacheController, Cycle, Stats, System};

use std::fmt::{self, Write};

/// Write a text report of everything the hierarchy measured.
pub fn report(system: &System, cycles: Cycle) -> Result<String, fmt::Error> {
    let mut out = String::new();

    writeln!(out, "cycles: {cycles}")?;
    writeln!(out)?;

    cache(&mut out, system.l1())?;
    cache(&mut out, system.l2())?;

    let mem = system.memory().stats();
    writeln!(out, "memory")?;
    writeln!(out, "  reads:       {}", mem.reads)?;
    writeln!(out, "  writes:      {}", mem.writes)?;
    writeln!(out, "  writebacks:  {}", mem.writebacks)?;
    writeln!(out)?;

    for cpu in system.requesters() {
        let stats = cpu.stats();
        writeln!(out, "requester {}", cpu.port())?;
        writeln!(out, "  completed:   {}", stats.completed)?;
        writeln!(out, "  refused:     {}", stats.refused)?;
        writeln!(out, "  latency:     {:.2}", stats.mean_latency())?;
    }

    Ok(out)
}

fn cache(out: &mut String, cache: &CacheController) -> fmt::Result {
    let stats = cache.stats();

    writeln!(out, "{}", cache.level())?;
    writeln!(out, "  hits:        {}", stats.hits)?;
    writeln!(out, "  misses:      {}", stats.misses)?;
    writeln!(out, "  hit ratio:   {:.4}", stats.hit_ratio())?;
    writeln!(out, "  evictions:   {}", stats.evictions)?;
    writeln!(out, "  writebacks:  {}", stats.writebacks)?;
    writeln!(out, "  absorbed:    {}", stats.absorbed)?;
    writeln!(out, "  upgrades:    {}", stats.upgrades)?;

    if let Some(bunker) = cache.bunker() {
        let remap = bunker.remapper();
        writeln!(
            out,
            "  bunker:      stride {} radix {}, {} aliases resident",
            remap.stride(),
            remap.radix(),
            bunker.directory().len(),
        )?;
    }

    miss_latency(out, stats)?;
    writeln!(out)
}

fn miss_latency(out: &mut String, stats: &Stats) -> fmt::Result {
    let hist = &stats.miss_latency;
    let (Some(min), Some(max)) = (hist.min(), hist.max()) else {
        return writeln!(out, "  miss latency: -");
    };
    writeln!(out, "  miss latency: mean {:.2}, min {min}, max {max}", hist.mean())?;
    let size = hist.bucket_size();
    for (start, count) in hist.buckets().filter(|(_, count)| *count > 0) {
        writeln!(out, "    {:>6}-{:<6} {count}", start, start + size - 1)?;
    }
    Ok(())
}
