//! Lightweight process statistics from procfs. Unavailable values are
//! `None` on platforms without `/proc`.

use std::fs;
use std::time::Instant;

use serde::{Deserialize, Serialize};

const PAGE_SIZE: f64 = 4096.0;
const CLOCK_TICKS: f64 = 100.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HostStats {
    /// Resident set size in megabytes.
    pub memory_mb: Option<f64>,
    /// Process CPU time since the previous sample, as a percentage of wall time.
    pub cpu_percent: Option<f64>,
    pub threads: Option<u64>,
}

/// Samples [`HostStats`]; keeps the previous CPU reading for deltas.
#[derive(Debug, Default)]
pub struct HostSampler {
    last_cpu: Option<(Instant, f64)>,
}

impl HostSampler {
    pub fn sample(&mut self) -> HostStats {
        let stat = fs::read_to_string("/proc/self/stat").ok();
        let fields = stat.as_deref().and_then(stat_fields);
        let now = Instant::now();

        let cpu_percent = fields.and_then(|(cpu_secs, _)| {
            let previous = self.last_cpu.replace((now, cpu_secs));
            let (then, before) = previous?;
            let wall = now.duration_since(then).as_secs_f64();
            (wall > 0.0).then(|| ((cpu_secs - before) / wall * 100.0).max(0.0))
        });

        HostStats {
            memory_mb: resident_mb(),
            cpu_percent,
            threads: fields.map(|(_, threads)| threads),
        }
    }
}

fn resident_mb() -> Option<f64> {
    let statm = fs::read_to_string("/proc/self/statm").ok()?;
    let pages: f64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    Some(pages * PAGE_SIZE / (1024.0 * 1024.0))
}

/// `(utime + stime in seconds, thread count)` from a `/proc/<pid>/stat` line.
fn stat_fields(stat: &str) -> Option<(f64, u64)> {
    // The command name may contain spaces; fields resume after its `)`.
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // `rest` starts at field 3 (state); utime is 14, stime 15, threads 20.
    let utime: f64 = fields.get(11)?.parse().ok()?;
    let stime: f64 = fields.get(12)?.parse().ok()?;
    let threads: u64 = fields.get(17)?.parse().ok()?;
    Some(((utime + stime) / CLOCK_TICKS, threads))
}
