//! Host CPU and memory counters

use crate::models::HostSnapshot;
use chrono::Utc;
use sysinfo::System;
use tracing::debug;

/// Read the host's CPU topology and memory counters
pub fn read_host() -> HostSnapshot {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu();

    let cpu_logical_threads = sys.cpus().len();
    let cpu_physical_cores = sys.physical_core_count();

    // sysinfo reports 0 when the frequency is not exposed
    let cpu_frequency_mhz = sys
        .cpus()
        .first()
        .map(|cpu| cpu.frequency())
        .filter(|mhz| *mhz > 0);

    let snapshot = from_counters(
        cpu_physical_cores,
        cpu_logical_threads,
        cpu_frequency_mhz,
        sys.total_memory(),
        sys.available_memory(),
    );

    debug!(
        physical_cores = ?snapshot.cpu_physical_cores,
        logical_threads = snapshot.cpu_logical_threads,
        mem_percent_used = snapshot.mem_percent_used,
        "Read host snapshot"
    );

    snapshot
}

/// Build a snapshot from raw counters
pub(crate) fn from_counters(
    cpu_physical_cores: Option<usize>,
    cpu_logical_threads: usize,
    cpu_frequency_mhz: Option<u64>,
    mem_total_bytes: u64,
    mem_available_bytes: u64,
) -> HostSnapshot {
    let mem_available_bytes = mem_available_bytes.min(mem_total_bytes);
    let mem_used_bytes = mem_total_bytes - mem_available_bytes;

    let mem_percent_used = if mem_total_bytes > 0 {
        mem_used_bytes as f64 / mem_total_bytes as f64 * 100.0
    } else {
        0.0
    };

    HostSnapshot {
        cpu_physical_cores,
        cpu_logical_threads,
        cpu_frequency_mhz,
        mem_total_bytes,
        mem_available_bytes,
        mem_used_bytes,
        mem_percent_used,
        captured_at: Utc::now(),
    }
}
