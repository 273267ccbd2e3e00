//! Host-level metrics attached to status summaries.
use serde::{Deserialize, Serialize};
use sysinfo::System;

/// One sample of the host the supervised fleet runs on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemSnapshot {
    /// Host name, when the platform exposes one.
    pub hostname: Option<String>,
    /// Logical CPU count.
    pub cpu_count: usize,
    /// 1-minute load average.
    pub load_one: f64,
    /// 5-minute load average.
    pub load_five: f64,
    /// 15-minute load average.
    pub load_fifteen: f64,
    /// Total physical memory in bytes.
    pub total_memory_bytes: u64,
    /// Used physical memory in bytes.
    pub used_memory_bytes: u64,
    /// Host uptime in seconds.
    pub uptime_seconds: u64,
}

/// Samples the host. Cheap enough to run once per collection cycle.
pub fn snapshot() -> SystemSnapshot {
    let mut system = System::new();
    system.refresh_memory();
    system.refresh_cpu_usage();

    let load = System::load_average();

    SystemSnapshot {
        hostname: System::host_name(),
        cpu_count: system.cpus().len(),
        load_one: load.one,
        load_five: load.five,
        load_fifteen: load.fifteen,
        total_memory_bytes: system.total_memory(),
        used_memory_bytes: system.used_memory(),
        uptime_seconds: System::uptime(),
    }
}
