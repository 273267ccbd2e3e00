//! Fabricated snapshot source for demo deployments.
//!
//! Serverless installs have no supervisor to ask, so the dashboard runs the
//! same engine against a plausible synthetic fleet.
use std::time::Instant;

use chrono::Utc;
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{Collection, ProcessDataSource, ProcessSnapshot, ProcessStatus, SourceError};

/// Baseline profile for one fabricated worker.
struct Worker {
    id: u32,
    name: &'static str,
    base_cpu: f64,
    base_memory: u64,
    restart_count: u64,
    started: Instant,
    initial_uptime: u64,
}

const FLEET: &[(&str, f64, u64)] = &[
    ("api-server", 18.0, 160 * 1024 * 1024),
    ("worker", 35.0, 220 * 1024 * 1024),
    ("scheduler", 4.0, 64 * 1024 * 1024),
    ("websocket-gateway", 12.0, 128 * 1024 * 1024),
    ("mailer", 2.0, 48 * 1024 * 1024),
];

/// Generates plausible process snapshots without a supervisor.
pub struct SyntheticSource {
    rng: StdRng,
    workers: Vec<Worker>,
}

impl SyntheticSource {
    /// Creates a source with an entropy-derived seed.
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Creates a source with a fixed seed, for reproducible output.
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let now = Instant::now();
        let workers = FLEET
            .iter()
            .enumerate()
            .map(|(id, (name, base_cpu, base_memory))| Worker {
                id: id as u32,
                name,
                base_cpu: *base_cpu,
                base_memory: *base_memory,
                restart_count: rng.gen_range(0..3),
                started: now,
                initial_uptime: rng.gen_range(600..86_400),
            })
            .collect();

        Self { rng, workers }
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessDataSource for SyntheticSource {
    fn collect(&mut self) -> Result<Collection, SourceError> {
        let collected_at = Utc::now();
        let mut snapshots = Vec::with_capacity(self.workers.len());

        for worker in &mut self.workers {
            let restarted = self.rng.gen_bool(0.02);
            if restarted {
                worker.restart_count += 1;
                worker.started = Instant::now();
                worker.initial_uptime = 0;
            }

            let spike = self.rng.gen_bool(0.03);
            let jitter = self.rng.gen_range(0.7..1.3);
            let cpu_percent = if spike {
                self.rng.gen_range(85.0..140.0)
            } else {
                worker.base_cpu * jitter
            };
            let memory_bytes =
                (worker.base_memory as f64 * self.rng.gen_range(0.9..1.1)) as u64;

            let status = if restarted {
                ProcessStatus::WaitingRestart
            } else {
                ProcessStatus::Online
            };

            snapshots.push(ProcessSnapshot {
                process_id: worker.id.to_string(),
                name: worker.name.to_string(),
                status,
                cpu_percent,
                memory_bytes,
                uptime_seconds: worker.initial_uptime
                    + worker.started.elapsed().as_secs(),
                restart_count: worker.restart_count,
                collected_at,
            });
        }

        Ok(Collection {
            snapshots,
            skipped: 0,
        })
    }

    fn description(&self) -> &str {
        "synthetic fleet"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_the_whole_fleet() {
        let mut source = SyntheticSource::with_seed(7);
        let collection = source.collect().unwrap();
        assert_eq!(collection.snapshots.len(), FLEET.len());
        assert_eq!(collection.skipped, 0);
        for snapshot in &collection.snapshots {
            assert!(snapshot.cpu_percent >= 0.0);
            assert!(snapshot.memory_bytes > 0);
        }
    }

    #[test]
    fn fixed_seed_reproduces_metrics() {
        let mut a = SyntheticSource::with_seed(42);
        let mut b = SyntheticSource::with_seed(42);

        let left = a.collect().unwrap();
        let right = b.collect().unwrap();
        let left_cpu: Vec<f64> =
            left.snapshots.iter().map(|s| s.cpu_percent).collect();
        let right_cpu: Vec<f64> =
            right.snapshots.iter().map(|s| s.cpu_percent).collect();
        assert_eq!(left_cpu, right_cpu);
    }

    #[test]
    fn ids_are_stable_across_collections() {
        let mut source = SyntheticSource::with_seed(1);
        let first = source.collect().unwrap();
        let second = source.collect().unwrap();
        let ids = |c: &Collection| {
            c.snapshots
                .iter()
                .map(|s| s.process_id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }
}
