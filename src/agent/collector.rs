use chrono::Utc;
use sysinfo::{Disks, System};

use crate::MetricSample;

/// Basic usage percentages plus additional named samples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemSample {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub metrics: Vec<MetricSample>,
}

/// Source of host metrics for heartbeats
pub trait MetricSampler: Send {
    fn sample(&mut self) -> SystemSample;
}

/// Samples the local machine through `sysinfo`
pub struct SystemSampler {
    system: System,
    disks: Disks,
}

impl SystemSampler {
    pub fn new() -> Self {
        let mut system = System::new();
        // CPU usage is a delta between two refreshes; prime the first one.
        system.refresh_cpu_all();
        system.refresh_memory();

        Self {
            system,
            disks: Disks::new_with_refreshed_list(),
        }
    }
}

impl Default for SystemSampler {
    fn default() -> Self {
        Self::new()
    }
}

fn percentage(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

impl MetricSampler for SystemSampler {
    fn sample(&mut self) -> SystemSample {
        self.system.refresh_cpu_all();
        self.system.refresh_memory();
        self.disks.refresh(true);

        let now = Utc::now();

        let memory_total = self.system.total_memory();
        let memory_used = self.system.used_memory();

        let (disk_total, disk_available) = self
            .disks
            .iter()
            .fold((0u64, 0u64), |(total, available), disk| {
                (total + disk.total_space(), available + disk.available_space())
            });
        let disk_used = disk_total.saturating_sub(disk_available);

        let load = System::load_average();

        let metrics = [
            ("memory_total", memory_total as f64),
            ("memory_used", memory_used as f64),
            ("disk_total", disk_total as f64),
            ("disk_used", disk_used as f64),
            ("load1", load.one),
            ("load5", load.five),
            ("load15", load.fifteen),
        ]
        .into_iter()
        .map(|(name, value)| MetricSample::new(name, value, now))
        .collect();

        SystemSample {
            cpu_usage: f64::from(self.system.global_cpu_usage()),
            memory_usage: percentage(memory_used, memory_total),
            disk_usage: percentage(disk_used, disk_total),
            metrics,
        }
    }
}
