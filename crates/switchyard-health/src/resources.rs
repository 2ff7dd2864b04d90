//! Host resource sampling.
//!
//! CPU, memory and disk utilisation of the machine running the checks. The
//! default sampler reads them through `sysinfo` on a blocking thread since a
//! CPU reading needs two refreshes a short interval apart.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;
use sysinfo::{CpuExt, DiskExt, System, SystemExt};
use switchyard_core::HealthStatus;

/// Utilisation percentages (0–100).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResourceUsage {
    pub cpu_percent: f64,
    pub memory_percent: f64,
    pub disk_percent: f64,
}

/// Healthy ceilings; above these a resource is degraded.
pub const CPU_HEALTHY_MAX: f64 = 80.0;
pub const MEMORY_HEALTHY_MAX: f64 = 85.0;
pub const DISK_HEALTHY_MAX: f64 = 90.0;
/// Above this any resource is unhealthy.
pub const RESOURCE_CRITICAL_MAX: f64 = 95.0;

impl ResourceUsage {
    /// Classify against the fixed thresholds.
    pub fn classify(&self) -> HealthStatus {
        let readings = [
            (self.cpu_percent, CPU_HEALTHY_MAX),
            (self.memory_percent, MEMORY_HEALTHY_MAX),
            (self.disk_percent, DISK_HEALTHY_MAX),
        ];
        if readings.iter().any(|(value, _)| *value > RESOURCE_CRITICAL_MAX) {
            HealthStatus::Unhealthy
        } else if readings.iter().any(|(value, healthy)| value >= healthy) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

pub type SampleFuture<'a> = Pin<Box<dyn Future<Output = Result<ResourceUsage, String>> + Send + 'a>>;

/// Source of host utilisation readings, injected for testability.
pub trait ResourceSampler: Send + Sync {
    fn sample(&self) -> SampleFuture<'_>;
}

/// Reads the local host through `sysinfo`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoSampler;

impl ResourceSampler for SysinfoSampler {
    fn sample(&self) -> SampleFuture<'_> {
        Box::pin(async {
            tokio::task::spawn_blocking(read_host)
                .await
                .map_err(|e| format!("resource sampler failed: {e}"))
        })
    }
}

fn read_host() -> ResourceUsage {
    let mut sys = System::new();

    sys.refresh_cpu();
    std::thread::sleep(System::MINIMUM_CPU_UPDATE_INTERVAL);
    sys.refresh_cpu();
    let cpu_percent = sys.global_cpu_info().cpu_usage() as f64;

    sys.refresh_memory();
    let memory_percent = percent(sys.used_memory(), sys.total_memory());

    sys.refresh_disks_list();
    let disk_percent = sys
        .disks()
        .iter()
        .filter(|d| d.total_space() > 0)
        .map(|d| used_percent(d.total_space(), d.available_space()))
        .fold(0.0, f64::max);

    ResourceUsage {
        cpu_percent,
        memory_percent,
        disk_percent,
    }
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64 * 100.0
    }
}

/// Share of `total` not available. Filesystems may report more available
/// space than total (quota, reserved blocks), which reads as 0%.
fn used_percent(total: u64, available: u64) -> f64 {
    percent(total.saturating_sub(available), total)
}

/// Always reports the same usage.
#[derive(Debug, Clone, Copy)]
pub struct FixedSampler(pub ResourceUsage);

impl FixedSampler {
    pub fn idle() -> Self {
        Self(ResourceUsage {
            cpu_percent: 5.0,
            memory_percent: 30.0,
            disk_percent: 40.0,
        })
    }
}

impl ResourceSampler for FixedSampler {
    fn sample(&self) -> SampleFuture<'_> {
        let usage = self.0;
        Box::pin(async move { Ok(usage) })
    }
}
