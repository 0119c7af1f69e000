//! Memory and CPU probing.

use pointcloud::{GpuInfo, GpuProbe, ResourceProbe, SystemResources, GIB};
use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tracing::trace;

use crate::gpu::NoGpuProbe;

/// Live probe backed by `sysinfo`.
///
/// Memory and CPUs are refreshed on every [`ResourceProbe::probe`] call so
/// the snapshot reflects the instantaneous state of the host. The GPU is
/// detected once at construction: the query may spawn a process and the
/// answer does not change while the node runs.
pub struct SysinfoResourceProbe {
    gpu: Option<GpuInfo>,
}

impl SysinfoResourceProbe {
    /// Creates a probe, running `gpu` detection once.
    pub fn new(gpu: Box<dyn GpuProbe>) -> Self {
        let gpu = gpu.detect();
        trace!(gpu = ?gpu.as_ref().map(|g| &g.name), "detected gpu");
        Self { gpu }
    }

    /// Creates a probe that never reports a GPU.
    pub fn without_gpu() -> Self {
        Self::new(Box::new(NoGpuProbe))
    }
}

impl Default for SysinfoResourceProbe {
    fn default() -> Self {
        Self::without_gpu()
    }
}

impl ResourceProbe for SysinfoResourceProbe {
    fn probe(&self) -> SystemResources {
        let system = System::new_with_specifics(
            RefreshKind::new()
                .with_memory(MemoryRefreshKind::everything())
                .with_cpu(CpuRefreshKind::new()),
        );

        let cpu_count = match system.cpus().len() {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        };
        let resources = SystemResources::new(
            system.total_memory() as f64,
            system.available_memory() as f64,
            cpu_count,
            self.gpu.as_ref(),
        );

        trace!(
            total_gib = resources.total_memory_bytes / GIB,
            available_gib = resources.available_memory_bytes / GIB,
            cpu_count = resources.cpu_count,
            has_gpu = resources.has_gpu,
            "probed host resources"
        );
        resources
    }
}

/// Returns the same snapshot on every call.
#[derive(Debug, Clone)]
pub struct FixedResourceProbe {
    resources: SystemResources,
}

impl FixedResourceProbe {
    pub fn new(resources: SystemResources) -> Self {
        Self { resources }
    }

    /// A host with `available_gib` free, 16 GiB (or more) total, 4 CPUs and no GPU.
    pub fn with_available_gib(available_gib: f64) -> Self {
        let available = available_gib * GIB;
        Self::new(SystemResources::new(
            available.max(16.0 * GIB),
            available,
            4,
            None,
        ))
    }
}

impl ResourceProbe for FixedResourceProbe {
    fn probe(&self) -> SystemResources {
        self.resources.clone()
    }
}
