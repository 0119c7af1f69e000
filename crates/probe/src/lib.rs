//! Host resource probes for the ACT point-cloud node.
//!
//! Implements the [`pointcloud::ResourceProbe`] and [`pointcloud::GpuProbe`]
//! traits:
//!
//! - [`SysinfoResourceProbe`]: reads OS virtual-memory statistics and the CPU
//!   count through `sysinfo` on every call, combined with a pluggable GPU probe.
//! - [`NvidiaSmiGpuProbe`]: best-effort NVIDIA detection via `nvidia-smi`.
//! - [`NoGpuProbe`]: always reports no GPU.
//! - [`FixedResourceProbe`]: a constant snapshot, used to reproduce
//!   resource-limited hosts and in tests.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** The [`pointcloud`] crate sees only the traits.

mod gpu;
mod system;

pub use gpu::{NoGpuProbe, NvidiaSmiGpuProbe};
pub use system::{FixedResourceProbe, SysinfoResourceProbe};
