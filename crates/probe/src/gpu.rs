//! Best-effort GPU detection.

use std::process::Command;

use pointcloud::{GpuInfo, GpuProbe};
use tracing::debug;

const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

/// Reports no GPU.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGpuProbe;

impl GpuProbe for NoGpuProbe {
    fn detect(&self) -> Option<GpuInfo> {
        None
    }
}

/// Detects an NVIDIA GPU by querying `nvidia-smi`.
///
/// A missing binary, a non-zero exit status, or unparseable output all yield
/// `None`.
#[derive(Debug, Clone)]
pub struct NvidiaSmiGpuProbe {
    program: String,
}

impl NvidiaSmiGpuProbe {
    pub fn new() -> Self {
        Self::with_program("nvidia-smi")
    }

    /// Uses `program` instead of `nvidia-smi` from `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for NvidiaSmiGpuProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuProbe for NvidiaSmiGpuProbe {
    fn detect(&self) -> Option<GpuInfo> {
        let output = match Command::new(&self.program)
            .args([
                "--query-gpu=name,memory.total",
                "--format=csv,noheader,nounits",
            ])
            .output()
        {
            Ok(output) => output,
            Err(e) => {
                debug!(program = %self.program, error = %e, "GPU query unavailable");
                return None;
            }
        };
        if !output.status.success() {
            debug!(status = %output.status, "GPU query exited unsuccessfully");
            return None;
        }
        parse_query_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses the first `name, memory_mib` line of `nvidia-smi` CSV output.
fn parse_query_output(stdout: &str) -> Option<GpuInfo> {
    let line = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (name, memory) = line.rsplit_once(',')?;
    let mib: f64 = memory.trim().parse().ok()?;
    Some(GpuInfo {
        name: name.trim().to_string(),
        memory_bytes: mib * BYTES_PER_MIB,
    })
}
