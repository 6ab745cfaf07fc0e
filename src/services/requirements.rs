//! 宿主机硬件校验
//!
//! 对照模型的硬件要求检查本机 CPU / 内存 / 显存，
//! 显存通过 nvidia-smi 探测，探测失败按无 GPU 处理

use sysinfo::{CpuRefreshKind, MemoryRefreshKind, RefreshKind, System};
use tokio::process::Command;
use tracing::debug;

use crate::domain::model::{HardwareCheck, HardwareRequirements};

/// 按模型要求检查本机硬件
pub async fn check_hardware_requirements(requirements: &HardwareRequirements) -> HardwareCheck {
    let mut sys = System::new_with_specifics(
        RefreshKind::new()
            .with_cpu(CpuRefreshKind::everything())
            .with_memory(MemoryRefreshKind::everything()),
    );
    sys.refresh_cpu_all();

    let cpu_cores = sys.cpus().len() as u32;
    let ram_gb = sys.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0;
    let gpu_memory_gb = probe_gpu_memory_gb().await;

    debug!(
        cpu_cores,
        ram_gb, gpu_memory_gb, "Host hardware probed for requirements check"
    );

    HardwareCheck {
        cpu: cpu_cores >= requirements.cpu_cores,
        ram: ram_gb >= requirements.ram_gb as f64,
        gpu: gpu_memory_gb >= requirements.gpu_memory_gb as f64,
    }
}

/// 所有 GPU 的显存总量（GB）；没有 nvidia-smi 或执行失败时为 0
async fn probe_gpu_memory_gb() -> f64 {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=memory.total", "--format=csv,noheader,nounits"])
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => {
            let total_mib: f64 = String::from_utf8_lossy(&out.stdout)
                .lines()
                .filter_map(|line| line.trim().parse::<f64>().ok())
                .sum();
            total_mib / 1024.0
        }
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_zero_requirements_always_pass_cpu_and_ram() {
        let requirements = HardwareRequirements {
            cpu_cores: 0,
            ram_gb: 0,
            storage_gb: 0.0,
            gpu_memory_gb: 0,
        };
        let check = check_hardware_requirements(&requirements).await;
        assert!(check.cpu);
        assert!(check.ram);
        assert!(check.gpu);
    }

    #[tokio::test]
    async fn test_absurd_requirements_fail() {
        let requirements = HardwareRequirements {
            cpu_cores: 100_000,
            ram_gb: 1_000_000,
            storage_gb: 0.0,
            gpu_memory_gb: 1_000_000,
        };
        let check = check_hardware_requirements(&requirements).await;
        assert!(!check.cpu);
        assert!(!check.ram);
        assert!(!check.gpu);
    }
}
