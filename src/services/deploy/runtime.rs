//! 远端 docker 运行时检查
//!
//! 部署前确认守护进程可用；探测到守护进程没起来时，
//! 提权启动一次并复核，仍不可用才算硬失败

use tracing::{info, warn};

use crate::domain::remote::RemoteCredentials;
use crate::infra::ssh::{CommandOutput, RemoteChannel};

use super::error::DeployError;

/// docker CLI 找不到守护进程时的输出标记
const DAEMON_UNREACHABLE_MARKER: &str = "Cannot connect to the Docker daemon";

/// 守护进程不可达的判定：任一输出流带标记即算
fn daemon_unreachable(output: &CommandOutput) -> bool {
    output.stdout.contains(DAEMON_UNREACHABLE_MARKER)
        || output.stderr.contains(DAEMON_UNREACHABLE_MARKER)
}

/// 确认远端 docker 可用，必要时启动守护进程
pub async fn ensure_docker(
    channel: &mut RemoteChannel,
    credentials: &RemoteCredentials,
) -> Result<(), DeployError> {
    info!("Verifying docker service status on remote machine");

    let probe = channel.run_unchecked("docker ps").await?;
    if probe.success() {
        return Ok(());
    }

    if !daemon_unreachable(&probe) {
        // docker 不在 PATH、权限不足等，启动守护进程也救不了
        let detail = if probe.stderr.trim().is_empty() {
            probe.stdout.trim().to_string()
        } else {
            probe.stderr.trim().to_string()
        };
        return Err(DeployError::Runtime(format!(
            "docker probe failed (exit {}): {}",
            probe.exit_code, detail
        )));
    }

    warn!("Docker daemon not running, attempting to start it");
    let start = channel
        .run_unchecked(&credentials.sudo("systemctl start docker"))
        .await?;
    if !start.success() {
        return Err(DeployError::Runtime(format!(
            "failed to start docker: {}",
            start.stderr.trim()
        )));
    }

    let recheck = channel.run_unchecked("docker ps").await?;
    if recheck.success() {
        info!("Docker daemon started");
        return Ok(());
    }

    Err(DeployError::Runtime(
        "docker daemon did not come up after systemctl start".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(stdout: &str, stderr: &str, exit_code: i32) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
        }
    }

    #[test]
    fn test_daemon_unreachable_detected_on_either_stream() {
        let err = "Cannot connect to the Docker daemon at unix:///var/run/docker.sock. \
                   Is the docker daemon running?";
        assert!(daemon_unreachable(&output("", err, 1)));
        assert!(daemon_unreachable(&output(err, "", 1)));
    }

    #[test]
    fn test_healthy_probe_is_not_daemon_unreachable() {
        let ps = "CONTAINER ID   IMAGE   COMMAND   CREATED   STATUS   PORTS   NAMES";
        assert!(!daemon_unreachable(&output(ps, "", 0)));
    }

    #[test]
    fn test_missing_binary_is_not_daemon_unreachable() {
        assert!(!daemon_unreachable(&output(
            "",
            "bash: docker: command not found",
            127
        )));
    }
}
