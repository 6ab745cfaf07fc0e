//! 部署后日志跟读
//!
//! 部署收尾后在独立通道上跟读容器日志一小段时间，方便排查冷启动问题。
//! 彻底 fire-and-forget：任何失败只记日志，不影响已完成的部署

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::env::constants::{LOG_STREAM_INTERVAL_SECS, LOG_STREAM_WINDOW_SECS};
use crate::domain::remote::RemoteCredentials;
use crate::infra::ssh::RemoteChannel;

/// 在后台跟读容器日志；服务关闭时提前退出
pub fn spawn_log_streaming(
    credentials: RemoteCredentials,
    container_id: String,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        stream_logs(
            credentials,
            container_id,
            Duration::from_secs(LOG_STREAM_WINDOW_SECS),
            Duration::from_secs(LOG_STREAM_INTERVAL_SECS),
            shutdown,
        )
        .await;
    })
}

async fn stream_logs(
    credentials: RemoteCredentials,
    container_id: String,
    window: Duration,
    interval: Duration,
    shutdown: CancellationToken,
) {
    info!(container_id = %container_id, "Starting log streaming");

    // 部署通道已经关了，日志走自己的连接
    let mut channel = match RemoteChannel::connect(&credentials).await {
        Ok(channel) => channel,
        Err(e) => {
            error!(error = %e, "Failed to establish log streaming channel");
            return;
        }
    };

    let deadline = Instant::now() + window;
    while Instant::now() < deadline && !shutdown.is_cancelled() {
        match channel
            .run_unchecked(&format!("docker logs {} 2>&1", container_id))
            .await
        {
            Ok(output) if output.success() => {
                info!(container_id = %container_id, "Container logs:\n{}", output.stdout);
            }
            Ok(output) => {
                warn!(
                    container_id = %container_id,
                    exit_code = output.exit_code,
                    "docker logs failed: {}",
                    output.stdout_trimmed()
                );
            }
            Err(e) => {
                error!(container_id = %container_id, error = %e, "Error fetching container logs");
            }
        }

        tokio::select! {
            _ = sleep(interval) => {}
            _ = shutdown.cancelled() => break,
        }
    }

    channel.close().await;
    info!(container_id = %container_id, "Log streaming window closed");
}
