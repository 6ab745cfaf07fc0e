//! 容器生命周期
//!
//! 暂存目录 → 镜像构建 → 启动容器 → 等待就绪 → 读网络详情。
//! 失败路径的补偿（删容器、清暂存目录）也在这里

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::env::constants::{
    BUILD_TIMEOUT_SECS, CONTAINER_SERVICE_PORT, CONTAINER_WAIT_ATTEMPTS,
    CONTAINER_WAIT_BACKOFF_SECS,
};
use crate::domain::deploy::ContainerHandle;
use crate::infra::ssh::RemoteChannel;
use crate::services::payload;

use super::error::DeployError;

/// 在远端建暂存目录并写入全部载荷文件，返回目录路径
pub async fn stage_payload(
    channel: &mut RemoteChannel,
    model_id: &str,
    user_id: &str,
) -> Result<String, DeployError> {
    let deploy_id = uuid::Uuid::new_v4().simple().to_string();
    let temp_dir = format!("/tmp/deploy_{}", &deploy_id[..8]);
    info!(temp_dir = %temp_dir, "Creating staging directory on remote");

    channel
        .run(&format!("mkdir -p {}/app/auth", temp_dir))
        .await
        .map_err(|e| DeployError::Staging(e.to_string()))?;
    channel
        .run(&format!("mkdir -p {}/app/api", temp_dir))
        .await
        .map_err(|e| DeployError::Staging(e.to_string()))?;

    let files = payload::render_all(model_id, user_id)
        .map_err(|e| DeployError::Staging(format!("template rendering failed: {}", e)))?;

    for file in &files {
        let path = format!("{}/{}", temp_dir, file.relative_path);
        channel
            .write_file(&path, &file.content)
            .await
            .map_err(|e| DeployError::Staging(e.to_string()))?;
        info!(path = %path, "Staged payload file");
    }

    Ok(temp_dir)
}

/// 构建镜像并核实它真的存在
pub async fn build_image(
    channel: &mut RemoteChannel,
    temp_dir: &str,
    image_tag: &str,
) -> Result<(), DeployError> {
    info!(image_tag = %image_tag, "Building docker image on remote machine");

    let build_cmd = format!("cd {} && docker build -t {} .", temp_dir, image_tag);
    let build = channel
        .run_long(&build_cmd, Duration::from_secs(BUILD_TIMEOUT_SECS))
        .await
        .map_err(|e| DeployError::Build(e.to_string()))?;

    let check = channel
        .run(&format!("docker images {} --quiet", image_tag))
        .await
        .map_err(|e| DeployError::Build(e.to_string()))?;
    if check.stdout_trimmed().is_empty() {
        return Err(DeployError::Build(format!(
            "image `{}` missing after build; build output:\n{}",
            image_tag,
            tail_lines(&build.stdout, 20)
        )));
    }

    info!(image_tag = %image_tag, "Image built");
    Ok(())
}

/// 以 detached 模式启动容器，宿主机端口映射到容器服务端口
pub async fn launch_container(
    channel: &mut RemoteChannel,
    image_tag: &str,
    port: u16,
    hf_token: Option<&str>,
) -> Result<ContainerHandle, DeployError> {
    info!(port, "Starting container on remote");

    let command = run_command(image_tag, port, hf_token);
    let output = channel
        .run(&command)
        .await
        .map_err(|e| DeployError::Launch(e.to_string()))?;

    let id = output.stdout_trimmed().to_string();
    if id.is_empty() {
        return Err(DeployError::Launch(
            "docker run produced no container id".to_string(),
        ));
    }

    Ok(ContainerHandle { id, port })
}

fn run_command(image_tag: &str, port: u16, hf_token: Option<&str>) -> String {
    let token_flag = hf_token
        .map(|token| format!("-e HF_TOKEN={} ", token))
        .unwrap_or_default();
    format!(
        "docker run -d -p {}:{} {}{}",
        port, CONTAINER_SERVICE_PORT, token_flag, image_tag
    )
}

/// 轮询容器状态直到 running
///
/// exited 立刻取日志判死刑；预算内没等到 running 算启动超时
pub async fn await_ready(
    channel: &mut RemoteChannel,
    container_id: &str,
) -> Result<(), DeployError> {
    for attempt in 1..=CONTAINER_WAIT_ATTEMPTS {
        let status = channel
            .run(&format!(
                "docker inspect --format='{{{{.State.Status}}}}' {}",
                container_id
            ))
            .await;

        match status {
            Ok(output) => match output.stdout_trimmed() {
                "running" => {
                    info!(container_id = %container_id, "Container is running");
                    return Ok(());
                }
                "exited" => {
                    let logs = match channel
                        .run_unchecked(&format!("docker logs {} 2>&1", container_id))
                        .await
                    {
                        Ok(output) => output.stdout,
                        Err(_) => "<unavailable>".to_string(),
                    };
                    return Err(DeployError::Startup { logs });
                }
                other => {
                    info!(container_id = %container_id, status = %other, attempt, "Container not ready yet");
                }
            },
            Err(e) => {
                if attempt == CONTAINER_WAIT_ATTEMPTS {
                    return Err(e.into());
                }
                warn!(attempt, error = %e, "Container status check failed, retrying");
            }
        }

        if attempt < CONTAINER_WAIT_ATTEMPTS {
            sleep(Duration::from_secs(CONTAINER_WAIT_BACKOFF_SECS)).await;
        }
    }

    Err(DeployError::Timeout {
        attempts: CONTAINER_WAIT_ATTEMPTS,
    })
}

/// 容器网络详情（docker inspect 的 NetworkSettings JSON）
pub async fn inspect_network(
    channel: &mut RemoteChannel,
    container_id: &str,
) -> Result<serde_json::Value, DeployError> {
    let output = channel
        .run(&format!(
            "docker inspect --format='{{{{json .NetworkSettings}}}}' {}",
            container_id
        ))
        .await?;
    Ok(parse_network_details(output.stdout_trimmed()))
}

/// inspect 输出原则上是 JSON；解析不动时按原文字符串记录
fn parse_network_details(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// 清理暂存目录，失败只告警
pub async fn cleanup_staging(channel: &mut RemoteChannel, temp_dir: &str) {
    info!(temp_dir = %temp_dir, "Cleaning up staging directory");
    if let Err(e) = channel.run(&format!("rm -rf {}", temp_dir)).await {
        warn!(temp_dir = %temp_dir, error = %e, "Failed to clean up staging directory");
    }
}

/// 补偿：强删容器，失败只告警
pub async fn remove_container(channel: &mut RemoteChannel, container_id: &str) {
    warn!(container_id = %container_id, "Removing container after failed deployment");
    if let Err(e) = channel
        .run(&format!("docker rm -f {}", container_id))
        .await
    {
        warn!(container_id = %container_id, error = %e, "Failed to remove container");
    }
}

fn tail_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_command_without_token() {
        assert_eq!(
            run_command("user1-gpt2:cafebabe", 8042, None),
            "docker run -d -p 8042:8000 user1-gpt2:cafebabe"
        );
    }

    #[test]
    fn test_run_command_with_token() {
        assert_eq!(
            run_command("user1-gpt2:cafebabe", 8042, Some("hf_abc")),
            "docker run -d -p 8042:8000 -e HF_TOKEN=hf_abc user1-gpt2:cafebabe"
        );
    }

    #[test]
    fn test_parse_network_details_json() {
        let value = parse_network_details(r#"{"Ports":{"8000/tcp":null}}"#);
        assert!(value.get("Ports").is_some());
    }

    #[test]
    fn test_parse_network_details_falls_back_to_raw() {
        let value = parse_network_details("not json at all");
        assert_eq!(value, serde_json::Value::String("not json at all".into()));
    }

    #[test]
    fn test_tail_lines() {
        let text = "a\nb\nc\nd";
        assert_eq!(tail_lines(text, 2), "c\nd");
        assert_eq!(tail_lines(text, 10), "a\nb\nc\nd");
        assert_eq!(tail_lines("", 3), "");
    }
}
