//! 部署服务模块
//!
//! 一次部署是一条线性流水线：连接 → 运行时检查 → 构建启动 → 等待就绪 →
//! 隧道（软失败） → 落盘（软失败） → 关通道。
//! 通道保证关闭；构建/启动阶段失败会补偿清理容器和暂存目录

pub mod container;
pub mod error;
pub mod ports;
pub mod runtime;
pub mod stream;

pub use error::DeployError;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::domain::deploy::{
    image_tag, safe_model_id, ContainerHandle, DeployPhase, DeploymentRequest, DeploymentResult,
};
use crate::infra::ssh::RemoteChannel;
use crate::services::tunnel::TunnelProvisioner;
use crate::state::AppState;

/// 执行一次完整部署
///
/// 这是部署的主入口点；返回前一定把通道关掉、把进行中登记清掉
pub async fn execute(
    state: Arc<AppState>,
    request: DeploymentRequest,
) -> Result<DeploymentResult, DeployError> {
    info!(
        model_id = %request.model_id,
        user_id = %request.user_id,
        "Deploying model"
    );

    // 未知模型连边都不该碰
    let model_type = state
        .registry
        .model_type(&request.model_id)
        .ok_or_else(|| DeployError::UnknownModel(request.model_id.clone()))?
        .to_string();
    info!(model_type = %model_type, "Model type found");

    let key = format!(
        "{}-{}",
        request.user_id,
        safe_model_id(&request.model_id)
    );
    state.begin_deploy(&key).await;

    let mut channel = match RemoteChannel::connect(&request.ssh_config).await {
        Ok(channel) => {
            state.advance_phase(&key, DeployPhase::Connected).await;
            channel
        }
        Err(e) => {
            state.finish_deploy(&key).await;
            return Err(DeployError::Connection(e.to_string()));
        }
    };

    let result = pipeline(&state, &request, &mut channel, &key).await;

    // 无论成败通道都要关
    channel.close().await;
    state.advance_phase(&key, DeployPhase::Closed).await;
    state.finish_deploy(&key).await;

    match &result {
        Ok(outcome) => info!(
            container_id = %outcome.container_id,
            port = outcome.port,
            tunnel = outcome.tunnel_url.as_deref().unwrap_or("-"),
            "Deployment successful"
        ),
        Err(e) => error!(error = %e, "Deployment failed"),
    }

    result
}

async fn pipeline(
    state: &Arc<AppState>,
    request: &DeploymentRequest,
    channel: &mut RemoteChannel,
    key: &str,
) -> Result<DeploymentResult, DeployError> {
    runtime::ensure_docker(channel, &request.ssh_config).await?;
    state.advance_phase(key, DeployPhase::RuntimeVerified).await;

    // 隧道工具链坏了不拦部署，后面开隧道时自然会失败成软失败
    let provisioner = TunnelProvisioner::new();
    if !provisioner
        .ensure_tooling(channel, &request.ssh_config)
        .await
    {
        warn!("Failed to verify/install tunnel tooling");
    }

    let port = ports::allocate_port(channel).await?;
    let tag = image_tag(&request.user_id, &request.model_id);
    info!(port, image_tag = %tag, "Allocated deployment slot");

    let temp_dir = container::stage_payload(channel, &request.model_id, &request.user_id).await?;

    let handle = match build_and_launch(
        channel,
        &temp_dir,
        &tag,
        port,
        state.config.hf_token.as_deref(),
    )
    .await
    {
        Ok(handle) => handle,
        Err(e) => {
            container::cleanup_staging(channel, &temp_dir).await;
            return Err(e);
        }
    };
    state
        .advance_phase(key, DeployPhase::BuiltAndLaunched)
        .await;

    if let Err(e) = container::await_ready(channel, &handle.id).await {
        container::remove_container(channel, &handle.id).await;
        container::cleanup_staging(channel, &temp_dir).await;
        return Err(e);
    }
    state.advance_phase(key, DeployPhase::Ready).await;

    let network_details = match container::inspect_network(channel, &handle.id).await {
        Ok(details) => details,
        Err(e) => {
            container::remove_container(channel, &handle.id).await;
            container::cleanup_staging(channel, &temp_dir).await;
            return Err(e);
        }
    };

    // 有 api_name 才开隧道；开不开得出来都不算部署失败
    let tunnel = if request.api_name.is_empty() {
        None
    } else {
        match provisioner
            .open_tunnel(channel, port, &request.api_name)
            .await
        {
            Ok(record) => {
                if !record.is_established() {
                    warn!("Tunnel started but no public URL was discovered");
                }
                Some(record)
            }
            Err(e) => {
                let soft = DeployError::Tunnel(e.to_string());
                warn!(error = %soft, "Continuing without tunnel");
                None
            }
        }
    };
    state.advance_phase(key, DeployPhase::TunnelAttempted).await;

    let result = build_result(request, &handle, &tag, network_details, tunnel);

    if let Err(e) = state.store.record(result.clone()).await {
        let soft = DeployError::Persistence(e.to_string());
        warn!(error = %soft, "Deployment record not persisted");
    }
    if state.callback.has_callback() {
        if let Err(e) = state.callback.report_deployment(&result).await {
            warn!(error = %e, "Failed to report deployment to deploy center");
        }
    }
    state.advance_phase(key, DeployPhase::Persisted).await;

    container::cleanup_staging(channel, &temp_dir).await;

    // 日志跟读走自己的连接，不借部署通道
    stream::spawn_log_streaming(
        request.ssh_config.clone(),
        handle.id.clone(),
        state.shutdown.clone(),
    );

    Ok(result)
}

async fn build_and_launch(
    channel: &mut RemoteChannel,
    temp_dir: &str,
    tag: &str,
    port: u16,
    hf_token: Option<&str>,
) -> Result<ContainerHandle, DeployError> {
    container::build_image(channel, temp_dir, tag).await?;
    container::launch_container(channel, tag, port, hf_token).await
}

fn build_result(
    request: &DeploymentRequest,
    handle: &ContainerHandle,
    tag: &str,
    network_details: serde_json::Value,
    tunnel: Option<crate::domain::tunnel::TunnelRecord>,
) -> DeploymentResult {
    DeploymentResult {
        container_id: handle.id.clone(),
        model_id: request.model_id.clone(),
        user_id: request.user_id.clone(),
        api_name: request.api_name.clone(),
        image_tag: tag.to_string(),
        port: handle.port,
        api_url: format!("http://{}:{}", request.ssh_config.host, handle.port),
        network_details,
        tunnel_url: tunnel.as_ref().and_then(|t| t.public_url.clone()),
        tunnel: tunnel.filter(|t| t.is_established()),
        timestamp: chrono::Utc::now(),
    }
}
