//! 部署管理 API
//!
//! 包含 /api/v1/deploy, /api/v1/deployments/:user_id, /api/v1/tunnel-status 端点

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::deploy::{DeploymentRequest, DeploymentResult};
use crate::domain::remote::RemoteCredentials;
use crate::domain::tunnel::TunnelHealth;
use crate::error::{ApiError, ApiResult};
use crate::infra::RemoteChannel;
use crate::services;
use crate::services::TunnelProvisioner;
use crate::state::AppState;

/// 隧道状态查询请求
#[derive(Debug, Clone, Deserialize)]
pub struct TunnelStatusRequest {
    /// 建隧道时用的服务名（子域名来源）
    pub api_name: String,
    /// 隧道绑定的本地端口
    pub port: u16,
    pub ssh_config: RemoteCredentials,
}

/// 用户部署记录响应
#[derive(Debug, Serialize)]
pub struct DeploymentListResponse {
    pub deployments: Vec<DeploymentResult>,
    pub total: usize,
}

/// 创建部署管理路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/deploy", post(deploy_model))
        .route("/api/v1/deployments/:user_id", get(list_deployments))
        .route("/api/v1/tunnel-status", post(tunnel_status))
}

/// 触发一次部署
///
/// POST /api/v1/deploy
///
/// 同步执行：容器构建并启动（或流水线失败）后才返回。
/// 所有部署错误统一映射为 400，底层原因在 message 里。
async fn deploy_model(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DeploymentRequest>,
) -> ApiResult<Json<DeploymentResult>> {
    let result = services::deploy::execute(state, request).await?;
    Ok(Json(result))
}

/// 查询用户的当前部署记录
///
/// GET /api/v1/deployments/:user_id
/// 无需认证
async fn list_deployments(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    let deployments = state.store.list_for_user(&user_id).await;
    let total = deployments.len();

    Json(DeploymentListResponse { deployments, total })
}

/// 查询已建隧道的存活状态
///
/// POST /api/v1/tunnel-status
///
/// 临时建一条 SSH 通道查进程表和日志，查询结束即关闭
async fn tunnel_status(
    Json(request): Json<TunnelStatusRequest>,
) -> ApiResult<Json<TunnelHealth>> {
    let mut channel = RemoteChannel::connect(&request.ssh_config)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("SSH connection failed: {}", e)))?;

    let health = TunnelProvisioner::new()
        .tunnel_status(&mut channel, &request.api_name, request.port)
        .await;
    channel.close().await;

    Ok(Json(health))
}
