//! 健康检查 API
//!
//! 包含 /health, /status 端点

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::state::AppState;

/// 健康检查响应
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    timestamp: String,
    uptime_seconds: i64,
    /// 目录中的模型数
    models: usize,
    /// 存储中的部署记录数
    recorded_deployments: usize,
    /// 进行中的部署数
    active_deploys: usize,
    /// 进行中部署的阶段快照，键为 `{user_id}-{safe_model_id}`
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    deployments_in_flight: HashMap<String, &'static str>,
}

/// 创建健康检查路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(health_check))
}

/// 健康检查 - 返回状态、版本、运行时间等信息
///
/// GET /health, GET /status
/// 无需认证
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let deployments_in_flight: HashMap<String, &'static str> = state
        .deploy_phases()
        .await
        .into_iter()
        .map(|(key, phase)| (key, phase.as_str()))
        .collect();

    Json(HealthResponse {
        status: "ok",
        service: "xjp-model-deploy",
        version: VERSION,
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_seconds: (chrono::Utc::now() - state.started_at).num_seconds(),
        models: state.registry.len(),
        recorded_deployments: state.store.deployment_count().await,
        active_deploys: deployments_in_flight.len(),
        deployments_in_flight,
    })
}
