//! 模型目录 API
//!
//! 包含 /api/v1/validate-requirements/:model_id 端点

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::model::{HardwareCheck, HardwareRequirements};
use crate::error::{ApiError, ApiResult};
use crate::services::requirements;
use crate::state::AppState;

/// 硬件需求核查响应
#[derive(Debug, Serialize)]
pub struct RequirementsResponse {
    /// 目录中登记的模型名
    pub model_id: String,
    pub requirements: HardwareRequirements,
    /// 本机硬件逐项核查结果
    pub check: HardwareCheck,
}

/// 创建模型目录路由
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route(
        "/api/v1/validate-requirements/:model_id",
        post(validate_requirements),
    )
}

/// 核查模型的硬件需求
///
/// POST /api/v1/validate-requirements/:model_id
///
/// 未知模型返回 404。路径段里不能带斜杠，
/// model_id 接受连字符形式（如 apple-OpenELM-270M）
async fn validate_requirements(
    State(state): State<Arc<AppState>>,
    Path(model_id): Path<String>,
) -> ApiResult<Json<RequirementsResponse>> {
    let entry = state
        .registry
        .get(&model_id)
        .ok_or_else(|| ApiError::not_found(format!("Model '{}'", model_id)))?;

    let check = requirements::check_hardware_requirements(&entry.requirements).await;

    Ok(Json(RequirementsResponse {
        model_id: entry.name.clone(),
        requirements: entry.requirements.clone(),
        check,
    }))
}
