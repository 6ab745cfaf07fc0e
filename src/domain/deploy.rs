//! 部署相关领域模型

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::remote::RemoteCredentials;
use crate::domain::tunnel::TunnelRecord;

/// 部署流水线阶段
///
/// 线性推进；任意阶段都允许直接进入 Closed（通道保证释放）
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployPhase {
    Idle,
    Connected,
    RuntimeVerified,
    BuiltAndLaunched,
    Ready,
    TunnelAttempted,
    Persisted,
    Closed,
}

impl DeployPhase {
    /// 转换为字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            DeployPhase::Idle => "idle",
            DeployPhase::Connected => "connected",
            DeployPhase::RuntimeVerified => "runtime_verified",
            DeployPhase::BuiltAndLaunched => "built_and_launched",
            DeployPhase::Ready => "ready",
            DeployPhase::TunnelAttempted => "tunnel_attempted",
            DeployPhase::Persisted => "persisted",
            DeployPhase::Closed => "closed",
        }
    }

    /// 是否为终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployPhase::Closed)
    }

    /// 状态转移表
    pub fn permits(self, next: DeployPhase) -> bool {
        use DeployPhase::*;
        if next == Closed {
            return true;
        }
        matches!(
            (self, next),
            (Idle, Connected)
                | (Connected, RuntimeVerified)
                | (RuntimeVerified, BuiltAndLaunched)
                | (BuiltAndLaunched, Ready)
                | (Ready, TunnelAttempted)
                | (TunnelAttempted, Persisted)
        )
    }
}

/// 部署请求
#[derive(Clone, Debug, Deserialize)]
pub struct DeploymentRequest {
    pub model_id: String,
    pub user_id: String,
    /// 服务名，用作隧道子域名；为空则不建隧道
    #[serde(default)]
    pub api_name: String,
    pub ssh_config: RemoteCredentials,
}

/// 已启动容器的句柄
///
/// 容器生命周期超出本次部署调用：部署结束后容器继续运行，
/// 句柄只在显式删除或远端进程退出前有效
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContainerHandle {
    /// 运行时分配的容器 ID
    pub id: String,
    /// 绑定的宿主机端口
    pub port: u16,
}

/// 部署结果，同时也是持久化记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeploymentResult {
    pub container_id: String,
    pub model_id: String,
    pub user_id: String,
    pub api_name: String,
    pub image_tag: String,
    pub port: u16,
    /// `http://{host}:{port}`
    pub api_url: String,
    /// docker inspect 的 NetworkSettings；非 JSON 输出降级为原样字符串
    pub network_details: serde_json::Value,
    /// 公网地址；null 表示明确没有隧道
    pub tunnel_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tunnel: Option<TunnelRecord>,
    pub timestamp: DateTime<Utc>,
}

impl DeploymentResult {
    /// 存储键：`{user_id}-{safe_model_id}`
    pub fn store_key(&self) -> String {
        format!("{}-{}", self.user_id, safe_model_id(&self.model_id))
    }
}

/// 模型 ID 的文件系统安全形式：斜杠替换为连字符并小写
pub fn safe_model_id(model_id: &str) -> String {
    model_id.replace('/', "-").to_lowercase()
}

/// 镜像标签：`{user_id}-{safe_model_id}:{8 位十六进制后缀}`
pub fn image_tag(user_id: &str, model_id: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}:{}", user_id, safe_model_id(model_id), &suffix[..8])
}

/// 模型家族决定容器内运行时：llama 系列走 llama.cpp
pub fn use_llama_cpp(model_id: &str) -> bool {
    model_id.to_lowercase().contains("llama")
}
