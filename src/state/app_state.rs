//! 应用状态

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::env::EnvConfig;
use crate::domain::deploy::DeployPhase;
use crate::infra::CallbackClient;
use crate::services::{DeploymentStore, ModelRegistry};

/// 应用状态
pub struct AppState {
    /// 环境配置
    pub config: EnvConfig,
    /// 服务启动时间
    pub started_at: DateTime<Utc>,
    /// 模型目录
    pub registry: ModelRegistry,
    /// 部署存储
    pub store: DeploymentStore,
    /// 部署中心客户端
    pub callback: CallbackClient,
    /// 进行中的部署及其阶段，键为 `{user_id}-{safe_model_id}`
    pub active_deploys: RwLock<HashMap<String, DeployPhase>>,
    /// 优雅关闭信号；挂在状态上，谁拿到状态谁能触发
    pub shutdown: CancellationToken,
}

impl AppState {
    /// 从环境变量创建应用状态
    pub fn new() -> Self {
        Self::from_config(EnvConfig::from_env())
    }

    pub fn from_config(config: EnvConfig) -> Self {
        let registry = ModelRegistry::load(config.catalog_path.as_deref());
        let store = DeploymentStore::new(&config.data_dir);

        tracing::info!(
            port = config.port,
            data_dir = %config.data_dir,
            callback_url = ?config.callback_url,
            hf_token_configured = config.hf_token.is_some(),
            models = registry.len(),
            "Loaded configuration"
        );

        Self {
            callback: CallbackClient::new(config.callback_url.clone()),
            registry,
            store,
            started_at: Utc::now(),
            active_deploys: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            config,
        }
    }

    /// 登记一次新部署，初始阶段 Idle
    pub async fn begin_deploy(&self, key: &str) {
        let mut active = self.active_deploys.write().await;
        active.insert(key.to_string(), DeployPhase::Idle);
    }

    /// 推进部署阶段
    ///
    /// 非法跳转是编程错误：记录并在 debug 构建里断言，但照常推进，
    /// 让登记表反映代码实际走到了哪
    pub async fn advance_phase(&self, key: &str, next: DeployPhase) {
        let mut active = self.active_deploys.write().await;
        match active.get_mut(key) {
            Some(phase) => {
                if !phase.permits(next) {
                    warn!(
                        key = %key,
                        from = phase.as_str(),
                        to = next.as_str(),
                        "Illegal deployment phase transition"
                    );
                    debug_assert!(
                        false,
                        "illegal phase transition {} -> {}",
                        phase.as_str(),
                        next.as_str()
                    );
                }
                *phase = next;
            }
            None => {
                warn!(key = %key, to = next.as_str(), "Phase update for unregistered deployment");
            }
        }
    }

    /// 部署结束，清掉登记
    pub async fn finish_deploy(&self, key: &str) {
        self.active_deploys.write().await.remove(key);
    }

    /// 进行中的部署数量
    pub async fn active_deploy_count(&self) -> usize {
        self.active_deploys.read().await.len()
    }

    /// 当前各部署阶段的快照
    pub async fn deploy_phases(&self) -> HashMap<String, DeployPhase> {
        self.active_deploys.read().await.clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        let data_dir = std::env::temp_dir()
            .join(format!("xjp-model-deploy-test-{}", uuid::Uuid::new_v4()))
            .to_string_lossy()
            .to_string();
        AppState::from_config(EnvConfig {
            port: 0,
            hf_token: None,
            data_dir,
            catalog_path: None,
            callback_url: None,
        })
    }

    #[tokio::test]
    async fn test_deploy_registration_lifecycle() {
        let state = test_state();

        state.begin_deploy("user1-gpt2").await;
        assert_eq!(state.active_deploy_count().await, 1);
        assert_eq!(
            state.deploy_phases().await.get("user1-gpt2"),
            Some(&DeployPhase::Idle)
        );

        state.advance_phase("user1-gpt2", DeployPhase::Connected).await;
        assert_eq!(
            state.deploy_phases().await.get("user1-gpt2"),
            Some(&DeployPhase::Connected)
        );

        state.finish_deploy("user1-gpt2").await;
        assert_eq!(state.active_deploy_count().await, 0);
    }

    #[tokio::test]
    async fn test_closed_is_reachable_from_any_phase() {
        let state = test_state();
        state.begin_deploy("user1-gpt2").await;
        state.advance_phase("user1-gpt2", DeployPhase::Closed).await;
        assert_eq!(
            state.deploy_phases().await.get("user1-gpt2"),
            Some(&DeployPhase::Closed)
        );
    }
}
