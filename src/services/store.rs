//! 部署结果持久化模块
//!
//! 部署成功后落盘本地 JSON：当前部署按 `{user}-{model}` 键覆盖，
//! 历史记录追加且有上限，进程重启后可恢复

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::env::constants::MAX_DEPLOYMENT_HISTORY;
use crate::domain::deploy::DeploymentResult;

/// 持久化文件名
const STORE_FILE_NAME: &str = "deployments.json";

/// 持久化的部署记录集
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistedDeployments {
    /// 版本号（用于未来格式升级）
    pub version: u32,
    /// 当前部署，键为 `{user_id}-{safe_model_id}`
    pub deployments: HashMap<String, DeploymentResult>,
    /// 历史记录，最新在前
    pub history: VecDeque<DeploymentResult>,
    /// 保存时间
    pub saved_at: DateTime<Utc>,
}

impl PersistedDeployments {
    pub fn new() -> Self {
        Self {
            version: 1,
            deployments: HashMap::new(),
            history: VecDeque::new(),
            saved_at: Utc::now(),
        }
    }
}

impl Default for PersistedDeployments {
    fn default() -> Self {
        Self::new()
    }
}

/// 部署存储
///
/// 记录写入即落盘（原子写入）；读路径走内存快照
pub struct DeploymentStore {
    path: PathBuf,
    max_history: usize,
    records: RwLock<PersistedDeployments>,
}

impl DeploymentStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(STORE_FILE_NAME),
            max_history: MAX_DEPLOYMENT_HISTORY,
            records: RwLock::new(PersistedDeployments::new()),
        }
    }

    #[cfg(test)]
    fn with_max_history(data_dir: impl AsRef<Path>, max_history: usize) -> Self {
        Self {
            path: data_dir.as_ref().join(STORE_FILE_NAME),
            max_history,
            records: RwLock::new(PersistedDeployments::new()),
        }
    }

    /// 从文件恢复；文件缺失或损坏时保留空集并告警
    pub async fn load(&self) -> bool {
        if !self.path.exists() {
            return false;
        }

        match fs::read_to_string(&self.path).await {
            Ok(content) => match serde_json::from_str::<PersistedDeployments>(&content) {
                Ok(loaded) => {
                    info!(
                        path = %self.path.display(),
                        deployments = loaded.deployments.len(),
                        history = loaded.history.len(),
                        saved_at = %loaded.saved_at,
                        "Loaded deployment store"
                    );
                    *self.records.write().await = loaded;
                    true
                }
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to parse deployment store, starting empty"
                    );
                    false
                }
            },
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read deployment store file"
                );
                false
            }
        }
    }

    /// 记录一次部署：当前集合覆盖同键旧值，历史前插并截断
    pub async fn record(&self, result: DeploymentResult) -> anyhow::Result<()> {
        let mut records = self.records.write().await;

        let key = result.store_key();
        records.deployments.insert(key, result.clone());

        records.history.push_front(result);
        while records.history.len() > self.max_history {
            records.history.pop_back();
        }

        records.saved_at = Utc::now();
        self.save(&records).await
    }

    /// 某用户的当前部署，最新在前
    pub async fn list_for_user(&self, user_id: &str) -> Vec<DeploymentResult> {
        let records = self.records.read().await;
        let mut deployments: Vec<DeploymentResult> = records
            .deployments
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        deployments.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        deployments
    }

    /// 按存储键查当前部署
    pub async fn get(&self, key: &str) -> Option<DeploymentResult> {
        let records = self.records.read().await;
        records.deployments.get(key).cloned()
    }

    /// 当前部署数量
    pub async fn deployment_count(&self) -> usize {
        self.records.read().await.deployments.len()
    }

    /// 保存到文件（原子写入）
    async fn save(&self, records: &PersistedDeployments) -> anyhow::Result<()> {
        let temp_path = self.path.with_extension("json.tmp");

        // 确保目录存在
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(records)?;
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &self.path).await?;

        info!(
            path = %self.path.display(),
            deployments = records.deployments.len(),
            history = records.history.len(),
            "Saved deployment store"
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_result(user_id: &str, model_id: &str, port: u16) -> DeploymentResult {
        DeploymentResult {
            container_id: format!("container-{}", port),
            model_id: model_id.to_string(),
            user_id: user_id.to_string(),
            api_name: format!("{}-api", model_id),
            image_tag: format!("{}-{}:cafebabe", user_id, model_id),
            port,
            api_url: format!("http://10.0.0.5:{}", port),
            network_details: serde_json::json!({"Ports": {}}),
            tunnel_url: None,
            tunnel: None,
            timestamp: Utc::now(),
        }
    }

    fn test_dir() -> PathBuf {
        std::env::temp_dir().join(format!("xjp-model-deploy-test-{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_record_and_reload() {
        let dir = test_dir();
        let store = DeploymentStore::new(&dir);

        store
            .record(sample_result("user1", "gpt2", 8042))
            .await
            .unwrap();

        // 重新打开后恢复
        let reopened = DeploymentStore::new(&dir);
        assert!(reopened.load().await);
        assert_eq!(reopened.deployment_count().await, 1);
        let got = reopened.get("user1-gpt2").await.unwrap();
        assert_eq!(got.port, 8042);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn test_redeploy_overwrites_current_but_appends_history() {
        let dir = test_dir();
        let store = DeploymentStore::new(&dir);

        store
            .record(sample_result("user1", "gpt2", 8042))
            .await
            .unwrap();
        store
            .record(sample_result("user1", "gpt2", 8043))
            .await
            .unwrap();

        assert_eq!(store.deployment_count().await, 1);
        assert_eq!(store.get("user1-gpt2").await.unwrap().port, 8043);

        let records = store.records.read().await;
        assert_eq!(records.history.len(), 2);
        // 最新在前
        assert_eq!(records.history[0].port, 8043);
        drop(records);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn test_history_is_capped() {
        let dir = test_dir();
        let store = DeploymentStore::with_max_history(&dir, 3);

        for port in 8000..8005u16 {
            store
                .record(sample_result("user1", "gpt2", port))
                .await
                .unwrap();
        }

        let records = store.records.read().await;
        assert_eq!(records.history.len(), 3);
        assert_eq!(records.history[0].port, 8004);
        assert_eq!(records.history[2].port, 8002);
        drop(records);

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn test_list_for_user_filters_and_sorts() {
        let dir = test_dir();
        let store = DeploymentStore::new(&dir);

        store
            .record(sample_result("user1", "gpt2", 8042))
            .await
            .unwrap();
        store
            .record(sample_result("user1", "distilgpt2", 8043))
            .await
            .unwrap();
        store
            .record(sample_result("user2", "gpt2", 8044))
            .await
            .unwrap();

        let mine = store.list_for_user("user1").await;
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|d| d.user_id == "user1"));

        assert!(store.list_for_user("nobody").await.is_empty());

        tokio::fs::remove_dir_all(&dir).await.ok();
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_false() {
        let dir = test_dir();
        let store = DeploymentStore::new(&dir);
        assert!(!store.load().await);
    }
}
