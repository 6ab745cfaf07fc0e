//! 部署中心 HTTP Client
//!
//! 部署结果除本地落盘外，可选回传部署中心，复用连接池

use reqwest::Client;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::domain::deploy::DeploymentResult;

/// 部署中心客户端
///
/// 仅在配置了回调 URL 时发请求，否则所有调用静默返回
#[derive(Clone)]
pub struct CallbackClient {
    client: Client,
    callback_url: Option<String>,
}

impl CallbackClient {
    /// 创建新的部署中心客户端
    ///
    /// # Arguments
    /// * `callback_url` - 部署中心回调 URL（可选）
    pub fn new(callback_url: Option<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(5)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            callback_url,
        }
    }

    /// 检查是否配置了回调 URL
    pub fn has_callback(&self) -> bool {
        self.callback_url.is_some()
    }

    /// 获取回调 URL（如果配置了的话）
    pub fn callback_url(&self) -> Option<&str> {
        self.callback_url.as_deref()
    }

    /// 上报部署结果（带重试）
    ///
    /// 部署结果以本地存储为准，上报失败只降级为告警
    pub async fn report_deployment(&self, result: &DeploymentResult) -> Result<(), NotifyError> {
        let url = match &self.callback_url {
            Some(url) => url,
            None => return Ok(()), // 未配置回调 URL，静默返回
        };

        let report_url = format!("{}/api/deploy/records", url);
        let mut last_error = None;

        for attempt in 1..=3 {
            match self
                .client
                .post(&report_url)
                .timeout(Duration::from_secs(10))
                .json(result)
                .send()
                .await
            {
                Ok(resp) => {
                    if resp.status().is_success() {
                        info!(
                            model_id = %result.model_id,
                            user_id = %result.user_id,
                            attempt = attempt,
                            "Reported deployment to deploy center"
                        );
                        return Ok(());
                    } else {
                        warn!(
                            model_id = %result.model_id,
                            status = %resp.status(),
                            attempt = attempt,
                            "Deploy center returned non-success status"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        model_id = %result.model_id,
                        error = %e,
                        attempt = attempt,
                        "Failed to reach deploy center, will retry"
                    );
                    last_error = Some(e);
                }
            }

            // 重试前等待
            if attempt < 3 {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }

        error!(
            model_id = %result.model_id,
            user_id = %result.user_id,
            "Failed to report deployment after 3 attempts"
        );

        match last_error {
            Some(e) => Err(NotifyError::Network(e)),
            None => Err(NotifyError::NonSuccessStatus),
        }
    }
}

/// 通知错误类型
#[derive(Debug)]
pub enum NotifyError {
    /// 网络错误
    Network(reqwest::Error),
    /// 服务端返回非成功状态码
    NonSuccessStatus,
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotifyError::Network(e) => write!(f, "Network error: {}", e),
            NotifyError::NonSuccessStatus => write!(f, "Server returned non-success status"),
        }
    }
}

impl std::error::Error for NotifyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            NotifyError::Network(e) => Some(e),
            NotifyError::NonSuccessStatus => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_without_callback() {
        let client = CallbackClient::new(None);
        assert!(!client.has_callback());
        assert!(client.callback_url().is_none());
    }

    #[test]
    fn test_client_with_callback() {
        let client = CallbackClient::new(Some("https://example.com".to_string()));
        assert!(client.has_callback());
        assert_eq!(client.callback_url(), Some("https://example.com"));
    }

    #[tokio::test]
    async fn test_report_without_callback_is_noop() {
        let client = CallbackClient::new(None);
        let result = DeploymentResult {
            container_id: "abc123".into(),
            model_id: "gpt2".into(),
            user_id: "user1".into(),
            api_name: "gpt2-api".into(),
            image_tag: "user1-gpt2:deadbeef".into(),
            port: 8042,
            api_url: "http://10.0.0.5:8042".into(),
            network_details: serde_json::json!({}),
            tunnel_url: None,
            tunnel: None,
            timestamp: chrono::Utc::now(),
        };
        assert!(client.report_deployment(&result).await.is_ok());
    }
}
