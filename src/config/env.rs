//! 环境变量配置加载

use std::env;
use tracing::warn;

/// 环境配置
#[derive(Clone, Debug)]
pub struct EnvConfig {
    /// 服务监听端口
    pub port: u16,
    /// HuggingFace 访问令牌（可选，存在时注入到容器）
    pub hf_token: Option<String>,
    /// 部署记录存储目录
    pub data_dir: String,
    /// 模型目录文件路径（可选，覆盖内置目录）
    pub catalog_path: Option<String>,
    /// 部署中心回调 URL（可选，best-effort 通知）
    pub callback_url: Option<String>,
}

impl EnvConfig {
    /// 从环境变量加载配置
    pub fn from_env() -> Self {
        let port = env::var("MODEL_DEPLOY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8080);

        // HF Token - 支持旧名称兼容
        let hf_token =
            load_with_fallback("HUGGINGFACE_TOKEN", "HF_TOKEN").filter(|s| !s.is_empty());

        let data_dir = env::var("XJP_DATA_DIR").unwrap_or_else(|_| "./data".to_string());

        let catalog_path = env::var("MODEL_CATALOG_PATH").ok().filter(|s| !s.is_empty());

        // Callback URL - 支持旧名称兼容
        let callback_url = load_with_fallback("DEPLOY_CALLBACK_URL", "CALLBACK_URL");
        if env::var("CALLBACK_URL").is_ok() {
            warn!("Deprecated environment variable detected. Please use DEPLOY_CALLBACK_URL");
        }

        Self {
            port,
            hf_token,
            data_dir,
            catalog_path,
            callback_url,
        }
    }
}

/// 加载环境变量，支持 fallback
fn load_with_fallback(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).ok().or_else(|| env::var(fallback).ok())
}

/// 常量
pub mod constants {
    /// SSH 连接超时（秒）
    pub const SSH_CONNECT_TIMEOUT_SECS: u64 = 30;

    /// SSH keepalive 间隔（秒）- 长构建期间保持会话
    pub const SSH_KEEPALIVE_INTERVAL_SECS: u64 = 15;

    /// 普通远程命令超时（秒）
    pub const COMMAND_TIMEOUT_SECS: u64 = 60;

    /// 镜像构建超时（秒）- 基础镜像可能很大
    pub const BUILD_TIMEOUT_SECS: u64 = 3600;

    /// 容器就绪轮询次数
    pub const CONTAINER_WAIT_ATTEMPTS: u32 = 3;

    /// 容器就绪轮询间隔（秒）
    pub const CONTAINER_WAIT_BACKOFF_SECS: u64 = 2;

    /// 隧道 URL 发现轮询次数
    pub const TUNNEL_URL_ATTEMPTS: u32 = 5;

    /// 隧道 URL 发现轮询间隔（秒）
    pub const TUNNEL_URL_DELAY_SECS: u64 = 3;

    /// 服务端口候选区间
    pub const PORT_RANGE_START: u16 = 8000;
    pub const PORT_RANGE_END: u16 = 9000;

    /// 端口探测重试次数
    pub const PORT_PROBE_ATTEMPTS: u32 = 10;

    /// 部署后日志观察窗口（秒）
    pub const LOG_STREAM_WINDOW_SECS: u64 = 60;

    /// 日志轮询间隔（秒）
    pub const LOG_STREAM_INTERVAL_SECS: u64 = 5;

    /// 部署历史最大保存数量
    pub const MAX_DEPLOYMENT_HISTORY: usize = 200;

    /// 容器内固定服务端口
    pub const CONTAINER_SERVICE_PORT: u16 = 8000;

    /// 版本号
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_with_fallback() {
        // 设置测试环境变量
        env::set_var("TEST_PRIMARY", "primary_value");
        env::set_var("TEST_FALLBACK", "fallback_value");

        assert_eq!(
            load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"),
            Some("primary_value".to_string())
        );

        env::remove_var("TEST_PRIMARY");
        assert_eq!(
            load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"),
            Some("fallback_value".to_string())
        );

        env::remove_var("TEST_FALLBACK");
        assert_eq!(load_with_fallback("TEST_PRIMARY", "TEST_FALLBACK"), None);
    }
}
