//! SSH 远程执行通道
//!
//! 部署的全部副作用都发生在远端（启动进程、写文件），
//! 通道本身只持有进程内会话状态

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use russh::client;
use russh::{ChannelMsg, Disconnect};
use russh_keys::key::PublicKey;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::env::constants::{
    COMMAND_TIMEOUT_SECS, SSH_CONNECT_TIMEOUT_SECS, SSH_KEEPALIVE_INTERVAL_SECS,
};
use crate::domain::remote::RemoteCredentials;

/// 通道错误
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("SSH connection failed: {0}")]
    Connect(String),

    #[error("SSH authentication failed: {0}")]
    Auth(String),

    #[error("SSH session no longer active: {0}")]
    Session(String),

    #[error("command timed out after {seconds}s: {command}")]
    Timeout { seconds: u64, command: String },

    #[error("command `{command}` exited with status {exit_code}: {stderr}")]
    Command {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("failed to write {path}: {message}")]
    Write { path: String, message: String },
}

/// 单条远程命令的结构化输出
///
/// stdout/stderr 分开保留，由调用方决定读哪个流
#[derive(Clone, Debug)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// 去掉首尾空白的 stdout
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// SSH client handler
struct ClientHandler;

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        // 部署目标由请求方凭证指定，不校验 known_hosts
        Ok(true)
    }
}

/// SSH 远程执行通道
///
/// 一次部署独占一个通道，不跨部署共享。连接期间保留一份凭证拷贝，
/// 供 `run_long` 在会话失效时重连一次。`close` 幂等，未连接时调用同样安全。
pub struct RemoteChannel {
    credentials: RemoteCredentials,
    session: Option<client::Handle<ClientHandler>>,
}

impl RemoteChannel {
    /// 建立 SSH 会话：有限连接超时 + 周期 keepalive，长构建期间不掉线
    pub async fn connect(credentials: &RemoteCredentials) -> Result<Self, ChannelError> {
        let mut channel = Self {
            credentials: credentials.clone(),
            session: None,
        };
        channel.establish().await?;
        Ok(channel)
    }

    async fn establish(&mut self) -> Result<(), ChannelError> {
        info!(
            host = %self.credentials.host,
            port = self.credentials.port,
            user = %self.credentials.username,
            "Connecting via SSH"
        );

        let config = client::Config {
            keepalive_interval: Some(Duration::from_secs(SSH_KEEPALIVE_INTERVAL_SECS)),
            ..Default::default()
        };
        let config = Arc::new(config);

        let connecting = client::connect(
            config,
            (self.credentials.host.as_str(), self.credentials.port),
            ClientHandler,
        );
        let mut session =
            tokio::time::timeout(Duration::from_secs(SSH_CONNECT_TIMEOUT_SECS), connecting)
                .await
                .map_err(|_| {
                    ChannelError::Connect(format!(
                        "connect timed out after {}s",
                        SSH_CONNECT_TIMEOUT_SECS
                    ))
                })?
                .map_err(|e| ChannelError::Connect(e.to_string()))?;

        let authenticated = match (&self.credentials.password, &self.credentials.private_key) {
            (Some(password), _) => session
                .authenticate_password(&self.credentials.username, password)
                .await
                .map_err(|e| ChannelError::Auth(e.to_string()))?,
            (None, Some(pem)) => {
                let key = russh_keys::decode_secret_key(pem, None)
                    .map_err(|e| ChannelError::Auth(e.to_string()))?;
                session
                    .authenticate_publickey(&self.credentials.username, Arc::new(key))
                    .await
                    .map_err(|e| ChannelError::Auth(e.to_string()))?
            }
            (None, None) => {
                return Err(ChannelError::Auth(
                    "no password or private key provided".to_string(),
                ))
            }
        };

        if !authenticated {
            return Err(ChannelError::Auth("credentials rejected".to_string()));
        }

        info!(host = %self.credentials.host, "SSH connection established");
        self.session = Some(session);
        Ok(())
    }

    /// 是否持有活跃会话
    pub fn is_connected(&self) -> bool {
        self.session.is_some()
    }

    /// 执行一条命令，非零退出码视为失败
    pub async fn run(&mut self, command: &str) -> Result<CommandOutput, ChannelError> {
        self.run_with_timeout(command, Duration::from_secs(COMMAND_TIMEOUT_SECS))
            .await
    }

    /// 执行一条命令并指定超时，非零退出码视为失败
    pub async fn run_with_timeout(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ChannelError> {
        let output = self.exec(command, timeout).await?;
        if !output.success() {
            return Err(ChannelError::Command {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// 执行探测类命令：非零退出码不算错误，原样返回输出
    pub async fn run_unchecked(&mut self, command: &str) -> Result<CommandOutput, ChannelError> {
        self.exec(command, Duration::from_secs(COMMAND_TIMEOUT_SECS))
            .await
    }

    /// 长命令（镜像构建等）：会话失效时重连一次并重试恰好一次
    pub async fn run_long(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ChannelError> {
        match self.run_with_timeout(command, timeout).await {
            Err(ChannelError::Session(reason)) => {
                info!(reason = %reason, "Session expired during long command, reconnecting");
                self.establish().await?;
                self.run_with_timeout(command, timeout).await
            }
            other => other,
        }
    }

    /// 写文本文件：内容 base64 后经 exec 在远端解码落盘，父目录自动创建
    pub async fn write_file(&mut self, path: &str, content: &str) -> Result<(), ChannelError> {
        let encoded = BASE64.encode(content.as_bytes());
        let command = format!(
            "mkdir -p \"$(dirname '{}')\" && echo '{}' | base64 -d > '{}'",
            path, encoded, path
        );

        let output = self
            .exec(&command, Duration::from_secs(COMMAND_TIMEOUT_SECS))
            .await?;
        if !output.success() {
            return Err(ChannelError::Write {
                path: path.to_string(),
                message: output.stderr.trim().to_string(),
            });
        }

        debug!(path = %path, bytes = content.len(), "Remote file written");
        Ok(())
    }

    /// 关闭会话；幂等
    pub async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            let _ = session
                .disconnect(Disconnect::ByApplication, "deploy finished", "en")
                .await;
            info!(host = %self.credentials.host, "SSH disconnected");
        }
    }

    /// 每条命令开一个新 exec 会话，分流捕获输出直至远端关闭
    async fn exec(
        &mut self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput, ChannelError> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| ChannelError::Session("not connected".to_string()))?;

        debug!(command = %command, "Executing remote command");

        let mut channel = session
            .channel_open_session()
            .await
            .map_err(|e| ChannelError::Session(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| ChannelError::Session(e.to_string()))?;

        let mut stdout = String::new();
        let mut stderr = String::new();
        let mut exit_code: Option<i32> = None;

        let drained = tokio::time::timeout(timeout, async {
            loop {
                match channel.wait().await {
                    Some(ChannelMsg::Data { data }) => {
                        stdout.push_str(&String::from_utf8_lossy(&data));
                    }
                    Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                        stderr.push_str(&String::from_utf8_lossy(&data));
                    }
                    Some(ChannelMsg::ExitStatus { exit_status }) => {
                        exit_code = Some(exit_status as i32);
                    }
                    None => break,
                    _ => {}
                }
            }
        })
        .await;

        if drained.is_err() {
            return Err(ChannelError::Timeout {
                seconds: timeout.as_secs(),
                command: command.to_string(),
            });
        }

        // 远端被信号杀死时不会有 exit-status，按失败处理
        let exit_code = exit_code.unwrap_or(-1);

        debug!(
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Command completed"
        );

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn never_connected() -> RemoteChannel {
        RemoteChannel {
            credentials: RemoteCredentials {
                host: "10.0.0.5".into(),
                port: 22,
                username: "deploy".into(),
                password: Some("secret".into()),
                private_key: None,
            },
            session: None,
        }
    }

    #[tokio::test]
    async fn test_close_without_connect_is_safe() {
        let mut channel = never_connected();
        channel.close().await;
        channel.close().await;
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_exec_without_session_reports_session_error() {
        let mut channel = never_connected();
        match channel.run("echo hi").await {
            Err(ChannelError::Session(_)) => {}
            other => panic!("expected Session error, got {:?}", other),
        }
    }

    #[test]
    fn test_command_output_success() {
        let ok = CommandOutput {
            stdout: "abc\n".into(),
            stderr: String::new(),
            exit_code: 0,
        };
        assert!(ok.success());
        assert_eq!(ok.stdout_trimmed(), "abc");

        let failed = CommandOutput {
            stdout: String::new(),
            stderr: "boom".into(),
            exit_code: 1,
        };
        assert!(!failed.success());
    }
}
