//! 部署错误分类
//!
//! 每个变体对应流水线的一个阶段，软失败（隧道、落盘）不在这里出现，
//! 它们只降级为告警

use thiserror::Error;

use crate::infra::ssh::ChannelError;

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("failed to establish SSH connection: {0}")]
    Connection(String),

    #[error("docker runtime unavailable: {0}")]
    Runtime(String),

    #[error("model `{0}` not found in registry")]
    UnknownModel(String),

    #[error("no free port found after {attempts} attempts in {start}-{end}")]
    Ports { attempts: u32, start: u16, end: u16 },

    #[error("failed to stage deployment payload: {0}")]
    Staging(String),

    #[error("image build failed: {0}")]
    Build(String),

    #[error("container launch failed: {0}")]
    Launch(String),

    #[error("container exited during startup; logs:\n{logs}")]
    Startup { logs: String },

    #[error("container not running after {attempts} readiness checks")]
    Timeout { attempts: u32 },

    #[error("tunnel provisioning failed: {0}")]
    Tunnel(String),

    #[error("failed to persist deployment record: {0}")]
    Persistence(String),

    #[error(transparent)]
    Command(#[from] ChannelError),
}

impl DeployError {
    /// 软失败：部署本身算成功，只少了对应能力
    pub fn is_soft(&self) -> bool {
        matches!(self, DeployError::Tunnel(_) | DeployError::Persistence(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_failures() {
        assert!(DeployError::Tunnel("lt died".into()).is_soft());
        assert!(DeployError::Persistence("disk full".into()).is_soft());
        assert!(!DeployError::Build("no space left".into()).is_soft());
        assert!(!DeployError::UnknownModel("x".into()).is_soft());
    }

    #[test]
    fn test_channel_error_converts() {
        let channel_err = ChannelError::Session("connection reset".into());
        let deploy_err: DeployError = channel_err.into();
        assert!(matches!(deploy_err, DeployError::Command(_)));
        assert!(!deploy_err.is_soft());
    }

    #[test]
    fn test_display_messages() {
        let err = DeployError::Ports {
            attempts: 10,
            start: 8000,
            end: 9000,
        };
        assert_eq!(
            err.to_string(),
            "no free port found after 10 attempts in 8000-9000"
        );

        let err = DeployError::UnknownModel("no-such/model".into());
        assert_eq!(err.to_string(), "model `no-such/model` not found in registry");
    }
}
