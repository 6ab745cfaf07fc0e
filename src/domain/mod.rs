//! 领域模型模块
//!
//! 纯数据结构，不依赖 axum/tokio

pub mod deploy;
pub mod model;
pub mod remote;
pub mod tunnel;

// Re-exports for convenience
pub use deploy::{ContainerHandle, DeployPhase, DeploymentRequest, DeploymentResult};
pub use model::{HardwareCheck, HardwareRequirements, ModelEntry, ModelSpecs};
pub use remote::RemoteCredentials;
pub use tunnel::{TunnelHealth, TunnelRecord};
