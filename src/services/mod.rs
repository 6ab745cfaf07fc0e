//! 服务层模块
//!
//! 包含核心业务逻辑

pub mod deploy;
pub mod payload;
pub mod registry;
pub mod requirements;
pub mod store;
pub mod tunnel;

pub use registry::ModelRegistry;
pub use store::DeploymentStore;
pub use tunnel::TunnelProvisioner;
