//! 基础设施模块
//!
//! 封装外部依赖（SSH 通道、HTTP client 等）

pub mod callback;
pub mod ssh;

pub use callback::CallbackClient;
pub use ssh::{ChannelError, CommandOutput, RemoteChannel};
