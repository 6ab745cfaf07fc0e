//! XJP Model Deploy - 远程模型一键部署服务
//!
//! 通过 SSH 在远程 GPU 机器上构建并启动模型推理容器，
//! 用 localtunnel 暴露公网地址，并记录部署结果

pub mod error;
pub mod infra;
pub mod domain;
pub mod config;
pub mod state;
pub mod api;
pub mod services;
