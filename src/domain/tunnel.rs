//! 隧道相关领域模型
//!
//! 纯数据类型，无 tokio/axum 依赖

use serde::{Deserialize, Serialize};

/// 隧道记录
///
/// PID 是后续状态查询的唯一持久句柄，编排器不保持与隧道进程的连接
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TunnelRecord {
    /// 文件系统安全的子域名
    pub subdomain: String,
    /// 本地绑定端口
    pub port: u16,
    /// 远程后台进程 PID
    pub pid: String,
    /// 发现的公网地址；要么完整要么缺省，不存在部分解析
    pub public_url: Option<String>,
}

impl TunnelRecord {
    /// URL 是否已发现
    pub fn is_established(&self) -> bool {
        self.public_url.is_some()
    }
}

/// 隧道健康状态
#[derive(Clone, Debug, Serialize)]
pub struct TunnelHealth {
    /// 进程是否仍在进程表中
    pub active: bool,
    /// 活跃时的 PID
    pub pid: Option<String>,
    /// 日志尾部
    pub logs: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tunnel_record_established() {
        let mut record = TunnelRecord {
            subdomain: "svc-a".into(),
            port: 8042,
            pid: "12345".into(),
            public_url: None,
        };
        assert!(!record.is_established());

        record.public_url = Some("https://svc-a.loca.lt".into());
        assert!(record.is_established());
    }
}
