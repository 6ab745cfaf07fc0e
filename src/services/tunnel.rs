//! localtunnel process manager
//!
//! We run `lt` on the remote host under nohup, scrape its log file for the
//! public URL, and keep the PID file around for later status checks.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::env::constants::{TUNNEL_URL_ATTEMPTS, TUNNEL_URL_DELAY_SECS};
use crate::domain::remote::RemoteCredentials;
use crate::domain::tunnel::{TunnelHealth, TunnelRecord};
use crate::infra::ssh::{ChannelError, RemoteChannel};

/// How a tunnel binary is invoked and how its log betrays the public URL
#[derive(Clone, Copy, Debug)]
pub struct TunnelBackend {
    pub binary: &'static str,
    /// ASCII marker preceding the URL in the process log
    pub url_marker: &'static str,
    pub log_dir: &'static str,
}

pub const LOCALTUNNEL: TunnelBackend = TunnelBackend {
    binary: "lt",
    url_marker: "your url is:",
    log_dir: "/tmp/tunnels",
};

impl TunnelBackend {
    fn log_file(&self, subdomain: &str, port: u16) -> String {
        format!("{}/tunnel_{}_{}.log", self.log_dir, subdomain, port)
    }

    fn pid_file(&self, subdomain: &str, port: u16) -> String {
        format!("{}/tunnel_{}_{}.pid", self.log_dir, subdomain, port)
    }

    /// Extract the public URL from a log snapshot.
    ///
    /// The marker is matched ASCII case-insensitively; everything after it
    /// on the same line is the URL.
    fn extract_url(&self, log: &str) -> Option<String> {
        let marker = self.url_marker.as_bytes();
        for line in log.lines() {
            let found = line
                .as_bytes()
                .windows(marker.len())
                .position(|window| window.eq_ignore_ascii_case(marker));
            if let Some(idx) = found {
                let url = line[idx + marker.len()..].trim();
                if !url.is_empty() {
                    return Some(url.to_string());
                }
            }
        }
        None
    }
}

/// Provisions tunnels over an already-connected deployment channel
pub struct TunnelProvisioner {
    backend: TunnelBackend,
}

impl TunnelProvisioner {
    pub fn new() -> Self {
        Self {
            backend: LOCALTUNNEL,
        }
    }

    #[cfg(test)]
    fn with_backend(backend: TunnelBackend) -> Self {
        Self { backend }
    }

    /// Make sure npm and the tunnel binary exist on the remote host.
    ///
    /// Best effort: returns false when installation fails, never errors.
    pub async fn ensure_tooling(
        &self,
        channel: &mut RemoteChannel,
        credentials: &RemoteCredentials,
    ) -> bool {
        let npm_present = matches!(
            channel.run_unchecked("which npm").await,
            Ok(output) if output.success() && !output.stdout_trimmed().is_empty()
        );

        if !npm_present {
            info!("npm not found on remote host, installing");
            if let Err(e) = channel
                .run_long(
                    &credentials.sudo("apt-get update"),
                    Duration::from_secs(300),
                )
                .await
            {
                warn!(error = %e, "Failed to update package lists");
                return false;
            }
            if let Err(e) = channel
                .run_long(
                    &credentials.sudo("apt-get install -y npm"),
                    Duration::from_secs(300),
                )
                .await
            {
                warn!(error = %e, "Failed to install npm");
                return false;
            }
        }

        let lt_present = matches!(
            channel.run_unchecked(&format!("which {}", self.backend.binary)).await,
            Ok(output) if output.success() && !output.stdout_trimmed().is_empty()
        );

        if !lt_present {
            info!(binary = self.backend.binary, "Tunnel binary not found, installing localtunnel");
            if let Err(e) = channel
                .run_long(
                    &credentials.sudo("npm install -g localtunnel"),
                    Duration::from_secs(300),
                )
                .await
            {
                warn!(error = %e, "Failed to install localtunnel");
                return false;
            }
        }

        true
    }

    /// Start a tunnel for `port` and wait for its public URL.
    ///
    /// The process keeps running after we disconnect (nohup). URL discovery
    /// has a fixed budget; running out of it is not an error, the record
    /// just carries no URL.
    pub async fn open_tunnel(
        &self,
        channel: &mut RemoteChannel,
        port: u16,
        subdomain: &str,
    ) -> Result<TunnelRecord, ChannelError> {
        let safe = safe_subdomain(subdomain);
        let log_file = self.backend.log_file(&safe, port);
        info!(port, subdomain = %safe, "Creating tunnel");

        channel
            .run(&format!("mkdir -p {}", self.backend.log_dir))
            .await?;
        channel.run(&format!("touch {}", log_file)).await?;
        channel.run(&format!("chmod 777 {}", log_file)).await?;

        let launch = format!(
            "nohup {} --port {} --subdomain {} > {} 2>&1 & echo $!",
            self.backend.binary, port, safe, log_file
        );
        let pid = channel.run(&launch).await?.stdout_trimmed().to_string();
        info!(pid = %pid, "Started tunnel process");

        for attempt in 1..=TUNNEL_URL_ATTEMPTS {
            sleep(Duration::from_secs(TUNNEL_URL_DELAY_SECS)).await;

            let log = match channel.run(&format!("cat {}", log_file)).await {
                Ok(output) => output.stdout,
                Err(e) => {
                    warn!(attempt, error = %e, "Error reading tunnel log");
                    continue;
                }
            };

            if let Some(url) = self.backend.extract_url(&log) {
                info!(url = %url, "Tunnel established");
                channel
                    .write_file(&self.backend.pid_file(&safe, port), &pid)
                    .await?;
                return Ok(TunnelRecord {
                    subdomain: safe,
                    port,
                    pid,
                    public_url: Some(url),
                });
            }

            warn!(attempt, "Tunnel URL not in logs yet");
        }

        warn!(port, subdomain = %safe, "Gave up waiting for tunnel URL");
        Ok(TunnelRecord {
            subdomain: safe,
            port,
            pid,
            public_url: None,
        })
    }

    /// Check whether a previously opened tunnel is still alive
    pub async fn tunnel_status(
        &self,
        channel: &mut RemoteChannel,
        subdomain: &str,
        port: u16,
    ) -> TunnelHealth {
        let safe = safe_subdomain(subdomain);
        let pid_file = self.backend.pid_file(&safe, port);
        let log_file = self.backend.log_file(&safe, port);

        let pid = match channel.run(&format!("cat {}", pid_file)).await {
            Ok(output) => Some(output.stdout_trimmed().to_string()),
            Err(_) => None,
        };

        let active = match &pid {
            Some(pid) if !pid.is_empty() => {
                matches!(
                    channel
                        .run_unchecked(&format!("ps -p {} | grep {}", pid, self.backend.binary))
                        .await,
                    Ok(output) if output.success() && !output.stdout_trimmed().is_empty()
                )
            }
            _ => false,
        };

        let logs = match channel.run(&format!("tail -n 20 {}", log_file)).await {
            Ok(output) => output.stdout,
            Err(_) => "No logs available".to_string(),
        };

        TunnelHealth {
            active,
            pid: if active { pid } else { None },
            logs,
        }
    }
}

impl Default for TunnelProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

/// Subdomain labels cannot carry `/` or `.`; lowercase what remains
pub fn safe_subdomain(subdomain: &str) -> String {
    subdomain.replace('/', "-").replace('.', "-").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safe_subdomain() {
        assert_eq!(safe_subdomain("my-api"), "my-api");
        assert_eq!(safe_subdomain("org/Model.v2"), "org-model-v2");
        assert_eq!(safe_subdomain("pola.open/elm"), "pola-open-elm");
    }

    #[test]
    fn test_extract_url_from_log() {
        let log = "npm notice\nyour url is: https://my-api.loca.lt\n";
        assert_eq!(
            LOCALTUNNEL.extract_url(log),
            Some("https://my-api.loca.lt".to_string())
        );
    }

    #[test]
    fn test_extract_url_is_case_insensitive() {
        let log = "Your URL is: https://my-api.loca.lt";
        assert_eq!(
            LOCALTUNNEL.extract_url(log),
            Some("https://my-api.loca.lt".to_string())
        );
    }

    #[test]
    fn test_extract_url_absent() {
        assert_eq!(LOCALTUNNEL.extract_url(""), None);
        assert_eq!(LOCALTUNNEL.extract_url("tunnel starting up"), None);
        // 标记后面没有内容时不算命中
        assert_eq!(LOCALTUNNEL.extract_url("your url is:   "), None);
    }

    #[test]
    fn test_backend_file_paths() {
        assert_eq!(
            LOCALTUNNEL.log_file("my-api", 8042),
            "/tmp/tunnels/tunnel_my-api_8042.log"
        );
        assert_eq!(
            LOCALTUNNEL.pid_file("my-api", 8042),
            "/tmp/tunnels/tunnel_my-api_8042.pid"
        );
    }

    #[test]
    fn test_custom_backend_marker() {
        let backend = TunnelBackend {
            binary: "othertunnel",
            url_marker: "tunnel ready at",
            log_dir: "/tmp/tunnels",
        };
        let provisioner = TunnelProvisioner::with_backend(backend);
        assert_eq!(
            provisioner.backend.extract_url("tunnel ready at https://x.example"),
            Some("https://x.example".to_string())
        );
        assert_eq!(provisioner.backend.extract_url("your url is: https://x"), None);
    }
}
