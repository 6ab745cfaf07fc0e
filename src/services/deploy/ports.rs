//! 远端端口分配
//!
//! 在固定区间里随机抽端口，并在远端用 ss 核实没被占用；
//! ss 不可用时接受候选端口并告警，退化为纯随机

use rand::Rng;
use tracing::{debug, info, warn};

use crate::config::env::constants::{PORT_PROBE_ATTEMPTS, PORT_RANGE_END, PORT_RANGE_START};
use crate::infra::ssh::RemoteChannel;

use super::error::DeployError;

/// 在远端挑一个未被监听的端口
pub async fn allocate_port(channel: &mut RemoteChannel) -> Result<u16, DeployError> {
    for attempt in 1..=PORT_PROBE_ATTEMPTS {
        // ThreadRng 不能跨 await 持有，逐次取
        let candidate = rand::thread_rng().gen_range(PORT_RANGE_START..=PORT_RANGE_END);

        let probe = channel
            .run_unchecked(&format!(
                "ss -tln \"( sport = :{} )\" | tail -n +2",
                candidate
            ))
            .await?;

        if !probe.success() {
            warn!(
                port = candidate,
                exit_code = probe.exit_code,
                "Port probe unavailable, accepting candidate unchecked"
            );
            return Ok(candidate);
        }

        if probe.stdout_trimmed().is_empty() {
            info!(port = candidate, attempt, "Selected free port");
            return Ok(candidate);
        }

        debug!(port = candidate, attempt, "Port already bound, retrying");
    }

    Err(DeployError::Ports {
        attempts: PORT_PROBE_ATTEMPTS,
        start: PORT_RANGE_START,
        end: PORT_RANGE_END,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_range_constants_are_sane() {
        assert!(PORT_RANGE_START < PORT_RANGE_END);
        assert!(PORT_PROBE_ATTEMPTS >= 1);
    }

    #[test]
    fn test_random_candidates_stay_in_range() {
        let mut rng = rand::thread_rng();
        for _ in 0..1000 {
            let candidate: u16 = rng.gen_range(PORT_RANGE_START..=PORT_RANGE_END);
            assert!((PORT_RANGE_START..=PORT_RANGE_END).contains(&candidate));
        }
    }
}
