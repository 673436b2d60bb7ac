//! Post-create/connect health gating: poll on a fixed interval, give up
//! silently (at `warn` level) after a timeout rather than failing the
//! caller, since the gate is advisory — a sandbox that never answers
//! `/health` within the budget may still be perfectly usable a moment later.

use tokio::time::Duration;
use tokio::time::Instant;

use crate::transport::ConnectTransport;
use crate::flags::SBX_HEALTH_GATE_INTERVAL_MS;
use crate::flags::SBX_HEALTH_GATE_TIMEOUT_MS;

/// Polls `GET /health` on the sandbox's envd until it responds 2xx, up to
/// `SBX_HEALTH_GATE_TIMEOUT_MS`. Never returns an error: exhausting the
/// budget just logs a warning: this gate is advisory-only.
pub async fn wait_until_healthy(transport: &ConnectTransport) {
    let deadline = Instant::now() + Duration::from_millis(*SBX_HEALTH_GATE_TIMEOUT_MS);
    let mut interval = tokio::time::interval(Duration::from_millis(*SBX_HEALTH_GATE_INTERVAL_MS));

    loop {
        interval.tick().await;

        if Instant::now() >= deadline {
            tracing::warn!("sandbox health gate timed out before envd reported healthy");
            return;
        }

        let url = format!("{}/health", transport.envd_base_url());
        match transport.http_client().get(&url).send().await {
            Ok(resp) if resp.status().is_success() => return,
            Ok(_) | Err(_) => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_and_timeout_defaults_match_spec() {
        assert_eq!(*SBX_HEALTH_GATE_INTERVAL_MS, 300);
        assert_eq!(*SBX_HEALTH_GATE_TIMEOUT_MS, 5_000);
    }
}
