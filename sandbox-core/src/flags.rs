//! Ambient, process-wide tunables that are not part of a sandbox's identity.
//!
//! These differ from [`crate::connection_config::ConnectionConfig`] in that
//! they are *not* resolved per-handle: they govern transport behavior (retry
//! counts, health-gate cadence) that a deployment may want to override
//! globally without touching call sites. `ConnectionConfig` itself never
//! reads from here; it resolves `SBX_*` env vars lazily inside
//! `ConnectionConfig::resolve`.

use std::time::Duration;

use env_flags::env_flags;

env_flags! {
    /// Maximum total attempts (including the first) for a unary or streaming
    /// RPC before giving up. Only 5xx responses and connection errors count
    /// toward this; application-level RPC errors are never retried.
    pub SBX_TRANSPORT_MAX_RETRIES: u64 = 3;

    /// Base backoff factor in seconds used to compute the delay before retry
    /// attempt N: `factor * 2^(N-1)`, jittered by +/-20%.
    pub SBX_TRANSPORT_BACKOFF_FACTOR_SECS: f64 = 0.1, |value| value.parse::<f64>();

    /// Poll interval for the post-create/connect health gate.
    pub SBX_HEALTH_GATE_INTERVAL_MS: u64 = 300;

    /// Total time budget for the health gate before giving up and returning
    /// the handle anyway (the gate is advisory, not a hard requirement).
    pub SBX_HEALTH_GATE_TIMEOUT_MS: u64 = 5_000;

    /// Idle timeout while waiting for the next frame of a streaming RPC.
    pub SBX_STREAM_IDLE_TIMEOUT_MS: Duration = Duration::from_millis(300_000), |value| {
        value.parse().map(Duration::from_millis)
    };
}
