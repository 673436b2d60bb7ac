use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Notify;

/// Make a `Notify` that fires when SIGINT occurs, used to cancel in-flight
/// process/PTY streams on Ctrl-C the way a foreground `commands.run` would.
pub fn notify_on_sigint() -> Arc<Notify> {
    let notify = Arc::new(Notify::new());

    tokio::spawn({
        let notify = Arc::clone(&notify);
        async move {
            loop {
                tokio::signal::ctrl_c().await.ok();
                notify.notify_waiters();
            }
        }
    });

    notify
}

/// Exponential backoff with jitter: `factor * 2^(attempt-1)`, +/-20%.
/// `attempt` is 1-indexed (the first retry is attempt 1).
pub(crate) fn backoff(attempt: u64, factor: Duration) -> Duration {
    let base = factor.as_secs_f64() * (1u64 << attempt.saturating_sub(1).min(20)) as f64;
    let jitter = rand::rng().random_range(0.8..1.2);
    Duration::from_secs_f64(base * jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_exponentially_within_jitter_bounds() {
        let factor = Duration::from_millis(100);
        for attempt in 1..5 {
            let d = backoff(attempt, factor);
            let base_ms = 100.0 * (1u64 << (attempt - 1)) as f64;
            assert!(d.as_secs_f64() * 1000.0 >= base_ms * 0.79);
            assert!(d.as_secs_f64() * 1000.0 <= base_ms * 1.21);
        }
    }
}
