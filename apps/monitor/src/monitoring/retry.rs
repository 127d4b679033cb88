use std::time::Duration;

use tracing::debug;

use crate::config::MonitorTarget;
use crate::monitoring::checker::Prober;
use crate::monitoring::types::{CheckResult, CheckStatus};

/// Fixed delay between probe attempts. Constant, not exponential; the whole
/// cycle must finish well inside the tick interval.
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// Runs up to `retries + 1` probe attempts and produces the one
/// authoritative result for this check cycle. Short-circuits on the first
/// up result; when every attempt fails, the last attempt's result is
/// returned as-is so its error reflects the final failure.
pub async fn check_with_retries(
    prober: &dyn Prober,
    target: &MonitorTarget,
    timeout: Duration,
    retries: u32,
) -> CheckResult {
    let attempts = retries + 1;
    let mut last = None;

    for attempt in 1..=attempts {
        let result = prober.probe(target, timeout).await;
        if result.status == CheckStatus::Up {
            return result;
        }
        debug!(target_id = %target.id, attempt, attempts, "check attempt failed");
        last = Some(result);

        if attempt < attempts {
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
    }

    // attempts >= 1, so the loop always ran at least once.
    last.unwrap_or_else(|| CheckResult::config_error("no check attempt was made"))
}
