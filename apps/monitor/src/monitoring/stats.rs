use std::collections::BTreeMap;

use crate::monitoring::types::{CheckResult, CheckStatus, StatsSnapshot};

/// The rolling windows reported per target, as (name, length in seconds).
pub const WINDOWS: [(&str, i64); 4] =
    [("1h", 3_600), ("24h", 86_400), ("7d", 7 * 86_400), ("30d", 30 * 86_400)];

/// Recomputes every window snapshot from the full checks list, using the
/// given wall-clock "now" (epoch millis). Windows slide continuously, so
/// snapshots are always derived fresh; a window with no matching checks
/// reports `None` rather than a misleading 0%.
pub fn compute(checks: &[CheckResult], now_ms: i64) -> BTreeMap<String, Option<StatsSnapshot>> {
    WINDOWS
        .iter()
        .map(|&(name, secs)| (name.to_string(), window_snapshot(checks, now_ms - secs * 1_000)))
        .collect()
}

fn window_snapshot(checks: &[CheckResult], cutoff_ms: i64) -> Option<StatsSnapshot> {
    let mut total = 0usize;
    let mut up_count = 0usize;
    let mut up_time_sum = 0u64;

    for check in checks.iter().filter(|c| c.timestamp >= cutoff_ms) {
        total += 1;
        if check.status == CheckStatus::Up {
            up_count += 1;
            up_time_sum += check.response_time_ms;
        }
    }

    if total == 0 {
        return None;
    }

    let uptime = (up_count as f64 * 10_000.0 / total as f64).round() / 100.0;
    let avg_response_time =
        (up_count > 0).then(|| (up_time_sum as f64 / up_count as f64).round() as u64);

    Some(StatsSnapshot {
        uptime,
        total_checks: total,
        up_count,
        down_count: total - up_count,
        avg_response_time,
    })
}
