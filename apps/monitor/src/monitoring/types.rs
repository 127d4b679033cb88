use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Observed status of a target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Up,
    Down,
    /// Never produced by a check; the derived status of a target that has no
    /// recorded checks yet.
    #[default]
    Unknown,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Up => write!(f, "up"),
            CheckStatus::Down => write!(f, "down"),
            CheckStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// Immutable record of one completed check cycle (after retries resolve).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub status: CheckStatus,
    /// Protocol status code; 0 when not applicable (SSH, transport errors).
    #[serde(default)]
    pub status_code: u16,
    #[serde(default)]
    pub response_time_ms: u64,
    /// Present iff the check is down and no status code explains it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl CheckResult {
    pub fn up(response_time_ms: u64, status_code: u16) -> Self {
        Self {
            status: CheckStatus::Up,
            status_code,
            response_time_ms,
            error: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    pub fn down(response_time_ms: u64, status_code: u16, error: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Down,
            status_code,
            response_time_ms,
            error: Some(error.into()),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// A target that cannot be probed at all (missing endpoint/credential)
    /// resolves to a down result without any network call.
    pub fn config_error(message: impl Into<String>) -> Self {
        Self::down(0, 0, message)
    }
}

/// Rolling-window statistics over one target's checks. Recomputed fresh from
/// the checks list on every update; never maintained incrementally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Percentage of checks that were up, rounded to two decimals.
    pub uptime: f64,
    pub total_checks: usize,
    pub up_count: usize,
    pub down_count: usize,
    /// Mean response time over up checks only; `None` when the window has no
    /// up checks.
    pub avg_response_time: Option<u64>,
}

/// Per-target aggregate: the chronological checks list plus everything
/// derived from it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetHistory {
    pub checks: Vec<CheckResult>,
    /// Window name (`1h`, `24h`, `7d`, `30d`) to snapshot; `None` when the
    /// window contains no checks.
    #[serde(default)]
    pub stats: BTreeMap<String, Option<StatsSnapshot>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<CheckResult>,
    #[serde(default)]
    pub current_status: CheckStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&CheckStatus::Up).unwrap(), "\"up\"");
        assert_eq!(serde_json::to_string(&CheckStatus::Unknown).unwrap(), "\"unknown\"");
    }

    #[test]
    fn check_result_round_trips() {
        let result = CheckResult::down(120, 503, "HTTP status 503");
        let raw = serde_json::to_string(&result).unwrap();
        let back: CheckResult = serde_json::from_str(&raw).unwrap();
        assert_eq!(result, back);
    }

    #[test]
    fn up_results_carry_no_error() {
        let result = CheckResult::up(42, 200);
        assert_eq!(result.status, CheckStatus::Up);
        assert!(result.error.is_none());
        assert!(result.timestamp > 0);
    }
}
