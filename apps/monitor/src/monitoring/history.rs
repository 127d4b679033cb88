use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::PersistenceError;
use crate::monitoring::stats;
use crate::monitoring::types::{CheckResult, CheckStatus, TargetHistory};

/// Hard cap on checks kept per target.
pub const MAX_CHECKS: usize = 500;

/// On overflow the list is truncated to this many most-recent checks: half
/// the cap, one amortized truncation rather than per-write eviction.
pub const TRUNCATE_TO: usize = MAX_CHECKS / 2;

/// The snapshot is rewritten after this many recorded checks across all
/// targets, and unconditionally on graceful shutdown.
pub const SAVE_EVERY: u64 = 10;

const SNAPSHOT_FILE: &str = "monitor-history.json";

/// Append-only per-target log of check results, with the last-status map
/// used for transition detection. Different targets' ticks mutate the maps
/// concurrently; per-target ticks never overlap, so a target's entry has a
/// single writer at any moment.
pub struct HistoryStore {
    path: PathBuf,
    histories: RwLock<HashMap<String, TargetHistory>>,
    statuses: RwLock<HashMap<String, CheckStatus>>,
    recorded: AtomicU64,
}

impl HistoryStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(SNAPSHOT_FILE),
            histories: RwLock::new(HashMap::new()),
            statuses: RwLock::new(HashMap::new()),
            recorded: AtomicU64::new(0),
        }
    }

    /// Restore histories from the durable snapshot. An absent or unreadable
    /// snapshot means "no history yet" and is never fatal. Each target's
    /// current status is re-derived from the last entry of its checks list.
    pub fn load(&self) {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                warn!("failed to read history snapshot {}: {e}", self.path.display());
                return;
            }
        };

        let mut loaded: HashMap<String, TargetHistory> = match serde_json::from_str(&raw) {
            Ok(loaded) => loaded,
            Err(e) => {
                warn!("ignoring unreadable history snapshot {}: {e}", self.path.display());
                return;
            }
        };

        let mut statuses = HashMap::new();
        for (id, history) in loaded.iter_mut() {
            if let Some(last) = history.checks.last().cloned() {
                history.current_status = last.status;
                history.last_check = Some(last);
            } else {
                history.current_status = CheckStatus::Unknown;
                history.last_check = None;
            }
            statuses.insert(id.clone(), history.current_status);
        }

        info!(targets = loaded.len(), "restored monitoring history");
        *self.histories_mut() = loaded;
        *self.statuses_mut() = statuses;
    }

    /// Append one result, refresh the derived fields and rolling stats for
    /// that target, and return the previously observed status (for
    /// transition detection). Persists at the global check-count cadence.
    pub fn record(&self, target_id: &str, result: CheckResult) -> CheckStatus {
        let previous = {
            let mut histories = self.histories_mut();
            let history = histories.entry(target_id.to_string()).or_default();

            history.checks.push(result.clone());
            if history.checks.len() > MAX_CHECKS {
                let excess = history.checks.len() - TRUNCATE_TO;
                history.checks.drain(..excess);
                debug!(target_id, kept = TRUNCATE_TO, "truncated check history");
            }
            history.current_status = result.status;
            history.last_check = Some(result.clone());
            history.stats = stats::compute(&history.checks, Utc::now().timestamp_millis());

            self.statuses_mut()
                .insert(target_id.to_string(), result.status)
                .unwrap_or(CheckStatus::Unknown)
        };

        let recorded = self.recorded.fetch_add(1, Ordering::Relaxed) + 1;
        if recorded % SAVE_EVERY == 0
            && let Err(e) = self.save()
        {
            warn!("failed to persist history snapshot: {e}");
        }

        previous
    }

    pub fn get(&self, target_id: &str) -> Option<TargetHistory> {
        self.histories.read().unwrap_or_else(PoisonError::into_inner).get(target_id).cloned()
    }

    /// Point-in-time copy of every target's history.
    pub fn all(&self) -> HashMap<String, TargetHistory> {
        self.histories.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Most recently observed status for a target; `Unknown` when it has
    /// never been checked.
    pub fn last_status(&self, target_id: &str) -> CheckStatus {
        self.statuses
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(target_id)
            .copied()
            .unwrap_or(CheckStatus::Unknown)
    }

    /// Reset one target's record entirely. The next check starts from
    /// `Unknown` again.
    pub fn clear(&self, target_id: &str) {
        self.histories_mut().remove(target_id);
        self.statuses_mut().remove(target_id);
    }

    /// Drop checks older than the retention window. Targets whose history
    /// becomes empty are removed entirely. Applied at start/restart only.
    pub fn trim_older_than(&self, days: i64) {
        let cutoff_ms = Utc::now().timestamp_millis() - days * 86_400 * 1_000;
        let now_ms = Utc::now().timestamp_millis();

        let mut histories = self.histories_mut();
        let mut statuses = self.statuses_mut();
        histories.retain(|id, history| {
            let before = history.checks.len();
            history.checks.retain(|c| c.timestamp >= cutoff_ms);
            if history.checks.is_empty() {
                statuses.remove(id);
                return false;
            }
            if history.checks.len() != before {
                history.stats = stats::compute(&history.checks, now_ms);
            }
            true
        });
    }

    /// Serialize the whole map to the snapshot document, wholesale. The
    /// write goes to a temp file first and is renamed into place so a crash
    /// mid-write never leaves a torn document.
    pub fn save(&self) -> Result<(), PersistenceError> {
        let snapshot = self.all();
        let raw = serde_json::to_string(&snapshot)?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, raw)?;
        fs::rename(&tmp, &self.path)?;

        debug!(targets = snapshot.len(), "history snapshot written");
        Ok(())
    }

    fn histories_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, TargetHistory>> {
        self.histories.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn statuses_mut(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, CheckStatus>> {
        self.statuses.write().unwrap_or_else(PoisonError::into_inner)
    }
}
