use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::config::{MonitorTarget, SharedConfig, TargetKind};
use crate::monitoring::checker::Prober;
use crate::monitoring::history::HistoryStore;
use crate::monitoring::notify::{NotificationEngine, Notifier};
use crate::monitoring::retry;
use crate::monitoring::types::{CheckResult, TargetHistory};

/// One running timer. Dropping it (removing the map entry) signals the task
/// to stop; the signal is observed between ticks, never mid-check.
struct TargetTask {
    epoch: u64,
    _stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// The availability monitoring engine: one independent timer task per
/// monitored target, reconciled against the shared configuration.
///
/// Each tick re-resolves its target from the configuration document, so CRUD
/// edits to a target apply at its next firing without the timer being
/// restarted. Global settings only change through `start`/`restart`.
///
/// Ticks for one target are sequential by construction (a single task loop,
/// and a replacement task waits for its predecessor to finish before its
/// first tick); firings missed while a check ran long are skipped, so the
/// checks list stays ordered by time. Ticks for different targets run
/// concurrently.
pub struct Monitor {
    config: SharedConfig,
    history: Arc<HistoryStore>,
    prober: Arc<dyn Prober>,
    notifications: NotificationEngine,
    tasks: Mutex<HashMap<String, TargetTask>>,
    epoch: AtomicU64,
}

impl Monitor {
    pub fn new(
        config: SharedConfig,
        history: Arc<HistoryStore>,
        prober: Arc<dyn Prober>,
        notifier: Arc<dyn Notifier>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            history,
            prober,
            notifications: NotificationEngine::start(notifier),
            tasks: Mutex::new(HashMap::new()),
            epoch: AtomicU64::new(0),
        })
    }

    /// Full reconciliation: tear down every running timer, drop history
    /// beyond the retention window, then re-derive the active set from the
    /// latest configuration. The only path on which global settings
    /// (interval/timeout/retries/retention) take effect.
    pub fn start(self: &Arc<Self>) {
        // Keep the old handles: a retained target's replacement task waits
        // for its predecessor before ticking.
        let mut old = std::mem::take(&mut *self.tasks_lock());

        let cfg = self.config.read();
        self.history.trim_older_than(cfg.monitoring.history_days);

        if !cfg.monitoring.enabled {
            info!("monitoring is disabled, no timers started");
            return;
        }

        let eligible = self.config.schedulable_targets();
        let started = eligible.len();
        for (id, target) in eligible {
            let predecessor = old.remove(&id).map(|t| t.handle);
            self.spawn_target(&target, target.interval_secs(&cfg.monitoring), predecessor);
        }
        info!(targets = started, "monitoring started");
    }

    pub fn restart(self: &Arc<Self>) {
        info!("restarting monitoring");
        self.start();
    }

    /// Stop every timer and flush history to disk. In-flight checks are not
    /// interrupted, but nothing further is scheduled.
    pub fn stop(&self) {
        self.tasks_lock().clear();
        if let Err(e) = self.history.save() {
            tracing::warn!("failed to flush history on stop: {e}");
        }
        info!("monitoring stopped");
    }

    /// Reconcile a single target after a CRUD edit: its timer is torn down
    /// and re-created only if the target is still eligible under the latest
    /// configuration.
    pub fn update_target_monitoring(self: &Arc<Self>, target_id: &str) {
        let predecessor = self.tasks_lock().remove(target_id).map(|t| t.handle);

        let cfg = self.config.read();
        if !cfg.monitoring.enabled {
            return;
        }
        if let Some(target) = self.config.target(target_id)
            && target.enabled
            && target.is_probeable()
        {
            self.spawn_target(&target, target.interval_secs(&cfg.monitoring), predecessor);
        }
    }

    pub fn stop_target_monitoring(&self, target_id: &str) {
        if self.tasks_lock().remove(target_id).is_some() {
            debug!(target_id, "target monitoring stopped");
        }
    }

    /// On-demand single probe of an arbitrary URL, bypassing the scheduler
    /// and history entirely.
    pub async fn check_url(&self, url: &str, timeout_ms: u64) -> CheckResult {
        let target = MonitorTarget {
            id: String::new(),
            name: String::new(),
            kind: TargetKind::Http,
            url: Some(url.to_string()),
            ssh: None,
            enabled: true,
            interval: None,
            timeout: None,
            retries: None,
        };
        self.prober.probe(&target, Duration::from_millis(timeout_ms.max(1))).await
    }

    pub fn all_statuses(&self) -> HashMap<String, TargetHistory> {
        self.history.all()
    }

    pub fn target_status(&self, target_id: &str) -> Option<TargetHistory> {
        self.history.get(target_id)
    }

    /// Ids of targets that currently have a timer.
    pub fn active_targets(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tasks_lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn spawn_target(
        self: &Arc<Self>,
        target: &MonitorTarget,
        interval_secs: u64,
        predecessor: Option<JoinHandle<()>>,
    ) {
        let mut tasks = self.tasks_lock();
        if let Some(existing) = tasks.get(&target.id)
            && !existing.handle.is_finished()
        {
            return;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::Relaxed);
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let monitor = Arc::clone(self);
        let id = target.id.clone();

        let handle = tokio::spawn(async move {
            // The predecessor for this id may still be mid-check. Wait it
            // out so two checks for one target never run concurrently.
            if let Some(prev) = predecessor {
                let _ = prev.await;
            }

            let mut timer = interval(Duration::from_secs(interval_secs.max(1)));
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    // Fires when the stop handle is dropped. Only observed
                    // between ticks; a tick in progress always completes.
                    _ = stop_rx.changed() => break,
                    // First tick fires immediately so a freshly scheduled
                    // target shows a status without waiting a full interval.
                    _ = timer.tick() => {
                        if !monitor.tick(&id).await {
                            break;
                        }
                    }
                }
            }
            monitor.remove_task(&id, epoch);
        });

        debug!(target_id = %target.id, interval_secs, "target monitoring scheduled");
        tasks.insert(target.id.clone(), TargetTask { epoch, _stop: stop_tx, handle });
    }

    /// One check cycle. Returns false when the timer should stop because the
    /// target no longer exists, was disabled, or monitoring as a whole was
    /// turned off.
    async fn tick(&self, target_id: &str) -> bool {
        let cfg = self.config.read();
        if !cfg.monitoring.enabled {
            debug!(target_id, "monitoring disabled, stopping timer");
            return false;
        }
        let Some(target) = cfg.targets.iter().find(|t| t.id == target_id).cloned() else {
            debug!(target_id, "target removed, stopping timer");
            return false;
        };
        if !target.enabled || !target.is_probeable() {
            debug!(target_id, "target no longer monitorable, stopping timer");
            return false;
        }

        let timeout = Duration::from_secs(target.timeout_secs(&cfg.monitoring));
        let retries = target.retry_count(&cfg.monitoring);
        let result =
            retry::check_with_retries(self.prober.as_ref(), &target, timeout, retries).await;

        debug!(target_id = %target.id, status = %result.status, ms = result.response_time_ms, "check completed");

        let previous = self.history.record(&target.id, result.clone());
        self.notifications.maybe_notify(&cfg.telegram, &target, &result, previous);
        true
    }

    /// Tasks remove their own map entry on voluntary exit. The epoch guard
    /// keeps a stale task from removing a successor registered under the
    /// same target id.
    fn remove_task(&self, target_id: &str, epoch: u64) {
        let mut tasks = self.tasks_lock();
        if tasks.get(target_id).is_some_and(|t| t.epoch == epoch) {
            tasks.remove(target_id);
        }
    }

    fn tasks_lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, TargetTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
