//! Shared fakes for monitoring tests. Probing and delivery are the only I/O
//! seams; everything else stays hermetic.

use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

use crate::config::MonitorTarget;
use crate::error::NotificationError;
use crate::monitoring::checker::Prober;
use crate::monitoring::notify::Notifier;
use crate::monitoring::types::CheckResult;

/// Replays a fixed script of results, then repeats the last one. Records
/// every probed target so tests can assert read-through resolution.
pub(crate) struct ScriptedProber {
    script: Mutex<Vec<CheckResult>>,
    pub calls: AtomicUsize,
    pub probed: Mutex<Vec<MonitorTarget>>,
}

impl ScriptedProber {
    pub(crate) fn new(mut script: Vec<CheckResult>) -> Self {
        script.reverse();
        Self { script: Mutex::new(script), calls: AtomicUsize::new(0), probed: Mutex::new(Vec::new()) }
    }

    pub(crate) fn probed_urls(&self) -> Vec<String> {
        self.probed.lock().unwrap().iter().filter_map(|t| t.url.clone()).collect()
    }
}

#[async_trait::async_trait]
impl Prober for ScriptedProber {
    async fn probe(&self, target: &MonitorTarget, _timeout: Duration) -> CheckResult {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.probed.lock().unwrap().push(target.clone());

        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop().unwrap()
        } else {
            script.last().cloned().unwrap_or_else(|| CheckResult::up(1, 200))
        }
    }
}

/// Always comes back up, but only after a fixed delay, and keeps a gauge of
/// how many checks were ever in flight at once.
pub(crate) struct SlowProber {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl SlowProber {
    pub(crate) fn new(delay: Duration) -> Self {
        Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Prober for SlowProber {
    async fn probe(&self, _target: &MonitorTarget, _timeout: Duration) -> CheckResult {
        use std::sync::atomic::Ordering::SeqCst;

        self.calls.fetch_add(1, SeqCst);
        let running = self.in_flight.fetch_add(1, SeqCst) + 1;
        self.max_in_flight.fetch_max(running, SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, SeqCst);
        CheckResult::up(self.delay.as_millis() as u64, 200)
    }
}

/// Captures (chat_id, text) pairs instead of delivering anywhere.
#[derive(Default)]
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub(crate) fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push((chat_id.to_string(), text.to_string()));
        Ok(())
    }
}
