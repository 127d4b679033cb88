use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use tracing::{info, warn};

use crate::config::SharedConfig;
use crate::error::NotificationError;
use crate::monitoring::history::HistoryStore;
use crate::monitoring::notify::Notifier;
use crate::monitoring::types::CheckStatus;

/// One line of the digest's agenda sections.
#[derive(Debug, Clone)]
pub struct AgendaItem {
    pub label: String,
    pub overdue: bool,
}

/// Recurring-payments collaborator. Owned by the dashboard's payments CRUD.
#[async_trait::async_trait]
pub trait PaymentSource: Send + Sync {
    async fn due_payments(&self) -> Vec<AgendaItem>;
}

/// Tasks collaborator. Owned by the dashboard's notes/tasks CRUD.
#[async_trait::async_trait]
pub trait TaskSource: Send + Sync {
    async fn due_tasks(&self) -> Vec<AgendaItem>;
}

/// Stand-in for deployments where the agenda collaborators are not wired up.
pub struct NoAgenda;

#[async_trait::async_trait]
impl PaymentSource for NoAgenda {
    async fn due_payments(&self) -> Vec<AgendaItem> {
        Vec::new()
    }
}

#[async_trait::async_trait]
impl TaskSource for NoAgenda {
    async fn due_tasks(&self) -> Vec<AgendaItem> {
        Vec::new()
    }
}

/// Composes and sends the once-per-day digest. Runs on its own timer,
/// independent of the per-target check timers.
pub struct DailyReporter {
    config: SharedConfig,
    history: Arc<HistoryStore>,
    payments: Arc<dyn PaymentSource>,
    tasks: Arc<dyn TaskSource>,
    notifier: Arc<dyn Notifier>,
}

impl DailyReporter {
    pub fn new(
        config: SharedConfig,
        history: Arc<HistoryStore>,
        payments: Arc<dyn PaymentSource>,
        tasks: Arc<dyn TaskSource>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self { config, history, payments, tasks, notifier }
    }

    /// Next occurrence of the configured `HH:MM`, computed from wall-clock
    /// now. Rolls to tomorrow when the time has already passed today; each
    /// re-arm starts from now again, so drift never accumulates across
    /// fires.
    pub fn next_occurrence(now: DateTime<Local>, time_of_day: &str) -> Option<DateTime<Local>> {
        let time = NaiveTime::parse_from_str(time_of_day, "%H:%M").ok()?;
        let mut next = now.date_naive().and_time(time);
        if next <= now.naive_local() {
            next = next.checked_add_days(Days::new(1))?;
        }
        Local.from_local_datetime(&next).earliest()
    }

    /// Self-perpetuating timer loop: sleep until the next configured
    /// time-of-day, fire, re-arm.
    pub async fn run(self: Arc<Self>) {
        loop {
            let time_of_day = self.config.read().telegram.daily_summary_time;
            let Some(next) = Self::next_occurrence(Local::now(), &time_of_day) else {
                warn!(%time_of_day, "invalid daily summary time, reports disabled");
                return;
            };

            info!(at = %next, "next daily report scheduled");
            let delay = (next - Local::now()).to_std().unwrap_or_default();
            tokio::time::sleep(delay).await;

            if !self.summary_enabled() {
                continue;
            }
            if let Err(e) = self.send_daily_report().await {
                warn!("daily report delivery failed: {e}");
            }
        }
    }

    /// Whether a firing should deliver, per the latest settings. Evaluated
    /// at fire time, not at startup, so toggling the summary through the
    /// CRUD layer arms or disarms the timer without a restart.
    fn summary_enabled(&self) -> bool {
        let telegram = self.config.read().telegram;
        telegram.enabled && telegram.daily_summary
    }

    /// Compose and deliver the digest now. The manual API trigger and the
    /// timer share this path.
    pub async fn send_daily_report(&self) -> Result<(), NotificationError> {
        let chat_id = self.config.read().telegram.chat_id;
        let text = self.compose().await;
        self.notifier.send(&chat_id, &text).await?;
        info!("daily report sent");
        Ok(())
    }

    async fn compose(&self) -> String {
        let mut text = format!("📋 Daily summary for {}\n", Local::now().format("%Y-%m-%d"));

        write_agenda(&mut text, "💳 Payments due", &self.payments.due_payments().await);
        write_agenda(&mut text, "✅ Tasks due", &self.tasks.due_tasks().await);

        let statuses = self.history.all();
        if statuses.is_empty() {
            text.push_str("\n📡 Monitoring: no targets checked yet\n");
        } else {
            let up = statuses
                .values()
                .filter(|h| h.current_status == CheckStatus::Up)
                .count();
            let _ = writeln!(text, "\n📡 Monitoring: {up}/{} up", statuses.len());

            let mut down: Vec<&str> = statuses
                .iter()
                .filter(|(_, h)| h.current_status == CheckStatus::Down)
                .map(|(id, _)| id.as_str())
                .collect();
            if !down.is_empty() {
                down.sort_unstable();
                let _ = writeln!(text, "Down: {}", down.join(", "));
            }
        }

        text
    }
}

fn write_agenda(text: &mut String, heading: &str, items: &[AgendaItem]) {
    if items.is_empty() {
        return;
    }
    let _ = writeln!(text, "\n{heading}:");
    for item in items {
        let suffix = if item.overdue { " (overdue)" } else { "" };
        let _ = writeln!(text, "  - {}{suffix}", item.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DashboardConfig, TelegramSettings};
    use crate::monitoring::testutil::RecordingNotifier;
    use crate::monitoring::types::CheckResult;

    struct FixedAgenda(Vec<AgendaItem>);

    #[async_trait::async_trait]
    impl PaymentSource for FixedAgenda {
        async fn due_payments(&self) -> Vec<AgendaItem> {
            self.0.clone()
        }
    }

    #[async_trait::async_trait]
    impl TaskSource for FixedAgenda {
        async fn due_tasks(&self) -> Vec<AgendaItem> {
            self.0.clone()
        }
    }

    fn local(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn past_time_rolls_to_tomorrow() {
        let next = DailyReporter::next_occurrence(local(2026, 8, 29, 9, 5), "09:00").unwrap();
        assert_eq!(next, local(2026, 8, 30, 9, 0));
    }

    #[test]
    fn future_time_fires_today() {
        let next = DailyReporter::next_occurrence(local(2026, 8, 29, 8, 55), "09:00").unwrap();
        assert_eq!(next, local(2026, 8, 29, 9, 0));
    }

    #[test]
    fn exact_time_rolls_to_tomorrow() {
        let next = DailyReporter::next_occurrence(local(2026, 8, 29, 9, 0), "09:00").unwrap();
        assert_eq!(next, local(2026, 8, 30, 9, 0));
    }

    #[test]
    fn unparseable_time_is_rejected() {
        assert!(DailyReporter::next_occurrence(local(2026, 8, 29, 9, 0), "9am").is_none());
    }

    #[tokio::test]
    async fn digest_includes_agenda_and_down_targets() {
        let dir = tempfile::tempdir().unwrap();
        let history = Arc::new(HistoryStore::new(dir.path()));
        history.record("plex", CheckResult::up(10, 200));
        history.record("nas", CheckResult::down(0, 0, "Timeout"));

        let config = SharedConfig::new(DashboardConfig {
            telegram: TelegramSettings { chat_id: "42".to_string(), ..Default::default() },
            ..Default::default()
        });
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = DailyReporter::new(
            config,
            history,
            Arc::new(FixedAgenda(vec![AgendaItem { label: "Rent".to_string(), overdue: true }])),
            Arc::new(FixedAgenda(vec![AgendaItem {
                label: "Rotate backups".to_string(),
                overdue: false,
            }])),
            notifier.clone(),
        );

        reporter.send_daily_report().await.unwrap();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "42");
        let text = &sent[0].1;
        assert!(text.contains("Rent (overdue)"));
        assert!(text.contains("Rotate backups"));
        assert!(text.contains("1/2 up"));
        assert!(text.contains("Down: nas"));
    }

    #[tokio::test]
    async fn summary_gate_follows_runtime_config_edits() {
        let dir = tempfile::tempdir().unwrap();
        let config = SharedConfig::new(DashboardConfig::default());
        let reporter = DailyReporter::new(
            config.clone(),
            Arc::new(HistoryStore::new(dir.path())),
            Arc::new(NoAgenda),
            Arc::new(NoAgenda),
            Arc::new(RecordingNotifier::default()),
        );

        // Disabled at startup does not matter; the gate is per firing.
        assert!(!reporter.summary_enabled());

        let mut cfg = config.read();
        cfg.telegram.enabled = true;
        cfg.telegram.daily_summary = true;
        config.replace(cfg);
        assert!(reporter.summary_enabled());

        let mut cfg = config.read();
        cfg.telegram.daily_summary = false;
        config.replace(cfg);
        assert!(!reporter.summary_enabled());
    }

    #[tokio::test]
    async fn empty_agenda_sections_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let config = SharedConfig::new(DashboardConfig::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let reporter = DailyReporter::new(
            config,
            Arc::new(HistoryStore::new(dir.path())),
            Arc::new(NoAgenda),
            Arc::new(NoAgenda),
            notifier.clone(),
        );

        reporter.send_daily_report().await.unwrap();

        let text = &notifier.sent()[0].1;
        assert!(!text.contains("Payments"));
        assert!(text.contains("no targets checked yet"));
    }
}
