use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::{MonitorTarget, TelegramSettings};
use crate::error::NotificationError;
use crate::monitoring::types::{CheckResult, CheckStatus};

/// The two notification-worthy transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionEdge {
    /// Any transition into down from a known-up or never-checked state.
    Down,
    /// Recovery: down to up. A first check coming up quietly is not news.
    Recovery,
}

/// Classifies a status change. `None` means nothing fires: unchanged status,
/// or an unknown target coming up.
pub fn transition_edge(previous: CheckStatus, new: CheckStatus) -> Option<TransitionEdge> {
    match (previous, new) {
        (CheckStatus::Down, CheckStatus::Up) => Some(TransitionEdge::Recovery),
        (CheckStatus::Down, _) => None,
        (_, CheckStatus::Down) => Some(TransitionEdge::Down),
        _ => None,
    }
}

/// Delivery channel seam. The production implementation talks to the
/// Telegram Bot API; tests substitute a recorder.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), NotificationError>;
}

/// Telegram Bot API delivery via `sendMessage`.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::ChannelUnavailable(e.to_string()))?;

        Ok(Self { client, api_url: format!("https://api.telegram.org/bot{bot_token}/sendMessage") })
    }

    #[cfg(test)]
    fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[async_trait::async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: &str, text: &str) -> Result<(), NotificationError> {
        let payload = serde_json::json!({ "chat_id": chat_id, "text": text });

        let response = self
            .client
            .post(&self.api_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            return Err(NotificationError::Delivery(format!(
                "Telegram API returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub chat_id: String,
    pub text: String,
}

/// Decides whether a check result fires a notification and, if so, where it
/// goes. Pure: the queueing and delivery side effects live elsewhere.
pub fn plan_notification(
    settings: &TelegramSettings,
    target: &MonitorTarget,
    result: &CheckResult,
    previous: CheckStatus,
) -> Option<OutboundMessage> {
    if !settings.enabled {
        return None;
    }
    let edge = transition_edge(previous, result.status)?;

    let (gate, routed) = match edge {
        TransitionEdge::Down => (settings.notify_down, settings.down_chat_id.as_ref()),
        TransitionEdge::Recovery => (settings.notify_up, settings.up_chat_id.as_ref()),
    };
    if !gate {
        return None;
    }

    let chat_id = routed.unwrap_or(&settings.chat_id).clone();
    Some(OutboundMessage { chat_id, text: format_message(target, result, edge) })
}

fn format_message(target: &MonitorTarget, result: &CheckResult, edge: TransitionEdge) -> String {
    let address = target.endpoint().unwrap_or_else(|| "unconfigured".to_string());
    let when = Local::now().format("%Y-%m-%d %H:%M:%S");

    match edge {
        TransitionEdge::Down => {
            let reason = match (&result.error, result.status_code) {
                (Some(error), _) => error.clone(),
                (None, 0) => "check failed".to_string(),
                (None, code) => format!("HTTP status {code}"),
            };
            format!(
                "🔴 {} is DOWN\nAddress: {address}\nReason: {reason}\nTime: {when}",
                target.display_name()
            )
        }
        TransitionEdge::Recovery => format!(
            "🟢 {} is UP\nAddress: {address}\nResponse time: {} ms\nTime: {when}",
            target.display_name(),
            result.response_time_ms
        ),
    }
}

/// Fire-and-forget dispatch: ticks enqueue, a dedicated task delivers. A
/// slow or failing channel can never delay a check; on a full queue the
/// message is dropped and logged.
pub struct NotificationEngine {
    tx: mpsc::Sender<OutboundMessage>,
}

const OUTBOUND_QUEUE_DEPTH: usize = 64;

impl NotificationEngine {
    pub fn start(notifier: Arc<dyn Notifier>) -> Self {
        let (tx, mut rx) = mpsc::channel::<OutboundMessage>(OUTBOUND_QUEUE_DEPTH);

        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match notifier.send(&message.chat_id, &message.text).await {
                    Ok(()) => debug!(chat = %message.chat_id, "notification delivered"),
                    // Best effort only: failures are logged, never retried.
                    Err(e) => warn!("{e}"),
                }
            }
        });

        Self { tx }
    }

    /// Evaluate a status change against the notification settings and
    /// enqueue at most one message. Non-blocking.
    pub fn maybe_notify(
        &self,
        settings: &TelegramSettings,
        target: &MonitorTarget,
        result: &CheckResult,
        previous: CheckStatus,
    ) {
        if let Some(message) = plan_notification(settings, target, result, previous) {
            self.enqueue(message);
        }
    }

    pub fn enqueue(&self, message: OutboundMessage) {
        if self.tx.try_send(message).is_err() {
            warn!("notification queue full, dropping message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TargetKind;

    fn target() -> MonitorTarget {
        MonitorTarget {
            id: "plex".to_string(),
            name: "Plex".to_string(),
            kind: TargetKind::Http,
            url: Some("http://192.168.1.10:32400".to_string()),
            ssh: None,
            enabled: true,
            interval: None,
            timeout: None,
            retries: None,
        }
    }

    fn settings() -> TelegramSettings {
        TelegramSettings {
            enabled: true,
            chat_id: "42".to_string(),
            ..TelegramSettings::default()
        }
    }

    #[test]
    fn edge_table() {
        use CheckStatus::*;
        assert_eq!(transition_edge(Unknown, Down), Some(TransitionEdge::Down));
        assert_eq!(transition_edge(Up, Down), Some(TransitionEdge::Down));
        assert_eq!(transition_edge(Down, Up), Some(TransitionEdge::Recovery));
        assert_eq!(transition_edge(Down, Down), None);
        assert_eq!(transition_edge(Up, Up), None);
        assert_eq!(transition_edge(Unknown, Up), None);
    }

    #[test]
    fn first_down_fires_when_gate_open() {
        let result = CheckResult::down(10, 0, "Timeout");
        let message =
            plan_notification(&settings(), &target(), &result, CheckStatus::Unknown).unwrap();

        assert_eq!(message.chat_id, "42");
        assert!(message.text.contains("Plex is DOWN"));
        assert!(message.text.contains("Reason: Timeout"));
        assert!(message.text.contains("192.168.1.10:32400"));
    }

    #[test]
    fn disabled_gates_suppress_silently() {
        let mut s = settings();
        s.notify_down = false;
        let result = CheckResult::down(10, 0, "Timeout");
        assert!(plan_notification(&s, &target(), &result, CheckStatus::Unknown).is_none());

        let mut s = settings();
        s.notify_up = false;
        let result = CheckResult::up(42, 200);
        assert!(plan_notification(&s, &target(), &result, CheckStatus::Down).is_none());

        let mut s = settings();
        s.enabled = false;
        let result = CheckResult::down(10, 0, "Timeout");
        assert!(plan_notification(&s, &target(), &result, CheckStatus::Up).is_none());
    }

    #[test]
    fn recovery_reports_response_time() {
        let result = CheckResult::up(42, 200);
        let message = plan_notification(&settings(), &target(), &result, CheckStatus::Down).unwrap();

        assert!(message.text.contains("Plex is UP"));
        assert!(message.text.contains("Response time: 42 ms"));
    }

    #[test]
    fn unchanged_status_fires_nothing() {
        let result = CheckResult::down(10, 0, "Timeout");
        assert!(plan_notification(&settings(), &target(), &result, CheckStatus::Down).is_none());
    }

    #[test]
    fn per_edge_routing_overrides_the_default_chat() {
        let mut s = settings();
        s.down_chat_id = Some("alerts".to_string());

        let down = CheckResult::down(10, 0, "Timeout");
        let message = plan_notification(&s, &target(), &down, CheckStatus::Up).unwrap();
        assert_eq!(message.chat_id, "alerts");

        let up = CheckResult::up(5, 200);
        let message = plan_notification(&s, &target(), &up, CheckStatus::Down).unwrap();
        assert_eq!(message.chat_id, "42");
    }

    #[test]
    fn telegram_url_embeds_the_bot_token() {
        let notifier = TelegramNotifier::new("123:abc").unwrap();
        assert_eq!(notifier.api_url(), "https://api.telegram.org/bot123:abc/sendMessage");
    }
}
