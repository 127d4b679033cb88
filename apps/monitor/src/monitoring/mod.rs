//! The availability monitoring engine: prober, retry coordination, history,
//! rolling stats, transition notifications and the per-target scheduler.

pub mod checker;
pub mod history;
pub mod notify;
pub mod retry;
pub mod scheduler;
pub mod stats;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

pub use checker::{NetProber, Prober};
pub use history::HistoryStore;
pub use notify::{Notifier, TelegramNotifier};
pub use scheduler::Monitor;
pub use types::{CheckResult, CheckStatus, StatsSnapshot, TargetHistory};
