//! Availability monitoring engine for the Ward dashboard.
//!
//! The dashboard's CRUD layer owns the configuration document; this crate
//! owns everything that happens between "a target is declared" and "an
//! operator sees its status": per-target timers, probing with retries,
//! history with rolling uptime stats, transition notifications, and the
//! daily digest.

pub mod config;
pub mod error;
pub mod monitoring;
pub mod report;
