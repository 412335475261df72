//! Core of the warden moderation bot.
//!
//! Keyword notifications, cross-server inspections and automatic inspection
//! triggers, built against ports (traits) so the chat platform, persistence and
//! error tracking live in adapter crates.

pub mod auto_inspect;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod domain;
pub mod errors;
pub mod inspection;
pub mod logging;
pub mod notifications;
pub mod permissions;
pub mod platform;
pub mod ports;
pub mod router;
pub mod server_config;
pub mod settings_cache;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
