//! Keyword notifications: subscriptions, ignored channels and message matching.

pub mod matcher;
pub mod repo;

pub use matcher::{Delivery, NotificationMatcher};
pub use repo::{IgnoredChannel, KeywordScope, KeywordSubscription, NotificationRepo};
