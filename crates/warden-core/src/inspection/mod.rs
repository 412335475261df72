//! Cross-server inspection of a single user.
//!
//! Two independent passes over the servers the bot belongs to: a ban scan
//! (with per-server failure tolerance and live progress) and a shared
//! membership check. Manual and automatic inspections both build on them.

pub mod report;

use std::{collections::BTreeSet, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::Semaphore;

use crate::{
    domain::{Server, ServerId, UserId},
    errors::Error,
    platform::port::PlatformClient,
    Result,
};

/// Aggregate of one inspection. Sets make the outcome independent of scan order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InspectionResult {
    pub banned_on: BTreeSet<ServerId>,
    /// Servers where the target is a current member (including the one they are on now).
    pub common_servers: BTreeSet<ServerId>,
    /// Servers whose ban list could not be read.
    pub failed: BTreeSet<ServerId>,
}

impl InspectionResult {
    /// No known bans and every ban list was readable.
    pub fn is_clean(&self) -> bool {
        self.banned_on.is_empty() && self.failed.is_empty()
    }

    /// Shared servers other than the one the user currently resides on.
    pub fn other_common_servers(&self) -> usize {
        self.common_servers.len().saturating_sub(1)
    }

    /// How many ban lists were actually read out of `total` servers.
    pub fn checked(&self, total: usize) -> usize {
        total.saturating_sub(self.failed.len())
    }
}

/// Ban pass: one ban-list lookup per server, sequentially.
///
/// A failed lookup lands the server in `failed` and the scan moves on.
/// `on_progress` receives the 1-based count of processed servers after each one.
pub async fn scan_user(
    platform: &dyn PlatformClient,
    target: UserId,
    servers: &[Server],
    on_progress: &mut (dyn FnMut(usize) + Send),
) -> InspectionResult {
    let mut result = InspectionResult::default();

    for (idx, server) in servers.iter().enumerate() {
        match platform.list_bans(server.id).await {
            Ok(bans) => {
                if bans.iter().any(|b| b.user.id == target) {
                    result.banned_on.insert(server.id);
                }
            }
            Err(e) => {
                tracing::debug!(server = %server.id, "ban list unavailable: {e}");
                result.failed.insert(server.id);
            }
        }
        on_progress(idx + 1);
    }

    result
}

/// Membership pass. A failed lookup counts as "not a member".
pub async fn common_servers(
    platform: &dyn PlatformClient,
    target: UserId,
    servers: &[Server],
) -> BTreeSet<ServerId> {
    let mut common = BTreeSet::new();
    for server in servers {
        match platform.get_member(server.id, target).await {
            Ok(Some(_)) => {
                common.insert(server.id);
            }
            Ok(None) => {}
            Err(e) => {
                tracing::debug!(server = %server.id, "member lookup failed, treating as absent: {e}");
            }
        }
    }
    common
}

/// Account age tiers derived from the creation timestamp.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountAge {
    /// Less than one day old.
    NewlyCreated,
    /// Less than one week old.
    Recent,
    Established,
}

impl AccountAge {
    pub fn classify(created_at: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let age = now.signed_duration_since(created_at);
        if age < Duration::days(1) {
            AccountAge::NewlyCreated
        } else if age < Duration::days(7) {
            AccountAge::Recent
        } else {
            AccountAge::Established
        }
    }

    pub fn is_new(&self) -> bool {
        !matches!(self, AccountAge::Established)
    }
}

/// Everything a report needs about one inspected user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inspection {
    pub target: UserId,
    pub result: InspectionResult,
    pub total_servers: usize,
    pub created_at: DateTime<Utc>,
    pub account_age: AccountAge,
}

/// Runs both passes against the live server list, bounding concurrent scans.
#[derive(Clone)]
pub struct Inspector {
    platform: Arc<dyn PlatformClient>,
    slots: Arc<Semaphore>,
}

impl Inspector {
    pub fn new(platform: Arc<dyn PlatformClient>, max_concurrent_scans: usize) -> Self {
        Self {
            platform,
            slots: Arc::new(Semaphore::new(max_concurrent_scans.max(1))),
        }
    }

    pub fn platform(&self) -> &Arc<dyn PlatformClient> {
        &self.platform
    }

    pub async fn inspect(
        &self,
        target: UserId,
        on_progress: &mut (dyn FnMut(usize) + Send),
    ) -> Result<Inspection> {
        let servers = self.platform.list_servers().await?;
        self.inspect_on(target, &servers, on_progress).await
    }

    /// Inspect against an already fetched server list.
    pub async fn inspect_on(
        &self,
        target: UserId,
        servers: &[Server],
        on_progress: &mut (dyn FnMut(usize) + Send),
    ) -> Result<Inspection> {
        let _permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| Error::External("inspection slots closed".to_string()))?;

        let mut result = scan_user(self.platform.as_ref(), target, servers, on_progress).await;
        result.common_servers = common_servers(self.platform.as_ref(), target, servers).await;

        let created_at = target.created_at();
        Ok(Inspection {
            target,
            result,
            total_servers: servers.len(),
            created_at,
            account_age: AccountAge::classify(created_at, Utc::now()),
        })
    }
}
