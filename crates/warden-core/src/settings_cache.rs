//! Process-wide read-through cache of keyword subscriptions and ignored channels.
//!
//! The cache is never mutated in place: a reload builds a complete
//! [`SettingsSnapshot`] and swaps the shared pointer, so readers always see one
//! consistent generation. Writers go to the persistence layer first and then ask
//! for an asynchronous reload; a reader may briefly observe the previous snapshot.

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{ChannelId, ServerId},
    notifications::repo::{KeywordSubscription, NotificationRepo},
    Result,
};

#[derive(Clone, Debug, Default)]
pub struct SettingsSnapshot {
    /// Monotonic reload counter; 0 is the empty startup snapshot.
    pub generation: u64,
    pub subscriptions: Vec<KeywordSubscription>,
    pub ignored_channels: HashSet<ChannelId>,
    pub loaded_at: Option<DateTime<Utc>>,
}

impl SettingsSnapshot {
    pub fn is_ignored(&self, channel_id: ChannelId) -> bool {
        self.ignored_channels.contains(&channel_id)
    }

    /// Subscriptions that apply to a server, in stored order.
    pub fn subscriptions_for(
        &self,
        server_id: ServerId,
    ) -> impl Iterator<Item = &KeywordSubscription> + '_ {
        self.subscriptions
            .iter()
            .filter(move |s| s.scope.applies_to(server_id))
    }
}

pub struct SettingsCache {
    repo: NotificationRepo,
    current: RwLock<Arc<SettingsSnapshot>>,
    next_generation: AtomicU64,
}

impl SettingsCache {
    pub fn new(repo: NotificationRepo) -> Self {
        Self {
            repo,
            current: RwLock::new(Arc::new(SettingsSnapshot::default())),
            next_generation: AtomicU64::new(1),
        }
    }

    pub fn repo(&self) -> &NotificationRepo {
        &self.repo
    }

    /// The current snapshot. Cheap: clones a pointer under a short read lock.
    pub fn snapshot(&self) -> Arc<SettingsSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reload everything from the persistence layer and publish a new snapshot.
    ///
    /// Overlapping reloads are resolved by generation: a reload that started
    /// earlier never replaces one that started later.
    pub async fn reload(&self) -> Result<Arc<SettingsSnapshot>> {
        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);

        let subscriptions = self.repo.all_subscriptions().await?;
        let ignored_channels = self
            .repo
            .all_ignored_channels()
            .await?
            .into_iter()
            .map(|c| c.channel_id)
            .collect::<HashSet<_>>();

        let fresh = Arc::new(SettingsSnapshot {
            generation,
            subscriptions,
            ignored_channels,
            loaded_at: Some(Utc::now()),
        });

        let mut slot = self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.generation > generation {
            return Ok(slot.clone());
        }
        *slot = fresh.clone();
        drop(slot);

        tracing::info!(
            keywords = fresh.subscriptions.len(),
            ignored_channels = fresh.ignored_channels.len(),
            generation,
            "refreshed notification settings cache"
        );
        Ok(fresh)
    }

    /// Fire-and-forget reload after a write committed.
    pub fn spawn_reload(self: &Arc<Self>) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = cache.reload().await {
                tracing::warn!("settings cache reload failed: {e}");
            }
        })
    }

    /// Periodically reload until `cancel` fires.
    pub fn spawn_refresh_loop(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }
                if let Err(e) = cache.reload().await {
                    tracing::warn!("periodic settings cache reload failed: {e}");
                }
            }
            tracing::debug!("settings cache refresh loop stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::UserId,
        notifications::repo::KeywordScope,
        store::MemoryStore,
    };

    fn cache() -> Arc<SettingsCache> {
        Arc::new(SettingsCache::new(NotificationRepo::new(Arc::new(
            MemoryStore::new(),
        ))))
    }

    #[tokio::test]
    async fn starts_empty_and_reload_publishes_new_snapshot() {
        let cache = cache();
        let before = cache.snapshot();
        assert_eq!(before.generation, 0);
        assert!(before.subscriptions.is_empty());

        cache
            .repo()
            .add_subscription("cat", KeywordScope::Global, UserId(1))
            .await
            .unwrap();
        cache
            .repo()
            .add_ignored_channel(ServerId(1), ChannelId(5))
            .await
            .unwrap();

        // Writes are invisible until the next reload.
        assert!(cache.snapshot().subscriptions.is_empty());

        cache.reload().await.unwrap();
        let after = cache.snapshot();
        assert_eq!(after.subscriptions.len(), 1);
        assert!(after.is_ignored(ChannelId(5)));
        assert!(after.loaded_at.is_some());

        // Old readers keep their consistent view.
        assert!(before.subscriptions.is_empty());
    }

    #[tokio::test]
    async fn subscriptions_for_filters_by_scope() {
        let cache = cache();
        let repo = cache.repo();
        repo.add_subscription("a", KeywordScope::Server(ServerId(1)), UserId(1))
            .await
            .unwrap();
        repo.add_subscription("b", KeywordScope::Server(ServerId(2)), UserId(1))
            .await
            .unwrap();
        repo.add_subscription("c", KeywordScope::Global, UserId(1))
            .await
            .unwrap();
        cache.reload().await.unwrap();

        let snap = cache.snapshot();
        let on_one: Vec<_> = snap
            .subscriptions_for(ServerId(1))
            .map(|s| s.keyword.as_str())
            .collect();
        assert_eq!(on_one, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn generations_increase_and_spawned_reload_completes() {
        let cache = cache();
        let first = cache.reload().await.unwrap().generation;
        cache.spawn_reload().await.unwrap();
        assert!(cache.snapshot().generation > first);
    }

    #[tokio::test]
    async fn refresh_loop_stops_on_cancel() {
        let cache = cache();
        let cancel = CancellationToken::new();
        let handle = cache.spawn_refresh_loop(Duration::from_millis(5), cancel.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        cancel.cancel();
        handle.await.unwrap();
        assert!(cache.snapshot().generation >= 1);
    }
}
