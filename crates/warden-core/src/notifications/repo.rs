use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    domain::{ChannelId, ServerId, UserId},
    errors::Error,
    store::{from_document, to_document, DocumentStore, Filter},
    Result,
};

pub const NOTIFICATIONS_COLLECTION: &str = "notifications";
pub const IGNORED_CHANNELS_COLLECTION: &str = "notifications_ignored_channels";

const GLOBAL_SCOPE: &str = "global";

/// Where a keyword subscription applies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum KeywordScope {
    Global,
    Server(ServerId),
}

impl KeywordScope {
    pub fn applies_to(&self, server_id: ServerId) -> bool {
        match self {
            KeywordScope::Global => true,
            KeywordScope::Server(id) => *id == server_id,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, KeywordScope::Global)
    }
}

impl From<KeywordScope> for String {
    fn from(scope: KeywordScope) -> String {
        match scope {
            KeywordScope::Global => GLOBAL_SCOPE.to_string(),
            KeywordScope::Server(id) => id.0.to_string(),
        }
    }
}

impl TryFrom<String> for KeywordScope {
    type Error = Error;

    fn try_from(raw: String) -> Result<KeywordScope> {
        if raw == GLOBAL_SCOPE {
            return Ok(KeywordScope::Global);
        }
        raw.parse::<u64>()
            .map(|id| KeywordScope::Server(ServerId(id)))
            .map_err(|_| Error::Store(format!("invalid keyword scope {raw:?}")))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSubscription {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub keyword: String,
    pub scope: KeywordScope,
    pub user_id: UserId,
    #[serde(default)]
    pub triggered: u64,
}

/// A channel exempt from all keyword matching.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredChannel {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub server_id: ServerId,
    pub channel_id: ChannelId,
}

/// Typed access to the keyword and ignored-channel collections.
///
/// Clones share one counter lock, so trigger increments from concurrent
/// matches never overwrite each other.
#[derive(Clone)]
pub struct NotificationRepo {
    store: Arc<dyn DocumentStore>,
    counter_lock: Arc<Mutex<()>>,
}

impl NotificationRepo {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            counter_lock: Arc::new(Mutex::new(())),
        }
    }

    pub async fn all_subscriptions(&self) -> Result<Vec<KeywordSubscription>> {
        self.store
            .find(NOTIFICATIONS_COLLECTION, &Filter::new())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn all_ignored_channels(&self) -> Result<Vec<IgnoredChannel>> {
        self.store
            .find(IGNORED_CHANNELS_COLLECTION, &Filter::new())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn add_subscription(
        &self,
        keyword: &str,
        scope: KeywordScope,
        user_id: UserId,
    ) -> Result<KeywordSubscription> {
        let mut sub = KeywordSubscription {
            id: String::new(),
            keyword: keyword.to_string(),
            scope,
            user_id,
            triggered: 0,
        };
        sub.id = self
            .store
            .insert(NOTIFICATIONS_COLLECTION, to_document(&sub)?)
            .await?;
        Ok(sub)
    }

    /// The caller's subscription with exactly this keyword, scoped to the server or global.
    pub async fn find_subscription(
        &self,
        server_id: ServerId,
        user_id: UserId,
        keyword: &str,
    ) -> Result<Option<KeywordSubscription>> {
        let filter = Filter::new()
            .eq("user_id", user_id.0)
            .eq("keyword", keyword);
        for doc in self.store.find(NOTIFICATIONS_COLLECTION, &filter).await? {
            let sub: KeywordSubscription = from_document(doc)?;
            if sub.scope.applies_to(server_id) {
                return Ok(Some(sub));
            }
        }
        Ok(None)
    }

    /// Subscriptions of a user visible on a server, most triggered first.
    pub async fn subscriptions_for(
        &self,
        server_id: ServerId,
        user_id: UserId,
    ) -> Result<Vec<KeywordSubscription>> {
        let filter = Filter::new().eq("user_id", user_id.0);
        let mut subs = self
            .store
            .find(NOTIFICATIONS_COLLECTION, &filter)
            .await?
            .into_iter()
            .map(from_document::<KeywordSubscription>)
            .collect::<Result<Vec<_>>>()?;
        subs.retain(|s| s.scope.applies_to(server_id));
        subs.sort_by(|a, b| b.triggered.cmp(&a.triggered));
        Ok(subs)
    }

    pub async fn delete_subscription(&self, id: &str) -> Result<bool> {
        let removed = self
            .store
            .delete(NOTIFICATIONS_COLLECTION, &Filter::by_id(id))
            .await?;
        Ok(removed > 0)
    }

    /// Bump the trigger counter. The read-modify-write runs under the counter lock.
    pub async fn increment_triggered(&self, id: &str) -> Result<u64> {
        let _serialized = self.counter_lock.lock().await;
        let Some(doc) = self
            .store
            .find_one(NOTIFICATIONS_COLLECTION, &Filter::by_id(id))
            .await?
        else {
            return Err(Error::Store(format!("keyword subscription {id} not found")));
        };
        let mut sub: KeywordSubscription = from_document(doc)?;
        sub.triggered += 1;
        self.store
            .update(NOTIFICATIONS_COLLECTION, to_document(&sub)?)
            .await?;
        Ok(sub.triggered)
    }

    pub async fn ignored_channel(&self, channel_id: ChannelId) -> Result<Option<IgnoredChannel>> {
        self.store
            .find_one(
                IGNORED_CHANNELS_COLLECTION,
                &Filter::new().eq("channel_id", channel_id.0),
            )
            .await?
            .map(from_document)
            .transpose()
    }

    pub async fn ignored_channels_for(&self, server_id: ServerId) -> Result<Vec<IgnoredChannel>> {
        self.store
            .find(
                IGNORED_CHANNELS_COLLECTION,
                &Filter::new().eq("server_id", server_id.0),
            )
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }

    pub async fn add_ignored_channel(
        &self,
        server_id: ServerId,
        channel_id: ChannelId,
    ) -> Result<IgnoredChannel> {
        let mut entry = IgnoredChannel {
            id: String::new(),
            server_id,
            channel_id,
        };
        entry.id = self
            .store
            .insert(IGNORED_CHANNELS_COLLECTION, to_document(&entry)?)
            .await?;
        Ok(entry)
    }

    pub async fn delete_ignored_channel(&self, id: &str) -> Result<bool> {
        let removed = self
            .store
            .delete(IGNORED_CHANNELS_COLLECTION, &Filter::by_id(id))
            .await?;
        Ok(removed > 0)
    }
}
