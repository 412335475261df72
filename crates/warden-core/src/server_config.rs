//! Per-server configuration (command prefix, automatic inspection).
//!
//! Read and written straight through the persistence layer with no local cache,
//! so a toggle is visible on the server's next read.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ChannelId, ServerId},
    store::{from_document, to_document, DocumentStore, Filter, ID_FIELD},
    Result,
};

pub const SERVER_CONFIG_COLLECTION: &str = "server_config";

/// Which conditions publish an automatic inspection report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectTriggers {
    /// The user is banned on another server the bot is on.
    #[serde(default)]
    pub foreign_ban: bool,
    /// The user shares no other server with the bot.
    #[serde(default)]
    pub no_common_servers: bool,
    /// The account is less than a week old.
    #[serde(default)]
    pub new_account: bool,
}

impl InspectTriggers {
    pub const ALL: InspectTriggers = InspectTriggers {
        foreign_ban: true,
        no_common_servers: true,
        new_account: true,
    };

    pub fn any_enabled(&self) -> bool {
        self.foreign_ban || self.no_common_servers || self.new_account
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_id: ServerId,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub inspects_channel: Option<ChannelId>,
    #[serde(default)]
    pub triggers: InspectTriggers,
}

impl ServerConfig {
    pub fn new(server_id: ServerId) -> Self {
        Self {
            server_id,
            prefix: None,
            inspects_channel: None,
            triggers: InspectTriggers::default(),
        }
    }
}

#[async_trait]
pub trait ServerConfigStore: Send + Sync {
    /// A server without a stored record reads as defaults.
    async fn get(&self, server_id: ServerId) -> Result<ServerConfig>;
    async fn set(&self, config: &ServerConfig) -> Result<()>;
}

/// `ServerConfigStore` backed by the document store.
#[derive(Clone)]
pub struct DocumentServerConfigStore {
    store: Arc<dyn DocumentStore>,
}

impl DocumentServerConfigStore {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    fn filter(server_id: ServerId) -> Filter {
        Filter::new().eq("server_id", server_id.0)
    }
}

#[async_trait]
impl ServerConfigStore for DocumentServerConfigStore {
    async fn get(&self, server_id: ServerId) -> Result<ServerConfig> {
        match self
            .store
            .find_one(SERVER_CONFIG_COLLECTION, &Self::filter(server_id))
            .await?
        {
            Some(doc) => from_document(doc),
            None => Ok(ServerConfig::new(server_id)),
        }
    }

    async fn set(&self, config: &ServerConfig) -> Result<()> {
        let mut doc = to_document(config)?;
        match self
            .store
            .find_one(SERVER_CONFIG_COLLECTION, &Self::filter(config.server_id))
            .await?
        {
            Some(existing) => {
                if let Some(id) = existing.get(ID_FIELD) {
                    doc.insert(ID_FIELD.to_string(), id.clone());
                }
                self.store.update(SERVER_CONFIG_COLLECTION, doc).await
            }
            None => {
                self.store.insert(SERVER_CONFIG_COLLECTION, doc).await?;
                Ok(())
            }
        }
    }
}
