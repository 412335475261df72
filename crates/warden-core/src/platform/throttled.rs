//! Outbound write pacing for the platform client.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{Ban, Channel, ChannelId, Member, MessageRef, Server, ServerId, User, UserId},
    platform::port::PlatformClient,
    Result,
};

/// Once this many channels are tracked, idle ones are dropped before adding another.
const PRUNE_AT: usize = 64;

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Spacing between any two outbound writes.
    pub global_min_interval: Duration,
    /// Spacing between writes to one channel.
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            per_channel_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Next free send slot on one lane.
#[derive(Clone, Copy, Debug)]
struct Slot {
    free_at: Instant,
}

impl Slot {
    fn new(now: Instant) -> Self {
        Self { free_at: now }
    }

    /// Take the earliest free slot; returns how long to wait for it.
    fn claim(&mut self, now: Instant, spacing: Duration) -> Duration {
        let at = self.free_at.max(now);
        self.free_at = at + spacing;
        at - now
    }

    /// An idle slot behaves exactly like a fresh one.
    fn is_idle(&self, now: Instant) -> bool {
        self.free_at <= now
    }
}

#[derive(Debug)]
struct Lanes {
    global: Slot,
    channels: HashMap<ChannelId, Slot>,
}

/// [`PlatformClient`] decorator that spaces sends, edits and deletes globally
/// and per channel. Reads pass through untouched.
///
/// Live inspection progress edits one message per scanned server; unpaced, a
/// large scan runs into the platform's rate limits.
pub struct ThrottledPlatform {
    inner: Arc<dyn PlatformClient>,
    cfg: ThrottleConfig,
    lanes: Mutex<Lanes>,
}

impl ThrottledPlatform {
    pub fn new(inner: Arc<dyn PlatformClient>, cfg: ThrottleConfig) -> Self {
        let now = Instant::now();
        Self {
            inner,
            cfg,
            lanes: Mutex::new(Lanes {
                global: Slot::new(now),
                channels: HashMap::new(),
            }),
        }
    }

    /// Wait for a global slot and, when given, a slot on `channel_id`.
    async fn pace(&self, channel_id: Option<ChannelId>) {
        let wait = {
            let mut lanes = self.lanes.lock().await;
            let now = Instant::now();
            let global = lanes.global.claim(now, self.cfg.global_min_interval);

            let channel = match channel_id {
                Some(id) => {
                    if !lanes.channels.contains_key(&id) && lanes.channels.len() >= PRUNE_AT {
                        lanes.channels.retain(|_, slot| !slot.is_idle(now));
                    }
                    lanes
                        .channels
                        .entry(id)
                        .or_insert_with(|| Slot::new(now))
                        .claim(now, self.cfg.per_channel_min_interval)
                }
                None => Duration::ZERO,
            };
            global.max(channel)
        };

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    #[cfg(test)]
    async fn tracked_channels(&self) -> usize {
        self.lanes.lock().await.channels.len()
    }
}

#[async_trait]
impl PlatformClient for ThrottledPlatform {
    fn current_user(&self) -> User {
        self.inner.current_user()
    }

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<MessageRef> {
        self.pace(Some(channel_id)).await;
        self.inner.send_message(channel_id, text).await
    }

    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.pace(Some(msg.channel_id)).await;
        self.inner.edit_message(msg, text).await
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.pace(Some(msg.channel_id)).await;
        self.inner.delete_message(msg).await
    }

    async fn list_bans(&self, server_id: ServerId) -> Result<Vec<Ban>> {
        self.inner.list_bans(server_id).await
    }

    async fn get_member(&self, server_id: ServerId, user_id: UserId) -> Result<Option<Member>> {
        self.inner.get_member(server_id, user_id).await
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        self.inner.get_user(user_id).await
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        self.inner.list_servers().await
    }

    async fn get_server(&self, server_id: ServerId) -> Result<Option<Server>> {
        self.inner.get_server(server_id).await
    }

    async fn get_channel(&self, channel_id: ChannelId) -> Result<Option<Channel>> {
        self.inner.get_channel(channel_id).await
    }

    async fn create_direct_channel(&self, user_id: UserId) -> Result<ChannelId> {
        // No channel yet, global pacing only.
        self.pace(None).await;
        self.inner.create_direct_channel(user_id).await
    }
}
