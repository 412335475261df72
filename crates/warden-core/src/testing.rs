//! In-crate fakes for the ports, shared by unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{
        Ban, Channel, ChannelId, Member, MessageId, MessageRef, Permissions, Role, RoleId, Server,
        ServerId, User, UserId,
    },
    errors::Error,
    platform::port::PlatformClient,
    ports::ErrorReporter,
    Result,
};

pub const BOT_ID: UserId = UserId(1);
const DM_BASE: u64 = 1_000_000;

pub fn user(id: u64) -> User {
    User {
        id: UserId(id),
        name: format!("user{id}"),
        bot: false,
    }
}

pub fn member(id: u64, roles: Vec<RoleId>) -> Member {
    Member {
        user: user(id),
        roles,
    }
}

/// A server whose `@everyone` role can read every channel; one channel `id * 10`.
pub fn open_server(id: u64) -> Server {
    Server {
        id: ServerId(id),
        name: format!("server{id}"),
        owner_id: UserId(999),
        roles: vec![Role {
            id: RoleId(id),
            name: "@everyone".to_string(),
            permissions: Permissions::READ_MESSAGES | Permissions::READ_MESSAGE_HISTORY,
        }],
        channels: vec![Channel {
            id: ChannelId(id * 10),
            server_id: ServerId(id),
            name: "general".to_string(),
            overwrites: vec![],
        }],
    }
}

pub fn dm_channel(user_id: UserId) -> ChannelId {
    ChannelId(DM_BASE + user_id.0)
}

#[derive(Default)]
pub struct FakePlatform {
    servers: Mutex<Vec<Server>>,
    members: Mutex<HashMap<(ServerId, UserId), Member>>,
    bans: Mutex<HashMap<ServerId, Vec<Ban>>>,
    failing_bans: Mutex<HashSet<ServerId>>,
    failing_members: Mutex<HashSet<ServerId>>,
    failing_sends: Mutex<HashSet<ChannelId>>,
    sent: Mutex<Vec<(ChannelId, String)>>,
    edits: Mutex<Vec<(MessageRef, String)>>,
    deleted: Mutex<Vec<MessageRef>>,
    ban_lookups: AtomicU64,
    next_id: AtomicU64,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        }
    }

    pub fn add_server(&self, server: Server) {
        self.servers.lock().unwrap().push(server);
    }

    pub fn add_member(&self, server_id: ServerId, member: Member) {
        self.members
            .lock()
            .unwrap()
            .insert((server_id, member.user.id), member);
    }

    pub fn add_ban(&self, server_id: ServerId, user_id: UserId) {
        self.bans.lock().unwrap().entry(server_id).or_default().push(Ban {
            user: user(user_id.0),
            reason: None,
        });
    }

    pub fn fail_bans_on(&self, server_id: ServerId) {
        self.failing_bans.lock().unwrap().insert(server_id);
    }

    pub fn fail_members_on(&self, server_id: ServerId) {
        self.failing_members.lock().unwrap().insert(server_id);
    }

    pub fn fail_sends_to(&self, channel_id: ChannelId) {
        self.failing_sends.lock().unwrap().insert(channel_id);
    }

    pub fn sent(&self) -> Vec<(ChannelId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, channel_id: ChannelId) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(c, _)| *c == channel_id)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn edits_of(&self, msg: MessageRef) -> Vec<String> {
        self.edits
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| *m == msg)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn deleted(&self) -> Vec<MessageRef> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn ban_lookups(&self) -> u64 {
        self.ban_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    fn current_user(&self) -> User {
        User {
            id: BOT_ID,
            name: "warden".to_string(),
            bot: true,
        }
    }

    async fn send_message(&self, channel_id: ChannelId, text: &str) -> Result<MessageRef> {
        if self.failing_sends.lock().unwrap().contains(&channel_id) {
            return Err(Error::Platform(format!("cannot send to {channel_id}")));
        }
        self.sent
            .lock()
            .unwrap()
            .push((channel_id, text.to_string()));
        Ok(MessageRef {
            channel_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        })
    }

    async fn edit_message(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.edits.lock().unwrap().push((msg, text.to_string()));
        Ok(())
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.deleted.lock().unwrap().push(msg);
        Ok(())
    }

    async fn list_bans(&self, server_id: ServerId) -> Result<Vec<Ban>> {
        self.ban_lookups.fetch_add(1, Ordering::SeqCst);
        if self.failing_bans.lock().unwrap().contains(&server_id) {
            return Err(Error::Platform("missing ban permission".to_string()));
        }
        Ok(self
            .bans
            .lock()
            .unwrap()
            .get(&server_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_member(&self, server_id: ServerId, user_id: UserId) -> Result<Option<Member>> {
        if self.failing_members.lock().unwrap().contains(&server_id) {
            return Err(Error::Platform("member lookup failed".to_string()));
        }
        Ok(self
            .members
            .lock()
            .unwrap()
            .get(&(server_id, user_id))
            .cloned())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        Ok(Some(user(user_id.0)))
    }

    async fn list_servers(&self) -> Result<Vec<Server>> {
        Ok(self.servers.lock().unwrap().clone())
    }

    async fn get_server(&self, server_id: ServerId) -> Result<Option<Server>> {
        Ok(self
            .servers
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.id == server_id)
            .cloned())
    }

    async fn get_channel(&self, channel_id: ChannelId) -> Result<Option<Channel>> {
        Ok(self
            .servers
            .lock()
            .unwrap()
            .iter()
            .find_map(|s| s.channel(channel_id).cloned()))
    }

    async fn create_direct_channel(&self, user_id: UserId) -> Result<ChannelId> {
        Ok(dm_channel(user_id))
    }
}

/// Error reporter that remembers what it was given.
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<String>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<String> {
        self.reports.lock().unwrap().clone()
    }
}

impl ErrorReporter for RecordingReporter {
    fn report(&self, error: &Error, _context: &[(&str, String)]) {
        self.reports.lock().unwrap().push(error.to_string());
    }
}

/// Poll `check` until it holds or roughly a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    check()
}
