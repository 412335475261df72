//! Platform-neutral domain model (servers, channels, members, messages).
//!
//! Everything here is a read-only view supplied by the platform client; the
//! core never caches these beyond a single operation.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Milliseconds between the Unix epoch and the platform's snowflake epoch (2015-01-01).
pub const SNOWFLAKE_EPOCH_MS: u64 = 1_420_070_400_000;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

snowflake_id!(
    /// Community ("server") id.
    ServerId
);
snowflake_id!(
    /// Channel id (server channel or direct channel).
    ChannelId
);
snowflake_id!(
    /// User id.
    UserId
);
snowflake_id!(RoleId);
snowflake_id!(MessageId);

impl UserId {
    /// Account creation time encoded in the snowflake.
    pub fn created_at(&self) -> DateTime<Utc> {
        let ms = (self.0 >> 22) + SNOWFLAKE_EPOCH_MS;
        DateTime::<Utc>::from_timestamp_millis(ms as i64).unwrap_or_default()
    }
}

/// Permission bit set (platform bit layout).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const NONE: Permissions = Permissions(0);
    pub const KICK_MEMBERS: Permissions = Permissions(1 << 1);
    pub const BAN_MEMBERS: Permissions = Permissions(1 << 2);
    pub const ADMINISTRATOR: Permissions = Permissions(1 << 3);
    pub const MANAGE_SERVER: Permissions = Permissions(1 << 5);
    pub const READ_MESSAGES: Permissions = Permissions(1 << 10);
    pub const SEND_MESSAGES: Permissions = Permissions(1 << 11);
    pub const MANAGE_MESSAGES: Permissions = Permissions(1 << 13);
    pub const READ_MESSAGE_HISTORY: Permissions = Permissions(1 << 16);
    pub const ALL: Permissions = Permissions(u64::MAX);

    pub fn contains(self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: Permissions) -> bool {
        self.0 & other.0 != 0
    }

    pub fn union(self, other: Permissions) -> Permissions {
        Permissions(self.0 | other.0)
    }

    pub fn difference(self, other: Permissions) -> Permissions {
        Permissions(self.0 & !other.0)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Permissions;

    fn bitor(self, rhs: Permissions) -> Permissions {
        self.union(rhs)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    /// Automated account (other bots, webhooks).
    #[serde(default)]
    pub bot: bool,
}

/// A user's identity and role-set scoped to one server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub user: User,
    pub roles: Vec<RoleId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Role {
    pub id: RoleId,
    pub name: String,
    pub permissions: Permissions,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OverwriteTarget {
    Role(RoleId),
    Member(UserId),
}

/// Per-channel permission adjustment layered on top of server-wide role permissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub server_id: ServerId,
    pub name: String,
    pub overwrites: Vec<PermissionOverwrite>,
}

/// Read-only snapshot of a server as reported by the platform at call time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Server {
    pub id: ServerId,
    pub name: String,
    pub owner_id: UserId,
    pub roles: Vec<Role>,
    pub channels: Vec<Channel>,
}

impl Server {
    pub fn channel(&self, id: ChannelId) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn role(&self, id: RoleId) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == id)
    }

    /// The implicit role every member holds.
    ///
    /// Identified by sharing the server's id; older snapshots only carry the name.
    pub fn everyone_role(&self) -> Option<&Role> {
        self.roles
            .iter()
            .find(|r| r.id.0 == self.id.0)
            .or_else(|| self.roles.iter().find(|r| r.name == "@everyone"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ban {
    pub user: User,
    pub reason: Option<String>,
}

/// Inbound chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    /// `None` for direct messages.
    pub server_id: Option<ServerId>,
    pub author: User,
    pub content: String,
}

impl Message {
    pub fn reference(&self) -> MessageRef {
        MessageRef {
            channel_id: self.channel_id,
            message_id: self.id,
        }
    }
}

/// A stable reference to a sent message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub channel_id: ChannelId,
    pub message_id: MessageId,
}
