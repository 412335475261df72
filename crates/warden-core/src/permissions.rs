//! Effective permission resolution for a member in a channel.
//!
//! Evaluation is an explicit fixed-order fold over three tiers:
//!
//! 1. server default: the member's role permissions, adjusted by the channel's
//!    `@everyone` overwrite;
//! 2. role overwrites for every role the member holds, aggregated;
//! 3. the member-specific overwrite.
//!
//! Inside a tier a denied bit wins over an allowed one; a later tier overrides
//! an earlier one.

use crate::domain::{Channel, Member, OverwriteTarget, Permissions, Server};

/// Bits a keyword subscriber needs to be notified about a message.
pub const READ_ACCESS: Permissions = Permissions(
    Permissions::READ_MESSAGES.0 | Permissions::READ_MESSAGE_HISTORY.0,
);

/// Apply one tier's allow/deny pair. Deny wins over allow within the tier.
pub fn apply_tier(perms: Permissions, allow: Permissions, deny: Permissions) -> Permissions {
    perms.union(allow).difference(deny)
}

/// Server-wide permissions granted by roles (no channel overwrites).
pub fn base_permissions(server: &Server, member: &Member) -> Permissions {
    if member.user.id == server.owner_id {
        return Permissions::ALL;
    }

    let mut perms = server
        .everyone_role()
        .map(|r| r.permissions)
        .unwrap_or(Permissions::NONE);
    for role_id in &member.roles {
        if let Some(role) = server.role(*role_id) {
            perms = perms | role.permissions;
        }
    }

    if perms.contains(Permissions::ADMINISTRATOR) {
        Permissions::ALL
    } else {
        perms
    }
}

/// Effective permissions of `member` inside `channel`.
pub fn channel_permissions(server: &Server, channel: &Channel, member: &Member) -> Permissions {
    let base = base_permissions(server, member);
    if base.contains(Permissions::ADMINISTRATOR) {
        return Permissions::ALL;
    }

    let everyone_id = server.everyone_role().map(|r| r.id);

    // Tier 1: server default.
    let mut perms = base;
    if let Some(everyone_id) = everyone_id {
        if let Some(ow) = channel
            .overwrites
            .iter()
            .find(|ow| ow.target == OverwriteTarget::Role(everyone_id))
        {
            perms = apply_tier(perms, ow.allow, ow.deny);
        }
    }

    // Tier 2: role overwrites.
    let (role_allow, role_deny) = channel
        .overwrites
        .iter()
        .filter(|ow| match ow.target {
            OverwriteTarget::Role(id) => Some(id) != everyone_id && member.roles.contains(&id),
            OverwriteTarget::Member(_) => false,
        })
        .fold((Permissions::NONE, Permissions::NONE), |(a, d), ow| {
            (a | ow.allow, d | ow.deny)
        });
    perms = apply_tier(perms, role_allow, role_deny);

    // Tier 3: member overwrite.
    if let Some(ow) = channel
        .overwrites
        .iter()
        .find(|ow| ow.target == OverwriteTarget::Member(member.user.id))
    {
        perms = apply_tier(perms, ow.allow, ow.deny);
    }

    perms
}

/// Whether the member may both view the channel and read its history.
pub fn can_read(server: &Server, channel: &Channel, member: &Member) -> bool {
    channel_permissions(server, channel, member).contains(READ_ACCESS)
}

pub fn is_admin(server: &Server, member: &Member) -> bool {
    base_permissions(server, member)
        .intersects(Permissions::ADMINISTRATOR | Permissions::MANAGE_SERVER)
}

pub fn is_moderator(server: &Server, member: &Member) -> bool {
    is_admin(server, member)
        || base_permissions(server, member)
            .intersects(Permissions::BAN_MEMBERS | Permissions::KICK_MEMBERS)
}
