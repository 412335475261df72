//! Built-in command handlers.

pub mod auto_inspects;
pub mod inspect;
pub mod notifications;

use std::sync::{Arc, OnceLock};

use regex::Regex;

use crate::{
    dispatcher::{CommandContext, CommandHandler},
    domain::{ChannelId, Member, UserId},
    inspection::Inspector,
    permissions,
    platform::port::PlatformClient,
    server_config::ServerConfigStore,
    settings_cache::SettingsCache,
    Result,
};

/// Shared collaborators handed to every built-in handler.
#[derive(Clone)]
pub struct CommandServices {
    pub platform: Arc<dyn PlatformClient>,
    pub cache: Arc<SettingsCache>,
    pub configs: Arc<dyn ServerConfigStore>,
    pub inspector: Inspector,
}

pub fn default_handlers(services: &CommandServices) -> Vec<Arc<dyn CommandHandler>> {
    vec![
        Arc::new(notifications::NotificationsCommand::new(
            services.platform.clone(),
            services.cache.clone(),
        )),
        Arc::new(inspect::InspectCommand::new(
            services.platform.clone(),
            services.inspector.clone(),
        )),
        Arc::new(auto_inspects::AutoInspectsCommand::new(
            services.platform.clone(),
            services.configs.clone(),
        )),
    ]
}

fn user_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:<@!?(\d+)>|(\d+))$").expect("valid regex"))
}

fn channel_mention_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<#(\d+)>$").expect("valid regex"))
}

/// `<@id>`, `<@!id>` or a bare id.
pub fn parse_user_ref(arg: &str) -> Option<UserId> {
    let caps = user_mention_re().captures(arg.trim())?;
    let id = caps.get(1).or_else(|| caps.get(2))?;
    id.as_str().parse().ok().map(UserId)
}

/// `<#id>`.
pub fn parse_channel_mention(arg: &str) -> Option<ChannelId> {
    let caps = channel_mention_re().captures(arg.trim())?;
    caps.get(1)?.as_str().parse().ok().map(ChannelId)
}

/// The invoking member, if the platform still knows them.
async fn author_member(platform: &dyn PlatformClient, ctx: &CommandContext) -> Result<Option<Member>> {
    platform
        .get_member(ctx.server.id, ctx.message.author.id)
        .await
}

async fn author_is_admin(platform: &dyn PlatformClient, ctx: &CommandContext) -> Result<bool> {
    Ok(author_member(platform, ctx)
        .await?
        .is_some_and(|m| permissions::is_admin(&ctx.server, &m)))
}

async fn author_is_moderator(platform: &dyn PlatformClient, ctx: &CommandContext) -> Result<bool> {
    Ok(author_member(platform, ctx)
        .await?
        .is_some_and(|m| permissions::is_moderator(&ctx.server, &m)))
}

async fn reply(platform: &dyn PlatformClient, ctx: &CommandContext, text: &str) -> Result<()> {
    platform.send_message(ctx.message.channel_id, text).await?;
    Ok(())
}
