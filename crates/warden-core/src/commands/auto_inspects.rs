//! `auto-inspects-channel [<#channel> [bans|common|new]...]`: configure automatic inspections.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    commands::{author_is_admin, parse_channel_mention, reply},
    dispatcher::{CommandContext, CommandHandler},
    errors::Error,
    platform::port::PlatformClient,
    server_config::{InspectTriggers, ServerConfigStore},
    Result,
};

pub struct AutoInspectsCommand {
    platform: Arc<dyn PlatformClient>,
    configs: Arc<dyn ServerConfigStore>,
}

/// Parse trigger flags; no flags means every trigger.
fn parse_triggers<'a>(flags: impl Iterator<Item = &'a str>) -> Result<InspectTriggers> {
    let mut triggers = InspectTriggers::default();
    let mut any = false;
    for flag in flags {
        match flag {
            "bans" => triggers.foreign_ban = true,
            "common" => triggers.no_common_servers = true,
            "new" => triggers.new_account = true,
            other => {
                return Err(Error::InvalidArgument(format!(
                    "unknown trigger `{other}` (expected bans, common or new)"
                )))
            }
        }
        any = true;
    }
    Ok(if any { triggers } else { InspectTriggers::ALL })
}

fn describe(triggers: &InspectTriggers) -> String {
    let mut names = Vec::new();
    if triggers.foreign_ban {
        names.push("bans on other servers");
    }
    if triggers.no_common_servers {
        names.push("no common servers");
    }
    if triggers.new_account {
        names.push("new accounts");
    }
    names.join(", ")
}

impl AutoInspectsCommand {
    pub fn new(platform: Arc<dyn PlatformClient>, configs: Arc<dyn ServerConfigStore>) -> Self {
        Self { platform, configs }
    }
}

#[async_trait]
impl CommandHandler for AutoInspectsCommand {
    fn names(&self) -> &'static [&'static str] {
        &["auto-inspects-channel"]
    }

    async fn handle(&self, ctx: CommandContext) -> Result<()> {
        let platform = self.platform.as_ref();
        if !author_is_admin(platform, &ctx).await? {
            return reply(
                platform,
                &ctx,
                "❌ Only administrators can configure automatic inspections.",
            )
            .await;
        }

        let mut config = self.configs.get(ctx.server.id).await?;
        let mut args = ctx.content.split_whitespace();

        let Some(first) = args.next() else {
            config.triggers = InspectTriggers::default();
            self.configs.set(&config).await?;
            tracing::info!(server = %ctx.server.id, "automatic inspections disabled");
            return reply(platform, &ctx, "✅ Automatic inspections are disabled.").await;
        };

        let Some(channel_id) = parse_channel_mention(first) else {
            return reply(
                platform,
                &ctx,
                "Usage: `auto-inspects-channel [<#channel> [bans|common|new]...]`",
            )
            .await;
        };
        if ctx.server.channel(channel_id).is_none() {
            return reply(platform, &ctx, "❌ That channel does not belong to this server.").await;
        }

        let triggers = match parse_triggers(args) {
            Ok(t) => t,
            Err(e) => return reply(platform, &ctx, &format!("❌ {e}")).await,
        };

        config.inspects_channel = Some(channel_id);
        config.triggers = triggers;
        self.configs.set(&config).await?;
        tracing::info!(server = %ctx.server.id, channel = %channel_id, ?triggers, "automatic inspections configured");

        reply(
            platform,
            &ctx,
            &format!(
                "✅ Inspection reports go to <#{channel_id}> for: {}.",
                describe(&triggers)
            ),
        )
        .await
    }
}
