//! `inspect <@user|id>`: manual cross-server inspection with live progress.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;

use crate::{
    commands::{author_is_moderator, parse_user_ref, reply},
    dispatcher::{CommandContext, CommandHandler},
    domain::{MessageRef, User},
    inspection::{
        report::{self, InspectReason},
        Inspector,
    },
    platform::port::PlatformClient,
    Result,
};

pub struct InspectCommand {
    platform: Arc<dyn PlatformClient>,
    inspector: Inspector,
}

impl InspectCommand {
    pub fn new(platform: Arc<dyn PlatformClient>, inspector: Inspector) -> Self {
        Self {
            platform,
            inspector,
        }
    }

    /// Edits the progress message whenever the scan advances. Bursts collapse
    /// into the latest count; the task ends when the sender is dropped.
    fn spawn_progress_editor(
        &self,
        msg: MessageRef,
        user: User,
        total: usize,
        mut rx: watch::Receiver<usize>,
    ) -> tokio::task::JoinHandle<()> {
        let platform = self.platform.clone();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let done = *rx.borrow_and_update();
                if let Err(e) = platform
                    .edit_message(msg, &report::progress_text(&user, done, total))
                    .await
                {
                    tracing::debug!(channel = %msg.channel_id, "progress edit failed: {e}");
                }
            }
        })
    }
}

#[async_trait]
impl CommandHandler for InspectCommand {
    fn names(&self) -> &'static [&'static str] {
        &["inspect"]
    }

    async fn handle(&self, ctx: CommandContext) -> Result<()> {
        let platform = self.platform.as_ref();
        if !author_is_moderator(platform, &ctx).await? {
            return reply(
                platform,
                &ctx,
                "❌ You need the `Ban Members` or `Kick Members` permission to inspect users.",
            )
            .await;
        }

        let Some(target) = parse_user_ref(&ctx.content) else {
            return reply(platform, &ctx, "Usage: `inspect <@user|id>`").await;
        };
        let Some(user) = platform.get_user(target).await? else {
            return reply(platform, &ctx, &format!("❌ I don't know a user with id `{target}`.")).await;
        };

        let servers = platform.list_servers().await?;
        let progress = platform
            .send_message(
                ctx.message.channel_id,
                &report::progress_text(&user, 0, servers.len()),
            )
            .await?;

        let (tx, rx) = watch::channel(0usize);
        let editor = self.spawn_progress_editor(progress, user.clone(), servers.len(), rx);
        let inspection = self
            .inspector
            .inspect_on(target, &servers, &mut |done| {
                tx.send_replace(done);
            })
            .await;
        drop(tx);
        if let Err(e) = editor.await {
            tracing::warn!("progress editor task failed: {e}");
        }
        let inspection = inspection?;

        tracing::info!(
            server = %ctx.server.id,
            user = %target,
            banned = inspection.result.banned_on.len(),
            failed = inspection.result.failed.len(),
            "manual inspection finished"
        );
        let text = report::render(&user, &inspection, ctx.server.id, InspectReason::Manual, Utc::now());
        platform.edit_message(progress, &text).await
    }
}
