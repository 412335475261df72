//! `notifications` / `noti`: keyword subscriptions and ignored channels.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    commands::{author_is_admin, parse_channel_mention, reply},
    dispatcher::{CommandContext, CommandHandler},
    notifications::{matcher::normalize, KeywordScope, KeywordSubscription},
    platform::port::PlatformClient,
    settings_cache::SettingsCache,
    Result,
};

const USAGE: &str = "**Keyword notifications**\n\
    `notifications add <keyword>`: get a DM when someone mentions the keyword here\n\
    `notifications delete <keyword>`: stop watching a keyword\n\
    `notifications list`: DM yourself your keywords\n\
    `notifications ignore-channel list`: show ignored channels\n\
    `notifications ignore-channel <#channel>`: toggle keyword matching in a channel (admins)";

pub struct NotificationsCommand {
    platform: Arc<dyn PlatformClient>,
    cache: Arc<SettingsCache>,
}

impl NotificationsCommand {
    pub fn new(platform: Arc<dyn PlatformClient>, cache: Arc<SettingsCache>) -> Self {
        Self { platform, cache }
    }

    async fn add(&self, ctx: &CommandContext, keyword: &str) -> Result<()> {
        let keyword = normalize(keyword);
        if keyword.is_empty() {
            return reply(self.platform.as_ref(), ctx, "❌ Please tell me which keyword to add.").await;
        }

        let repo = self.cache.repo();
        let author = ctx.message.author.id;
        if repo
            .find_subscription(ctx.server.id, author, &keyword)
            .await?
            .is_some()
        {
            return reply(
                self.platform.as_ref(),
                ctx,
                &format!("❌ You already watch `{keyword}` on this server."),
            )
            .await;
        }

        repo.add_subscription(&keyword, KeywordScope::Server(ctx.server.id), author)
            .await?;
        self.cache.spawn_reload();
        tracing::info!(server = %ctx.server.id, user = %author, "keyword subscription added");

        reply(
            self.platform.as_ref(),
            ctx,
            &format!("✅ Added `{keyword}` to your keywords."),
        )
        .await?;

        // Keep the keyword private where the platform allows it.
        if let Err(e) = self.platform.delete_message(ctx.message.reference()).await {
            tracing::debug!(channel = %ctx.message.channel_id, "could not delete invoking message: {e}");
        }
        Ok(())
    }

    async fn delete(&self, ctx: &CommandContext, keyword: &str) -> Result<()> {
        let keyword = normalize(keyword);
        let repo = self.cache.repo();
        let author = ctx.message.author.id;

        let Some(sub) = repo
            .find_subscription(ctx.server.id, author, &keyword)
            .await?
        else {
            return reply(
                self.platform.as_ref(),
                ctx,
                &format!("❌ You don't watch `{keyword}` here."),
            )
            .await;
        };

        repo.delete_subscription(&sub.id).await?;
        self.cache.spawn_reload();
        tracing::info!(server = %ctx.server.id, user = %author, "keyword subscription deleted");
        reply(
            self.platform.as_ref(),
            ctx,
            &format!("✅ Removed `{keyword}` from your keywords."),
        )
        .await
    }

    async fn list(&self, ctx: &CommandContext) -> Result<()> {
        let author = ctx.message.author.id;
        let subs = self
            .cache
            .repo()
            .subscriptions_for(ctx.server.id, author)
            .await?;

        let dm = self.platform.create_direct_channel(author).await?;
        self.platform
            .send_message(dm, &render_list(&ctx.server.name, &subs))
            .await?;
        Ok(())
    }

    async fn ignore_channel(&self, ctx: &CommandContext, arg: &str) -> Result<()> {
        let repo = self.cache.repo();

        if arg == "list" {
            let ignored = repo.ignored_channels_for(ctx.server.id).await?;
            let text = if ignored.is_empty() {
                "No channels are ignored on this server.".to_string()
            } else {
                let channels = ignored
                    .iter()
                    .map(|c| format!("<#{}>", c.channel_id))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("**Ignored channels**\n{channels}")
            };
            return reply(self.platform.as_ref(), ctx, &text).await;
        }

        if !author_is_admin(self.platform.as_ref(), ctx).await? {
            return reply(
                self.platform.as_ref(),
                ctx,
                "❌ Only administrators can change ignored channels.",
            )
            .await;
        }

        let Some(channel_id) = parse_channel_mention(arg) else {
            return reply(self.platform.as_ref(), ctx, "❌ Please mention a channel.").await;
        };
        if ctx.server.channel(channel_id).is_none() {
            return reply(
                self.platform.as_ref(),
                ctx,
                "❌ That channel does not belong to this server.",
            )
            .await;
        }

        let text = match repo.ignored_channel(channel_id).await? {
            Some(existing) => {
                repo.delete_ignored_channel(&existing.id).await?;
                format!("✅ Keywords in <#{channel_id}> will notify again.")
            }
            None => {
                repo.add_ignored_channel(ctx.server.id, channel_id).await?;
                format!("✅ Keywords in <#{channel_id}> are ignored from now on.")
            }
        };
        self.cache.spawn_reload();
        reply(self.platform.as_ref(), ctx, &text).await
    }
}

fn render_list(server_name: &str, subs: &[KeywordSubscription]) -> String {
    if subs.is_empty() {
        return format!("You have no keywords on `{server_name}`.");
    }
    let mut out = format!("**Your keywords on `{server_name}`**");
    for sub in subs {
        out.push_str(&format!("\n▪ `{}`", sub.keyword));
        if sub.scope.is_global() {
            out.push_str(" (global)");
        }
        out.push_str(&format!(", triggered {} times", sub.triggered));
    }
    out
}

#[async_trait]
impl CommandHandler for NotificationsCommand {
    fn names(&self) -> &'static [&'static str] {
        &["notifications", "noti"]
    }

    async fn handle(&self, ctx: CommandContext) -> Result<()> {
        let content = ctx.content.trim();
        let (sub, rest) = match content.split_once(char::is_whitespace) {
            Some((sub, rest)) => (sub, rest.trim()),
            None => (content, ""),
        };

        match sub {
            "add" => self.add(&ctx, rest).await,
            "delete" | "remove" => self.delete(&ctx, rest).await,
            "list" => self.list(&ctx).await,
            "ignore-channel" => self.ignore_channel(&ctx, rest).await,
            _ => reply(self.platform.as_ref(), &ctx, USAGE).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        commands::test_support::{ctx, OWNER},
        domain::{ChannelId, ServerId, UserId},
        notifications::NotificationRepo,
        store::MemoryStore,
        testing::{dm_channel, eventually, member, open_server, FakePlatform},
    };

    struct Fixture {
        platform: Arc<FakePlatform>,
        cache: Arc<SettingsCache>,
        cmd: NotificationsCommand,
    }

    fn fixture() -> Fixture {
        let platform = Arc::new(FakePlatform::new());
        platform.add_server(open_server(1));
        platform.add_server(open_server(2));
        platform.add_member(ServerId(1), member(OWNER.0, vec![]));
        let cache = Arc::new(SettingsCache::new(NotificationRepo::new(Arc::new(
            MemoryStore::new(),
        ))));
        let cmd = NotificationsCommand::new(platform.clone(), cache.clone());
        Fixture {
            platform,
            cache,
            cmd,
        }
    }

    #[tokio::test]
    async fn add_stores_confirms_and_reloads() {
        let f = fixture();
        f.cmd.handle(ctx(1, 50, "noti", "add Rust ")).await.unwrap();

        let subs = f.cache.repo().subscriptions_for(ServerId(1), UserId(50)).await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].keyword, "rust");
        assert_eq!(subs[0].scope, KeywordScope::Server(ServerId(1)));
        assert!(f.platform.sent_to(ChannelId(10))[0].contains("`rust`"));
        assert_eq!(f.platform.deleted().len(), 1);

        let cache = f.cache.clone();
        assert!(eventually(|| cache.snapshot().subscriptions.len() == 1).await);
    }

    #[tokio::test]
    async fn duplicate_add_is_rejected() {
        let f = fixture();
        f.cmd.handle(ctx(1, 50, "noti", "add rust")).await.unwrap();
        f.cmd.handle(ctx(1, 50, "noti", "add rust")).await.unwrap();
        let subs = f.cache.repo().all_subscriptions().await.unwrap();
        assert_eq!(subs.len(), 1);
        assert!(f.platform.sent_to(ChannelId(10))[1].contains("already"));
    }

    #[tokio::test]
    async fn delete_reports_missing_keyword() {
        let f = fixture();
        f.cmd.handle(ctx(1, 50, "noti", "delete rust")).await.unwrap();
        assert!(f.platform.sent_to(ChannelId(10))[0].contains("don't watch"));

        f.cmd.handle(ctx(1, 50, "noti", "add rust")).await.unwrap();
        f.cmd.handle(ctx(1, 50, "noti", "delete rust")).await.unwrap();
        assert!(f.cache.repo().all_subscriptions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn list_is_sent_by_direct_message_with_global_label() {
        let f = fixture();
        let repo = f.cache.repo();
        repo.add_subscription("everywhere", KeywordScope::Global, UserId(50))
            .await
            .unwrap();
        repo.add_subscription("other", KeywordScope::Server(ServerId(2)), UserId(50))
            .await
            .unwrap();
        f.cmd.handle(ctx(1, 50, "noti", "add here")).await.unwrap();

        f.cmd.handle(ctx(1, 50, "noti", "list")).await.unwrap();
        let dms = f.platform.sent_to(dm_channel(UserId(50)));
        assert_eq!(dms.len(), 1);
        assert!(dms[0].contains("`everywhere` (global)"));
        assert!(dms[0].contains("`here`"));
        assert!(!dms[0].contains("`other`"));
    }

    #[tokio::test]
    async fn ignore_channel_toggles_for_admins_only() {
        let f = fixture();
        f.cmd
            .handle(ctx(1, 50, "noti", "ignore-channel <#10>"))
            .await
            .unwrap();
        assert!(f.cache.repo().all_ignored_channels().await.unwrap().is_empty());

        f.cmd
            .handle(ctx(1, OWNER.0, "noti", "ignore-channel <#10>"))
            .await
            .unwrap();
        let ignored = f.cache.repo().all_ignored_channels().await.unwrap();
        assert_eq!(ignored.len(), 1);
        assert_eq!(ignored[0].channel_id, ChannelId(10));

        f.cmd
            .handle(ctx(1, OWNER.0, "noti", "ignore-channel list"))
            .await
            .unwrap();
        assert!(f.platform.sent_to(ChannelId(10)).last().unwrap().contains("<#10>"));

        f.cmd
            .handle(ctx(1, OWNER.0, "noti", "ignore-channel <#10>"))
            .await
            .unwrap();
        assert!(f.cache.repo().all_ignored_channels().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn ignore_channel_rejects_foreign_channels() {
        let f = fixture();
        f.cmd
            .handle(ctx(1, OWNER.0, "noti", "ignore-channel <#20>"))
            .await
            .unwrap();
        assert!(f.cache.repo().all_ignored_channels().await.unwrap().is_empty());
        assert!(f.platform.sent_to(ChannelId(10))[0].contains("does not belong"));
    }

    #[tokio::test]
    async fn unknown_subcommand_shows_usage() {
        let f = fixture();
        f.cmd.handle(ctx(1, 50, "noti", "")).await.unwrap();
        assert!(f.platform.sent_to(ChannelId(10))[0].starts_with("**Keyword notifications**"));
    }
}
