use std::{collections::HashMap, sync::Arc};

use crate::{
    domain::{Channel, ChannelId, Member, Message, Server, User, UserId},
    notifications::repo::NotificationRepo,
    permissions,
    platform::port::PlatformClient,
    server_config::ServerConfigStore,
    settings_cache::SettingsCache,
    Result,
};

/// Characters that count as a word boundary around a keyword.
pub const DELIMITERS: [char; 17] = [
    ' ', '.', ',', '?', '!', ';', '(', ')', '=', '"', '\'', '`', '´', '_', '~', '+', '-',
];

pub fn is_delimiter(c: char) -> bool {
    DELIMITERS.contains(&c)
}

/// Lowercase with outer whitespace trimmed.
pub fn normalize(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Whole-word-ish match of `keyword` inside already-normalized text.
///
/// An occurrence counts when it is preceded by the start of the text or a
/// delimiter and followed by the end of the text or a delimiter.
pub fn keyword_matches(normalized: &str, keyword: &str) -> bool {
    let keyword = keyword.to_lowercase();
    if keyword.is_empty() {
        return false;
    }

    let mut from = 0;
    while let Some(pos) = normalized[from..].find(&keyword) {
        let start = from + pos;
        let end = start + keyword.len();

        let bounded_before = normalized[..start]
            .chars()
            .next_back()
            .map_or(true, is_delimiter);
        let bounded_after = normalized[end..].chars().next().map_or(true, is_delimiter);
        if bounded_before && bounded_after {
            return true;
        }

        // Step one character so overlapping occurrences are still considered.
        from = start
            + normalized[start..]
                .chars()
                .next()
                .map_or(1, char::len_utf8);
    }
    false
}

/// One direct message to a subscriber; all of their keyword hits in a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delivery {
    pub recipient: UserId,
    pub author: User,
    /// In keyword evaluation order.
    pub keywords: Vec<String>,
    pub channel_id: ChannelId,
    pub server_name: String,
    pub content: String,
}

impl Delivery {
    pub fn render(&self) -> String {
        format!(
            ":bell: User `{}` mentioned {} in <#{}> on the server `{}`:\n```{}```",
            self.author.name,
            join_keywords(&self.keywords),
            self.channel_id,
            self.server_name,
            self.content,
        )
    }
}

/// "`a`", "`a` and `b`", "`a`, `b` and `c`".
pub fn join_keywords(keywords: &[String]) -> String {
    let quoted: Vec<String> = keywords.iter().map(|k| format!("`{k}`")).collect();
    match quoted.split_last() {
        None => String::new(),
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {last}", rest.join(", ")),
    }
}

/// Evaluates inbound messages against the cached keyword subscriptions.
pub struct NotificationMatcher {
    cache: Arc<SettingsCache>,
    platform: Arc<dyn PlatformClient>,
    configs: Arc<dyn ServerConfigStore>,
    default_prefix: String,
}

impl NotificationMatcher {
    pub fn new(
        cache: Arc<SettingsCache>,
        platform: Arc<dyn PlatformClient>,
        configs: Arc<dyn ServerConfigStore>,
        default_prefix: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            platform,
            configs,
            default_prefix: default_prefix.into(),
        }
    }

    /// Match `message` posted on `server` and deliver the results.
    ///
    /// Returns the number of direct messages sent.
    pub async fn process(&self, message: &Message, server: &Server) -> Result<usize> {
        let deliveries = self.match_message(message, server).await?;
        if deliveries.is_empty() {
            return Ok(0);
        }
        let sent = self.deliver(&deliveries).await;
        tracing::debug!(server = %server.id, sent, "keyword notifications delivered");
        Ok(sent)
    }

    /// Produce the deduplicated deliveries for `message` posted on `server`.
    ///
    /// Trigger counters of matched subscriptions are bumped in background tasks;
    /// their failure never affects the returned deliveries.
    pub async fn match_message(&self, message: &Message, server: &Server) -> Result<Vec<Delivery>> {
        let me = self.platform.current_user();
        if message.author.bot || message.author.id == me.id {
            return Ok(Vec::new());
        }

        let config = self.configs.get(server.id).await?;
        let prefix = config
            .prefix
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.default_prefix);
        if !prefix.is_empty() && message.content.starts_with(prefix) {
            return Ok(Vec::new());
        }

        let snapshot = self.cache.snapshot();
        if snapshot.is_ignored(message.channel_id) {
            return Ok(Vec::new());
        }

        let normalized = normalize(&message.content);
        let mut channel: Option<Channel> = None;
        let mut members: HashMap<UserId, Option<Member>> = HashMap::new();
        let mut pending: Vec<Delivery> = Vec::new();
        let mut by_recipient: HashMap<UserId, usize> = HashMap::new();

        for sub in snapshot.subscriptions_for(server.id) {
            if sub.user_id == message.author.id {
                continue;
            }
            if !keyword_matches(&normalized, &sub.keyword) {
                continue;
            }

            if channel.is_none() {
                channel = match server.channel(message.channel_id) {
                    Some(c) => Some(c.clone()),
                    None => self.platform.get_channel(message.channel_id).await?,
                };
            }
            let Some(channel) = channel.as_ref() else {
                tracing::debug!(channel = %message.channel_id, "channel not found, cannot resolve permissions");
                return Ok(Vec::new());
            };

            if !members.contains_key(&sub.user_id) {
                let member = match self.platform.get_member(server.id, sub.user_id).await {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(server = %server.id, user = %sub.user_id, "subscriber lookup failed: {e}");
                        None
                    }
                };
                members.insert(sub.user_id, member);
            }
            let Some(Some(member)) = members.get(&sub.user_id) else {
                continue;
            };
            if !permissions::can_read(server, channel, member) {
                continue;
            }

            match by_recipient.get(&sub.user_id) {
                Some(&idx) => pending[idx].keywords.push(sub.keyword.clone()),
                None => {
                    by_recipient.insert(sub.user_id, pending.len());
                    pending.push(Delivery {
                        recipient: sub.user_id,
                        author: message.author.clone(),
                        keywords: vec![sub.keyword.clone()],
                        channel_id: message.channel_id,
                        server_name: server.name.clone(),
                        content: message.content.clone(),
                    });
                }
            }

            spawn_trigger_increment(self.cache.repo().clone(), sub.id.clone());
        }

        Ok(pending)
    }

    /// Send each delivery as a direct message. Failures are logged per recipient.
    pub async fn deliver(&self, deliveries: &[Delivery]) -> usize {
        let mut sent = 0;
        for delivery in deliveries {
            let result = async {
                let dm = self
                    .platform
                    .create_direct_channel(delivery.recipient)
                    .await?;
                self.platform.send_message(dm, &delivery.render()).await
            }
            .await;

            match result {
                Ok(_) => sent += 1,
                Err(e) => {
                    tracing::warn!(user = %delivery.recipient, "keyword notification not delivered: {e}")
                }
            }
        }
        sent
    }
}

fn spawn_trigger_increment(repo: NotificationRepo, id: String) {
    tokio::spawn(async move {
        if let Err(e) = repo.increment_triggered(&id).await {
            tracing::warn!(subscription = %id, "failed to bump keyword trigger counter: {e}");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{MessageId, OverwriteTarget, PermissionOverwrite, Permissions, ServerId},
        notifications::repo::KeywordScope,
        server_config::{DocumentServerConfigStore, ServerConfig},
        store::{Document, DocumentStore, Filter, MemoryStore},
        testing::{dm_channel, member, open_server, user, FakePlatform},
    };
    use async_trait::async_trait;

    /// Store whose updates always fail; everything else is in memory.
    #[derive(Default)]
    struct UpdatesFail(MemoryStore);

    #[async_trait]
    impl DocumentStore for UpdatesFail {
        async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>> {
            self.0.find(collection, filter).await
        }

        async fn insert(&self, collection: &str, doc: Document) -> Result<String> {
            self.0.insert(collection, doc).await
        }

        async fn update(&self, _collection: &str, _doc: Document) -> Result<()> {
            Err(crate::errors::Error::Store("disk full".to_string()))
        }

        async fn delete(&self, collection: &str, filter: &Filter) -> Result<usize> {
            self.0.delete(collection, filter).await
        }
    }

    struct Fixture {
        platform: Arc<FakePlatform>,
        cache: Arc<SettingsCache>,
        configs: Arc<DocumentServerConfigStore>,
        matcher: NotificationMatcher,
    }

    fn fixture() -> Fixture {
        fixture_on(Arc::new(MemoryStore::new()))
    }

    fn fixture_on(store: Arc<dyn DocumentStore>) -> Fixture {
        let platform = Arc::new(FakePlatform::new());
        let cache = Arc::new(SettingsCache::new(NotificationRepo::new(store.clone())));
        let configs = Arc::new(DocumentServerConfigStore::new(store));
        let matcher =
            NotificationMatcher::new(cache.clone(), platform.clone(), configs.clone(), "_");
        Fixture {
            platform,
            cache,
            configs,
            matcher,
        }
    }

    impl Fixture {
        async fn subscribe(&self, keyword: &str, scope: KeywordScope, user_id: u64) -> String {
            let sub = self
                .cache
                .repo()
                .add_subscription(keyword, scope, UserId(user_id))
                .await
                .unwrap();
            self.cache.reload().await.unwrap();
            sub.id
        }
    }

    fn msg(server: u64, author: u64, content: &str) -> Message {
        Message {
            id: MessageId(77),
            channel_id: ChannelId(server * 10),
            server_id: Some(ServerId(server)),
            author: user(author),
            content: content.to_string(),
        }
    }

    #[test]
    fn boundary_examples() {
        assert!(keyword_matches(&normalize("I saw a cat."), "cat"));
        assert!(!keyword_matches(&normalize("concatenate"), "cat"));
        assert!(keyword_matches(&normalize("CAT"), "cat"));
        assert!(keyword_matches(&normalize("  Cat  "), "cAt"));
        assert!(keyword_matches(&normalize("cat, dog"), "cat"));
        assert!(keyword_matches(&normalize("hello (cat)"), "cat"));
        assert!(keyword_matches(&normalize("my_cat_toy"), "cat"));
        assert!(keyword_matches(&normalize("´cat´"), "cat"));
        assert!(!keyword_matches(&normalize("cats"), "cat"));
        assert!(!keyword_matches(&normalize("bobcat"), "cat"));
        assert!(!keyword_matches(&normalize("cat:"), "cat"));
        assert!(!keyword_matches(&normalize("anything"), ""));
    }

    #[test]
    fn multi_word_keywords_and_overlaps() {
        assert!(keyword_matches(&normalize("the black cat sat"), "black cat"));
        assert!(!keyword_matches(&normalize("blackcat"), "black cat"));
        // First occurrence is unbounded, a later overlapping one is bounded.
        assert!(keyword_matches(&normalize("xa-a-a"), "a-a"));
        assert!(keyword_matches(&normalize("xcat cat"), "cat"));
    }

    #[test]
    fn keyword_list_rendering() {
        let k = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert_eq!(join_keywords(&k(&["a"])), "`a`");
        assert_eq!(join_keywords(&k(&["a", "b"])), "`a` and `b`");
        assert_eq!(join_keywords(&k(&["a", "b", "c"])), "`a`, `b` and `c`");
        assert_eq!(join_keywords(&[]), "");
    }

    #[tokio::test]
    async fn no_keyword_hit_means_no_delivery() {
        let f = fixture();
        let server = open_server(1);
        f.platform.add_member(ServerId(1), member(20, vec![]));
        f.subscribe("cat", KeywordScope::Server(ServerId(1)), 20).await;

        let out = f
            .matcher
            .match_message(&msg(1, 30, "concatenate things"), &server)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn global_scope_matches_everywhere_server_scope_only_home() {
        let f = fixture();
        let (one, two) = (open_server(1), open_server(2));
        for s in [1, 2] {
            f.platform.add_member(ServerId(s), member(20, vec![]));
            f.platform.add_member(ServerId(s), member(21, vec![]));
        }
        f.subscribe("cat", KeywordScope::Global, 20).await;
        f.subscribe("cat", KeywordScope::Server(ServerId(1)), 21).await;

        let on_one = f
            .matcher
            .match_message(&msg(1, 30, "a cat"), &one)
            .await
            .unwrap();
        let recipients: Vec<_> = on_one.iter().map(|d| d.recipient).collect();
        assert_eq!(recipients, vec![UserId(20), UserId(21)]);

        let on_two = f
            .matcher
            .match_message(&msg(2, 30, "a cat"), &two)
            .await
            .unwrap();
        let recipients: Vec<_> = on_two.iter().map(|d| d.recipient).collect();
        assert_eq!(recipients, vec![UserId(20)]);
    }

    #[tokio::test]
    async fn author_never_notified_about_own_message() {
        let f = fixture();
        let server = open_server(1);
        f.platform.add_member(ServerId(1), member(20, vec![]));
        f.subscribe("cat", KeywordScope::Global, 20).await;

        let out = f
            .matcher
            .match_message(&msg(1, 20, "my cat"), &server)
            .await
            .unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn multiple_hits_collapse_into_one_delivery_in_order() {
        let f = fixture();
        let server = open_server(1);
        f.platform.add_member(ServerId(1), member(20, vec![]));
        let cat = f.subscribe("cat", KeywordScope::Server(ServerId(1)), 20).await;
        let dog = f.subscribe("dog", KeywordScope::Global, 20).await;

        let out = f
            .matcher
            .match_message(&msg(1, 30, "Dog chases cat!"), &server)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].keywords, vec!["cat".to_string(), "dog".to_string()]);
        assert!(out[0].render().contains("`cat` and `dog`"));

        let repo = f.cache.repo().clone();
        let mut counted = false;
        for _ in 0..200 {
            let subs = repo.all_subscriptions().await.unwrap();
            if subs
                .iter()
                .filter(|s| s.id == cat || s.id == dog)
                .all(|s| s.triggered == 1)
            {
                counted = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert!(counted, "trigger counters were not incremented");
    }

    #[tokio::test]
    async fn pre_filters_short_circuit() {
        let f = fixture();
        let server = open_server(1);
        f.platform.add_member(ServerId(1), member(20, vec![]));
        f.subscribe("cat", KeywordScope::Global, 20).await;

        // Bot authors.
        let mut bot_msg = msg(1, 30, "cat");
        bot_msg.author.bot = true;
        assert!(f.matcher.match_message(&bot_msg, &server).await.unwrap().is_empty());

        // Default prefix, then a per-server prefix.
        assert!(f
            .matcher
            .match_message(&msg(1, 30, "_cat"), &server)
            .await
            .unwrap()
            .is_empty());
        let mut cfg = ServerConfig::new(ServerId(1));
        cfg.prefix = Some("!".to_string());
        f.configs.set(&cfg).await.unwrap();
        assert!(f
            .matcher
            .match_message(&msg(1, 30, "! cat"), &server)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            f.matcher
                .match_message(&msg(1, 30, "_ cat"), &server)
                .await
                .unwrap()
                .len(),
            1
        );

        // Ignored channel.
        f.cache
            .repo()
            .add_ignored_channel(ServerId(1), ChannelId(10))
            .await
            .unwrap();
        f.cache.reload().await.unwrap();
        assert!(f
            .matcher
            .match_message(&msg(1, 30, "cat"), &server)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn subscriber_without_read_access_is_skipped() {
        let f = fixture();
        let mut server = open_server(1);
        server.channels[0].overwrites.push(PermissionOverwrite {
            target: OverwriteTarget::Member(UserId(20)),
            allow: Permissions::NONE,
            deny: Permissions::READ_MESSAGE_HISTORY,
        });
        f.platform.add_member(ServerId(1), member(20, vec![]));
        f.platform.add_member(ServerId(1), member(21, vec![]));
        f.subscribe("cat", KeywordScope::Global, 20).await;
        f.subscribe("cat", KeywordScope::Global, 21).await;
        // Not a member of the server at all.
        f.subscribe("cat", KeywordScope::Global, 22).await;

        let out = f
            .matcher
            .match_message(&msg(1, 30, "cat"), &server)
            .await
            .unwrap();
        let recipients: Vec<_> = out.iter().map(|d| d.recipient).collect();
        assert_eq!(recipients, vec![UserId(21)]);
    }

    #[tokio::test]
    async fn process_sends_direct_messages() {
        let f = fixture();
        f.platform.add_server(open_server(1));
        f.platform.add_member(ServerId(1), member(20, vec![]));
        f.subscribe("cat", KeywordScope::Global, 20).await;

        let server = open_server(1);
        let sent = f.matcher.process(&msg(1, 30, "cat?"), &server).await.unwrap();
        assert_eq!(sent, 1);
        let dms = f.platform.sent_to(dm_channel(UserId(20)));
        assert_eq!(dms.len(), 1);
        assert!(dms[0].contains("User `user30` mentioned `cat` in <#10> on the server `server1`"));
        assert!(dms[0].contains("```cat?```"));

        assert_eq!(f.matcher.process(&msg(1, 30, "dog"), &server).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn counter_failure_does_not_cancel_delivery() {
        let f = fixture_on(Arc::new(UpdatesFail::default()));
        f.platform.add_server(open_server(1));
        f.platform.add_member(ServerId(1), member(20, vec![]));
        let id = f.subscribe("cat", KeywordScope::Global, 20).await;

        let server = open_server(1);
        let out = f
            .matcher
            .match_message(&msg(1, 30, "a cat"), &server)
            .await
            .unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(f.matcher.deliver(&out).await, 1);
        assert_eq!(f.platform.sent_to(dm_channel(UserId(20))).len(), 1);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        let subs = f.cache.repo().all_subscriptions().await.unwrap();
        assert_eq!(subs.iter().find(|s| s.id == id).unwrap().triggered, 0);
    }
}
