//! Host-facing entry points: wires the services together and fans inbound
//! events out to background tasks.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    auto_inspect::AutoInspector,
    commands::{default_handlers, CommandServices},
    config::Config,
    dispatcher::{parse_command, CommandContext, Dispatcher},
    domain::{Message, ServerId, User},
    errors::Error,
    inspection::Inspector,
    notifications::{NotificationMatcher, NotificationRepo},
    platform::{
        port::PlatformClient,
        throttled::ThrottledPlatform,
    },
    ports::ErrorReporter,
    server_config::{DocumentServerConfigStore, ServerConfigStore},
    settings_cache::SettingsCache,
    store::{DocumentStore, JsonFileStore},
    Result,
};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub platform: Arc<dyn PlatformClient>,
    pub cache: Arc<SettingsCache>,
    pub configs: Arc<dyn ServerConfigStore>,
    pub matcher: Arc<NotificationMatcher>,
    pub dispatcher: Arc<Dispatcher>,
    pub auto_inspector: Arc<AutoInspector>,
    pub reporter: Arc<dyn ErrorReporter>,
}

/// The moderation bot. Cheap to clone; every handler returns immediately and
/// does its remote work in a spawned task.
#[derive(Clone)]
pub struct Bot {
    state: Arc<AppState>,
}

impl Bot {
    pub fn new(
        cfg: Config,
        platform: Arc<dyn PlatformClient>,
        store: Arc<dyn DocumentStore>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let platform: Arc<dyn PlatformClient> = if cfg.throttle_enabled {
            Arc::new(ThrottledPlatform::new(platform, cfg.throttle))
        } else {
            platform
        };

        let cache = Arc::new(SettingsCache::new(NotificationRepo::new(store.clone())));
        let configs: Arc<dyn ServerConfigStore> = Arc::new(DocumentServerConfigStore::new(store));
        let inspector = Inspector::new(platform.clone(), cfg.max_concurrent_scans);

        let matcher = Arc::new(NotificationMatcher::new(
            cache.clone(),
            platform.clone(),
            configs.clone(),
            cfg.default_prefix.clone(),
        ));
        let handlers = default_handlers(&CommandServices {
            platform: platform.clone(),
            cache: cache.clone(),
            configs: configs.clone(),
            inspector: inspector.clone(),
        });
        let dispatcher = Arc::new(Dispatcher::new(handlers, platform.clone(), reporter.clone()));
        let auto_inspector = Arc::new(AutoInspector::new(
            inspector,
            configs.clone(),
            reporter.clone(),
        ));

        Self {
            state: Arc::new(AppState {
                cfg: Arc::new(cfg),
                platform,
                cache,
                configs,
                matcher,
                dispatcher,
                auto_inspector,
                reporter,
            }),
        }
    }

    /// Build a bot persisted to the JSON document store at `cfg.data_file`.
    pub async fn from_config(
        cfg: Config,
        platform: Arc<dyn PlatformClient>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self> {
        let store = JsonFileStore::open(&cfg.data_file).await?;
        tracing::info!(path = %store.path().display(), "opened document store");
        Ok(Self::new(cfg, platform, Arc::new(store), reporter))
    }

        pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Load the settings cache and start its periodic refresh.
    ///
    /// Cancel the returned token on shutdown to stop the refresh loop.
    pub async fn start(&self) -> Result<CancellationToken> {
        let snapshot = self.state.cache.reload().await?;
        tracing::info!(
            subscriptions = snapshot.subscriptions.len(),
            ignored_channels = snapshot.ignored_channels.len(),
            "warden started"
        );

        let cancel = CancellationToken::new();
        self.state
            .cache
            .spawn_refresh_loop(self.state.cfg.cache_refresh_interval, cancel.clone());
        Ok(cancel)
    }

    /// A message was posted. Commands go to the dispatcher, everything else to
    /// keyword matching.
    pub fn handle_message(&self, message: Message) -> JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            if let Err(e) = on_message(&state, &message).await {
                state.reporter.report(
                    &e,
                    &[
                        ("event", "message".to_string()),
                        ("channel", message.channel_id.to_string()),
                    ],
                );
            }
        })
    }

    pub fn handle_member_join(&self, server_id: ServerId, user: User) -> JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            if user.bot {
                return;
            }
            if let Err(e) = state.auto_inspector.on_member_join(server_id, &user).await {
                report_event(&state, &e, "member_join", server_id, &user);
            }
        })
    }

    /// `user` was banned on `server_id`; other servers may want to know.
    pub fn handle_ban_add(&self, server_id: ServerId, user: User) -> JoinHandle<()> {
        let state = self.state.clone();
        tokio::spawn(async move {
            if let Err(e) = state.auto_inspector.on_foreign_ban(server_id, &user).await {
                report_event(&state, &e, "ban_add", server_id, &user);
            }
        })
    }
}

async fn on_message(state: &AppState, message: &Message) -> Result<()> {
    let Some(server_id) = message.server_id else {
        return Ok(());
    };
    if message.author.bot {
        return Ok(());
    }
    let Some(server) = state.platform.get_server(server_id).await? else {
        tracing::debug!(server = %server_id, "message from unknown server");
        return Ok(());
    };

    let config = state.configs.get(server_id).await?;
    let prefix = config
        .prefix
        .as_deref()
        .filter(|p| !p.is_empty())
        .unwrap_or(&state.cfg.default_prefix);

    if let Some((command, content)) = parse_command(&message.content, prefix) {
        state.dispatcher.route(CommandContext {
            command,
            content,
            message: message.clone(),
            server,
        });
        return Ok(());
    }

    state.matcher.process(message, &server).await?;
    Ok(())
}

fn report_event(state: &AppState, error: &Error, event: &str, server_id: ServerId, user: &User) {
    state.reporter.report(
        error,
        &[
            ("event", event.to_string()),
            ("server", server_id.to_string()),
            ("user", user.id.to_string()),
        ],
    );
}
