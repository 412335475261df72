//! Composition root: turns the environment into a running [`Bot`].
//!
//! A platform adapter calls [`launch`] once at startup with its client, then
//! feeds inbound events to the returned bot.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use warden_core::{
    config::Config,
    platform::port::PlatformClient,
    ports::{ErrorReporter, LogReporter},
    router::Bot,
    Result,
};
use warden_webhook::WebhookReporter;

pub struct Running {
    pub bot: Bot,
    /// Cancel to stop background refreshes on shutdown.
    pub shutdown: CancellationToken,
}

/// Webhook reporter when `WARDEN_ERROR_WEBHOOK_URL` is set, log-only otherwise.
pub fn error_reporter(cfg: &Config) -> Result<Arc<dyn ErrorReporter>> {
    match &cfg.error_webhook_url {
        Some(url) => Ok(Arc::new(WebhookReporter::new(url.clone())?)),
        None => Ok(Arc::new(LogReporter)),
    }
}

/// Install logging, load the configuration and start the bot.
pub async fn launch(service_name: &str, platform: Arc<dyn PlatformClient>) -> Result<Running> {
    warden_core::logging::init(service_name)?;
    let cfg = Config::load()?;
    start(cfg, platform).await
}

/// Start the bot from an already loaded configuration.
pub async fn start(cfg: Config, platform: Arc<dyn PlatformClient>) -> Result<Running> {
    let reporter = error_reporter(&cfg)?;
    tracing::info!(
        data_file = %cfg.data_file.display(),
        webhook = cfg.error_webhook_url.is_some(),
        throttle = cfg.throttle_enabled,
        "starting warden"
    );

    let bot = Bot::from_config(cfg, platform, reporter).await?;
    let shutdown = bot.start().await?;
    Ok(Running { bot, shutdown })
}
