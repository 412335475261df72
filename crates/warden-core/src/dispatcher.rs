//! Command routing with per-invocation fault containment.

use std::{any::Any, collections::HashMap, fmt, panic::AssertUnwindSafe, sync::Arc};

use async_trait::async_trait;
use futures_util::FutureExt;
use tokio::task::JoinHandle;

use crate::{
    domain::{Message, Server},
    errors::Error,
    platform::port::PlatformClient,
    ports::ErrorReporter,
    Result,
};

/// Everything a handler knows about one invocation.
#[derive(Clone, Debug)]
pub struct CommandContext {
    pub command: String,
    /// Text after the command token, outer whitespace trimmed.
    pub content: String,
    pub message: Message,
    pub server: Server,
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Exact, case-sensitive command tokens this handler answers to.
    fn names(&self) -> &'static [&'static str];

    async fn handle(&self, ctx: CommandContext) -> Result<()>;
}

/// Why a handler invocation did not complete.
#[derive(Debug)]
pub enum Fault {
    Failed(Error),
    Panicked(String),
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::Failed(e) => write!(f, "{e}"),
            Fault::Panicked(msg) => write!(f, "internal fault: {msg}"),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run `handler` for `ctx`, converting both errors and panics into a [`Fault`].
pub async fn invoke(handler: &dyn CommandHandler, ctx: CommandContext) -> std::result::Result<(), Fault> {
    match AssertUnwindSafe(handler.handle(ctx)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(Fault::Failed(e)),
        Err(payload) => Err(Fault::Panicked(panic_message(payload))),
    }
}

/// Split `text` into `(command, content)` if it starts with `prefix`.
pub fn parse_command(text: &str, prefix: &str) -> Option<(String, String)> {
    let rest = text.strip_prefix(prefix)?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or("");
    if command.is_empty() {
        return None;
    }
    let content = parts.next().unwrap_or("").trim().to_string();
    Some((command.to_string(), content))
}

pub struct Dispatcher {
    handlers: Vec<Arc<dyn CommandHandler>>,
    by_name: HashMap<&'static str, usize>,
    platform: Arc<dyn PlatformClient>,
    reporter: Arc<dyn ErrorReporter>,
}

impl Dispatcher {
    pub fn new(
        handlers: Vec<Arc<dyn CommandHandler>>,
        platform: Arc<dyn PlatformClient>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let mut by_name = HashMap::new();
        for (idx, handler) in handlers.iter().enumerate() {
            for name in handler.names() {
                if by_name.insert(*name, idx).is_some() {
                    tracing::warn!(command = %name, "command registered twice, last one wins");
                }
            }
        }
        Self {
            handlers,
            by_name,
            platform,
            reporter,
        }
    }

    /// Run the handler bound to `ctx.command` in its own task.
    ///
    /// Unknown commands are ignored and return `None`. A fault inside the
    /// handler produces one error message in the originating channel.
    pub fn route(&self, ctx: CommandContext) -> Option<JoinHandle<()>> {
        let idx = *self.by_name.get(ctx.command.as_str())?;
        let handler = self.handlers[idx].clone();
        let platform = self.platform.clone();
        let reporter = self.reporter.clone();

        Some(tokio::spawn(async move {
            let command = ctx.command.clone();
            let channel_id = ctx.message.channel_id;
            let server_id = ctx.server.id;
            let author = ctx.message.author.id;

            tracing::debug!(%command, server = %server_id, user = %author, "dispatching command");
            let Err(fault) = invoke(handler.as_ref(), ctx).await else {
                return;
            };

            tracing::error!(%command, server = %server_id, user = %author, "command failed: {fault}");
            let error = match &fault {
                Fault::Failed(e) => Error::External(e.to_string()),
                Fault::Panicked(msg) => Error::External(format!("panic: {msg}")),
            };
            reporter.report(
                &error,
                &[
                    ("command", command.clone()),
                    ("server", server_id.to_string()),
                    ("user", author.to_string()),
                ],
            );

            let text = format!("⚠ Something went wrong while running `{command}`: {fault}");
            if let Err(e) = platform.send_message(channel_id, &text).await {
                tracing::warn!(%command, channel = %channel_id, "could not send error report: {e}");
            }
        }))
    }
}
