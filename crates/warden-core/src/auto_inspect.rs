//! Automatic inspections on member joins and bans seen on other servers.

use std::sync::Arc;

use chrono::Utc;

use crate::{
    domain::{Server, ServerId, User},
    errors::Error,
    inspection::{
        report::{self, InspectReason},
        Inspection, Inspector,
    },
    ports::ErrorReporter,
    server_config::{InspectTriggers, ServerConfig, ServerConfigStore},
    Result,
};

/// A report is published only when an enabled trigger's condition actually holds.
pub fn should_publish(triggers: &InspectTriggers, inspection: &Inspection) -> bool {
    (triggers.foreign_ban && !inspection.result.banned_on.is_empty())
        || (triggers.no_common_servers && inspection.result.other_common_servers() == 0)
        || (triggers.new_account && inspection.account_age.is_new())
}

pub struct AutoInspector {
    inspector: Inspector,
    configs: Arc<dyn ServerConfigStore>,
    reporter: Arc<dyn ErrorReporter>,
}

impl AutoInspector {
    pub fn new(
        inspector: Inspector,
        configs: Arc<dyn ServerConfigStore>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        Self {
            inspector,
            configs,
            reporter,
        }
    }

    /// Returns whether a report was published.
    pub async fn on_member_join(&self, server_id: ServerId, user: &User) -> Result<bool> {
        let config = self.configs.get(server_id).await?;
        if !config.triggers.any_enabled() || config.inspects_channel.is_none() {
            return Ok(false);
        }

        let inspection = self.inspector.inspect(user.id, &mut |_| {}).await?;
        match self
            .publish(&config, user, &inspection, InspectReason::Joined)
            .await
        {
            Ok(published) => Ok(published),
            Err(e) => {
                self.report(&e, server_id, user);
                Ok(false)
            }
        }
    }

    /// Notify every other server that opted into foreign-ban reports and still
    /// has `user` as a member. The scan runs once and is shared.
    ///
    /// Returns the number of reports published.
    pub async fn on_foreign_ban(&self, banned_on: ServerId, user: &User) -> Result<usize> {
        let servers = self.inspector.platform().list_servers().await?;

        let mut targets: Vec<(&Server, ServerConfig)> = Vec::new();
        for server in servers.iter().filter(|s| s.id != banned_on) {
            match self.configs.get(server.id).await {
                Ok(config) if config.triggers.foreign_ban => targets.push((server, config)),
                Ok(_) => {}
                Err(e) => self.report(&e, server.id, user),
            }
        }
        if targets.is_empty() {
            return Ok(0);
        }

        let inspection = self
            .inspector
            .inspect_on(user.id, &servers, &mut |_| {})
            .await?;

        let mut published = 0;
        for (server, config) in targets {
            if !inspection.result.common_servers.contains(&server.id) {
                continue;
            }
            match self
                .publish(&config, user, &inspection, InspectReason::BannedElsewhere)
                .await
            {
                Ok(true) => published += 1,
                Ok(false) => {}
                Err(e) => self.report(&e, server.id, user),
            }
        }

        tracing::info!(server = %banned_on, user = %user.id, published, "foreign ban handled");
        Ok(published)
    }

    async fn publish(
        &self,
        config: &ServerConfig,
        user: &User,
        inspection: &Inspection,
        reason: InspectReason,
    ) -> Result<bool> {
        let Some(channel_id) = config.inspects_channel else {
            tracing::debug!(server = %config.server_id, "no inspection channel configured");
            return Ok(false);
        };
        if !should_publish(&config.triggers, inspection) {
            return Ok(false);
        }

        let text = report::render(user, inspection, config.server_id, reason, Utc::now());
        self.inspector
            .platform()
            .send_message(channel_id, &text)
            .await?;
        Ok(true)
    }

    fn report(&self, error: &Error, server_id: ServerId, user: &User) {
        self.reporter.report(
            error,
            &[
                ("component", "auto_inspect".to_string()),
                ("server", server_id.to_string()),
                ("user", user.id.to_string()),
            ],
        );
    }
}
