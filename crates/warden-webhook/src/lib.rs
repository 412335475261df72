//! Webhook adapter for the error-reporter port.
//!
//! Each fault is POSTed as a small JSON document from a spawned task, so
//! reporting never blocks the caller. Delivery failures are only logged.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Map, Value};
use warden_core::{errors::Error, ports::ErrorReporter, Result};

#[derive(Clone, Debug)]
pub struct WebhookReporter {
    url: String,
    http: reqwest::Client,
}

impl WebhookReporter {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "error webhook url must be http(s): {url}"
            )));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::External(format!("webhook client build error: {e}")))?;
        Ok(Self { url, http })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one payload and check the status.
    pub async fn send(&self, payload: &Value) -> Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::External(format!("webhook request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::External(format!(
                "webhook rejected report: {status} {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }
}

/// `{ "message", "context": {..}, "timestamp" }`.
pub fn build_payload(error: &Error, context: &[(&str, String)]) -> Value {
    let context: Map<String, Value> = context
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::String(v.clone())))
        .collect();
    json!({
        "message": error.to_string(),
        "context": context,
        "timestamp": Utc::now().to_rfc3339(),
    })
}

impl ErrorReporter for WebhookReporter {
    fn report(&self, error: &Error, context: &[(&str, String)]) {
        let payload = build_payload(error, context);
        tracing::error!(context = %warden_core::ports::format_context(context), "{error}");

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime, error report not forwarded to webhook");
            return;
        };
        let reporter = self.clone();
        handle.spawn(async move {
            if let Err(e) = reporter.send(&payload).await {
                tracing::warn!("error report not delivered: {e}");
            }
        });
    }
}
