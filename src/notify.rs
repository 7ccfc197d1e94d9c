//! Best-effort side-channel notifications.
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tracing::{debug, warn};

pub const DEFAULT_APPRISE_API: &str = "http://localhost:8000";

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Deliver a notification, logging instead of propagating any failure.
pub async fn notify_best_effort(notifier: &dyn Notifier, title: &str, body: &str) {
    if let Err(err) = notifier.notify(title, body).await {
        warn!(error = %err, title, "failed to send notification");
    }
}

/// Used when no notification target is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, title: &str, _body: &str) -> Result<()> {
        debug!(title, "notification target not configured; skipping");
        Ok(())
    }
}

/// Sends notifications through an Apprise API server's stateless endpoint.
#[derive(Debug, Clone)]
pub struct AppriseNotifier {
    http: Client,
    endpoint: String,
    target: String,
}

impl AppriseNotifier {
    /// `api_base` is the Apprise API server, `target` the Apprise URL to notify.
    pub fn new(api_base: &str, target: impl Into<String>) -> Result<Self> {
        let base = url::Url::parse(api_base)
            .with_context(|| format!("invalid APPRISE_API url `{api_base}`"))?;
        let endpoint = base
            .join("notify/")
            .context("building apprise notify endpoint")?;
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("building apprise http client")?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
            target: target.into(),
        })
    }

    #[cfg(test)]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Notifier for AppriseNotifier {
    async fn notify(&self, title: &str, body: &str) -> Result<()> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "urls": self.target, "title": title, "body": body }))
            .send()
            .await
            .context("sending apprise notification")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("apprise returned {status}: {text}"));
        }
        Ok(())
    }
}

/// Pick the notifier for the configured target; `None` disables notifications.
pub fn from_config(api_base: Option<&str>, target: Option<&str>) -> Result<Box<dyn Notifier>> {
    match target {
        Some(target) => Ok(Box::new(AppriseNotifier::new(
            api_base.unwrap_or(DEFAULT_APPRISE_API),
            target,
        )?)),
        None => Ok(Box::new(NoopNotifier)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apprise_endpoint_is_joined_onto_api_base() {
        let n = AppriseNotifier::new("http://apprise.local:8000", "tgram://token/chat").unwrap();
        assert_eq!(n.endpoint(), "http://apprise.local:8000/notify/");
    }

    #[test]
    fn rejects_invalid_api_base() {
        assert!(AppriseNotifier::new("not a url", "x").is_err());
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let mut mock = MockNotifier::new();
        mock.expect_notify()
            .times(1)
            .returning(|_, _| Err(anyhow!("unreachable")));
        notify_best_effort(&mock, "title", "body").await;
    }
}
