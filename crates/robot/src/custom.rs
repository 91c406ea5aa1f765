//! Custom robot: one signed webhook per group.

use std::time::Duration;

use {
    async_trait::async_trait,
    dingbot_config::CustomRobotCredentials,
    secrecy::{ExposeSecret, Secret},
    tokio::{sync::Mutex, time::Instant},
    tracing::debug,
};

use crate::{
    api::read_response,
    dispatcher::{ChannelDispatcher, ChannelKind, DispatchItem, DispatchOutput},
    error::{Error, Result},
    payload::custom_robot_body,
    sign::{now_millis, signed_webhook_url},
};

/// Minimum spacing between sends to the same webhook.
struct Pacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    fn per_minute(requests: u32) -> Option<Self> {
        (requests > 0).then(|| Self {
            interval: Duration::from_secs(60) / requests,
            last: Mutex::new(None),
        })
    }

    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            let ready = prev + self.interval;
            if ready > Instant::now() {
                debug!(wait = ?(ready - Instant::now()), "pacing webhook");
                tokio::time::sleep_until(ready).await;
            }
        }
        *last = Some(Instant::now());
    }
}

/// Posts items to a custom robot webhook, signing each request when a secret
/// is configured.
pub struct CustomRobotDispatcher {
    http: reqwest::Client,
    webhook_url: String,
    secret: Option<Secret<String>>,
    pacer: Option<Pacer>,
    clock: fn() -> i64,
}

impl CustomRobotDispatcher {
    #[must_use]
    pub fn new(http: reqwest::Client, credentials: &CustomRobotCredentials) -> Self {
        Self {
            http,
            webhook_url: credentials.webhook_url.trim().to_string(),
            secret: credentials
                .signing_secret()
                .map(|s| Secret::new(s.to_string())),
            pacer: None,
            clock: now_millis,
        }
    }

    /// Space sends so the webhook sees at most `requests` per minute.
    #[must_use]
    pub fn with_rate_limit(mut self, requests: Option<u32>) -> Self {
        self.pacer = requests.and_then(Pacer::per_minute);
        self
    }

    /// Override the signing clock (epoch milliseconds).
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    fn request_url(&self) -> Result<String> {
        let secret = self.secret.as_ref().map(|s| s.expose_secret().as_str());
        signed_webhook_url(&self.webhook_url, secret, (self.clock)())
    }
}

#[async_trait]
impl ChannelDispatcher for CustomRobotDispatcher {
    fn kind(&self) -> ChannelKind {
        ChannelKind::CustomRobot
    }

    async fn dispatch(
        &self,
        item_index: usize,
        item: &DispatchItem,
        out: &mut Vec<DispatchOutput>,
    ) -> Result<()> {
        let body = custom_robot_body(&item.message)?;

        if let Some(pacer) = &self.pacer {
            pacer.wait().await;
        }
        // Signed after pacing so the timestamp is the actual send time.
        let url = self.request_url()?;
        debug!(
            item_index,
            msgtype = body.get("msgtype").and_then(|v| v.as_str()).unwrap_or("raw"),
            signed = self.secret.is_some(),
            "posting to custom robot webhook"
        );

        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport("webhook send", e))?;
        let json = read_response(resp, "webhook send").await?;
        out.push(DispatchOutput::response(json));
        Ok(())
    }
}
