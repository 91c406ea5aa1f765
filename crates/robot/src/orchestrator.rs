//! Per-run driver: sends items in order over the configured channel and
//! collects the ordered output batch.

use std::time::Duration;

use {
    dingbot_config::{ChannelCredentials, DingbotConfig, DispatchConfig, Endpoints},
    serde::Serialize,
    tokio::time::Instant,
    tracing::{Instrument, error, info, info_span, warn},
};

use crate::{
    api::build_client,
    auth::TokenManager,
    custom::CustomRobotDispatcher,
    dispatcher::{ChannelDispatcher, DispatchItem, DispatchOutput},
    enterprise::EnterpriseRobotDispatcher,
    error::{Error, ErrorDetail, Result},
};

/// Run-level behavior switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Record failures in the output batch instead of aborting on the first.
    pub continue_on_fail: bool,
    /// Items not finished within this time from run start fail as
    /// [`Error::DeadlineExceeded`].
    pub run_deadline: Option<Duration>,
    pub webhook_requests_per_minute: Option<u32>,
}

impl From<&DispatchConfig> for RunOptions {
    fn from(config: &DispatchConfig) -> Self {
        Self {
            continue_on_fail: config.continue_on_fail,
            run_deadline: config.run_deadline_secs.map(Duration::from_secs),
            webhook_requests_per_minute: config.webhook_requests_per_minute,
        }
    }
}

/// Ordered outputs of one run plus summary counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchReport {
    pub outputs: Vec<DispatchOutput>,
    /// Platform responses received.
    pub sent: usize,
    /// Items recorded as failed.
    pub failed: usize,
    /// Mobiles that could not be resolved, across all items.
    pub unresolved: usize,
}

impl DispatchReport {
    fn from_outputs(outputs: Vec<DispatchOutput>) -> Self {
        let mut report = Self::default();
        for output in &outputs {
            match output {
                DispatchOutput::Failed { .. } => report.failed += 1,
                DispatchOutput::Response { json } => match json.get("failUser") {
                    Some(users) => {
                        report.unresolved += users.as_array().map_or(0, Vec::len);
                    },
                    None => report.sent += 1,
                },
            }
        }
        report.outputs = outputs;
        report
    }
}

/// Drives dispatch runs for one set of channel credentials.
///
/// On the enterprise channel every run fetches its own access token and
/// drops it when the run ends.
pub struct Orchestrator {
    http: reqwest::Client,
    credentials: ChannelCredentials,
    endpoints: Endpoints,
    options: RunOptions,
    tokens: Option<TokenManager>,
}

impl Orchestrator {
    /// Validate credentials and set up the channel.
    pub fn new(
        http: reqwest::Client,
        credentials: ChannelCredentials,
        endpoints: Endpoints,
        options: RunOptions,
    ) -> Result<Self> {
        credentials.validate().map_err(Error::config)?;
        let tokens = match &credentials {
            ChannelCredentials::EnterpriseRobot(c) => Some(TokenManager::new(
                http.clone(),
                &endpoints.api_base_url,
                c,
            )),
            ChannelCredentials::CustomRobot(_) => None,
        };
        Ok(Self {
            http,
            credentials,
            endpoints,
            options,
            tokens,
        })
    }

    /// Build an orchestrator from a loaded configuration file.
    pub fn from_config(config: &DingbotConfig) -> Result<Self> {
        let credentials = config
            .channel
            .clone()
            .ok_or_else(|| Error::config("no [channel] section configured"))?;
        let protocol = match &credentials {
            ChannelCredentials::EnterpriseRobot(c) => c.protocol.as_str(),
            ChannelCredentials::CustomRobot(_) => "https",
        };
        config.http.validate().map_err(Error::config)?;
        config.dispatch.validate().map_err(Error::config)?;
        let endpoints = config.endpoints.resolve(protocol);
        let http = build_client(&config.http)?;
        Self::new(http, credentials, endpoints, RunOptions::from(&config.dispatch))
    }

    #[must_use]
    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Token source of an enterprise channel.
    #[must_use]
    pub fn token_manager(&self) -> Option<&TokenManager> {
        self.tokens.as_ref()
    }

    /// Dispatch `items` in order.
    ///
    /// Without continue-on-fail the first failing item aborts the run and its
    /// error carries the item index.
    pub async fn run(&self, items: &[DispatchItem]) -> Result<DispatchReport> {
        if items.is_empty() {
            info!(channel = self.credentials.kind(), "nothing to dispatch");
            return Ok(DispatchReport::default());
        }
        let started = Instant::now();
        info!(
            channel = self.credentials.kind(),
            items = items.len(),
            continue_on_fail = self.options.continue_on_fail,
            "dispatch run started"
        );

        let report = match (&self.credentials, &self.tokens) {
            (ChannelCredentials::CustomRobot(creds), _) => {
                let dispatcher = CustomRobotDispatcher::new(self.http.clone(), creds)
                    .with_rate_limit(self.options.webhook_requests_per_minute);
                self.drive(&dispatcher, items, started).await?
            },
            (ChannelCredentials::EnterpriseRobot(creds), Some(tokens)) => {
                // Valid for this run only.
                let token = match tokens.acquire().await {
                    Ok(token) => token,
                    Err(e) => return self.fail_all(items, e),
                };
                let dispatcher = EnterpriseRobotDispatcher::new(
                    self.http.clone(),
                    &self.endpoints.api_base_url,
                    &self.endpoints.oapi_base_url,
                    creds.robot_code.clone(),
                    &token,
                );
                self.drive(&dispatcher, items, started).await?
            },
            (ChannelCredentials::EnterpriseRobot(_), None) => {
                return Err(Error::config("enterprise channel has no token manager"));
            },
        };

        info!(
            sent = report.sent,
            failed = report.failed,
            unresolved = report.unresolved,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "dispatch run finished"
        );
        Ok(report)
    }

    async fn drive<D: ChannelDispatcher>(
        &self,
        dispatcher: &D,
        items: &[DispatchItem],
        started: Instant,
    ) -> Result<DispatchReport> {
        let mut outputs = Vec::with_capacity(items.len());
        for (item_index, item) in items.iter().enumerate() {
            let span = info_span!("dispatch_item", item_index, channel = %dispatcher.kind());
            let result = self
                .dispatch_within_deadline(dispatcher, item_index, item, &mut outputs, started)
                .instrument(span)
                .await;
            if let Err(e) = result {
                self.record_failure(item_index, item, e, &mut outputs)?;
            }
        }
        Ok(DispatchReport::from_outputs(outputs))
    }

    async fn dispatch_within_deadline<D: ChannelDispatcher>(
        &self,
        dispatcher: &D,
        item_index: usize,
        item: &DispatchItem,
        outputs: &mut Vec<DispatchOutput>,
        started: Instant,
    ) -> Result<()> {
        let Some(deadline) = self.options.run_deadline else {
            return dispatcher.dispatch(item_index, item, outputs).await;
        };
        let exceeded = Error::DeadlineExceeded {
            secs: deadline.as_secs(),
        };
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(exceeded);
        }
        tokio::time::timeout(remaining, dispatcher.dispatch(item_index, item, outputs))
            .await
            .map_err(|_| exceeded)?
    }

    /// Record `err` for `item_index`, or return it when the run must abort.
    fn record_failure(
        &self,
        item_index: usize,
        item: &DispatchItem,
        err: Error,
        outputs: &mut Vec<DispatchOutput>,
    ) -> Result<()> {
        let err = err.at_item(item_index);
        if !self.options.continue_on_fail {
            error!(item_index, kind = %err.kind(), error = %err, "dispatch aborted");
            return Err(err);
        }
        warn!(item_index, kind = %err.kind(), error = %err, "item failed, continuing");
        outputs.push(DispatchOutput::Failed {
            json: item.json.clone(),
            error: ErrorDetail::from(&err),
            item_index,
        });
        Ok(())
    }

    /// A run-level failure (no token) applied to every item.
    fn fail_all(&self, items: &[DispatchItem], err: Error) -> Result<DispatchReport> {
        if !self.options.continue_on_fail {
            error!(error = %err, "dispatch run could not start");
            return Err(err.at_item(0));
        }
        let detail = ErrorDetail::from(&err);
        warn!(
            error = %err,
            items = items.len(),
            "dispatch run could not start, failing all items"
        );
        let outputs = items
            .iter()
            .enumerate()
            .map(|(item_index, item)| DispatchOutput::Failed {
                json: item.json.clone(),
                error: detail.clone(),
                item_index,
            })
            .collect();
        Ok(DispatchReport::from_outputs(outputs))
    }
}
