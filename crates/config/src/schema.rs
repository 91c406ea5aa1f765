/// Config schema types (HTTP client, dispatch run, endpoints, channel credentials).
use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::error::{Error, Result};

pub const DEFAULT_API_HOST: &str = "api.dingtalk.com";
pub const DEFAULT_OAPI_HOST: &str = "oapi.dingtalk.com";

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DingbotConfig {
    pub http: HttpConfig,
    pub dispatch: DispatchConfig,
    pub endpoints: EndpointsConfig,
    /// Credentials for the channel used by `dingbot send`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelCredentials>,
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Timeout applied to every single request (token, lookup, upload, send).
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

impl HttpConfig {
    /// Reject zero timeouts; they fail every request before it is sent.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_secs == 0 {
            return Err(Error::invalid(
                "http.request_timeout_secs must be greater than zero",
            ));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::invalid(
                "http.connect_timeout_secs must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Per-run dispatch behavior.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Record per-item failures and keep going instead of aborting the run.
    pub continue_on_fail: bool,
    /// Upper bound for a whole run. `None` means unbounded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_deadline_secs: Option<u64>,
    /// Pace custom-robot sends to at most this many requests per minute.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_requests_per_minute: Option<u32>,
}

impl DispatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.run_deadline_secs == Some(0) {
            return Err(Error::invalid(
                "dispatch.run_deadline_secs must be greater than zero when set",
            ));
        }
        if self.webhook_requests_per_minute == Some(0) {
            return Err(Error::invalid(
                "dispatch.webhook_requests_per_minute must be greater than zero when set",
            ));
        }
        Ok(())
    }
}

/// Base URLs of the two DingTalk API hosts.
///
/// Left empty, they are derived from the enterprise credentials' `protocol`
/// (see [`EndpointsConfig::resolve`]).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    /// Host serving `/v1.0/oauth2/accessToken` and the robot batch-send API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Host serving `/topapi/v2/user/getbymobile` and `/media/upload`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oapi_base_url: Option<String>,
}

/// Fully resolved endpoint base URLs, without trailing slashes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub api_base_url: String,
    pub oapi_base_url: String,
}

impl EndpointsConfig {
    #[must_use]
    pub fn resolve(&self, protocol: &str) -> Endpoints {
        let protocol = match protocol.trim() {
            "" => "https",
            p => p,
        };
        let pick = |configured: &Option<String>, host: &str| {
            configured
                .as_deref()
                .filter(|u| !u.trim().is_empty())
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or_else(|| format!("{protocol}://{host}"))
        };
        Endpoints {
            api_base_url: pick(&self.api_base_url, DEFAULT_API_HOST),
            oapi_base_url: pick(&self.oapi_base_url, DEFAULT_OAPI_HOST),
        }
    }
}

impl Default for Endpoints {
    fn default() -> Self {
        EndpointsConfig::default().resolve("https")
    }
}

/// Credentials of the channel a run dispatches through.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelCredentials {
    CustomRobot(CustomRobotCredentials),
    EnterpriseRobot(EnterpriseRobotCredentials),
}

impl ChannelCredentials {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CustomRobot(_) => "custom_robot",
            Self::EnterpriseRobot(_) => "enterprise_robot",
        }
    }

    /// Reject credentials missing a field required by their channel.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::CustomRobot(c) => c.validate(),
            Self::EnterpriseRobot(c) => c.validate(),
        }
    }
}

/// A per-webhook custom robot.
#[derive(Clone, Serialize, Deserialize)]
pub struct CustomRobotCredentials {
    /// Full webhook URL including its `access_token` query parameter.
    pub webhook_url: String,

    /// Signing secret (`SEC...`). Absent or empty means the URL is used unsigned.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_option_secret"
    )]
    pub webhook_sign: Option<Secret<String>>,
}

impl CustomRobotCredentials {
    #[must_use]
    pub fn new(webhook_url: impl Into<String>, webhook_sign: Option<&str>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            webhook_sign: webhook_sign.map(|s| Secret::new(s.to_string())),
        }
    }

    /// The signing secret, if one is configured and non-empty.
    #[must_use]
    pub fn signing_secret(&self) -> Option<&str> {
        self.webhook_sign
            .as_ref()
            .map(|s| s.expose_secret().as_str())
            .filter(|s| !s.is_empty())
    }

    fn validate(&self) -> Result<()> {
        if self.webhook_url.trim().is_empty() {
            return Err(Error::invalid("channel.webhook_url is required"));
        }
        Ok(())
    }
}

impl std::fmt::Debug for CustomRobotCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomRobotCredentials")
            .field("webhook_url", &redact_query(&self.webhook_url))
            .field(
                "webhook_sign",
                &self.webhook_sign.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// An organization-wide enterprise robot reached through the OpenAPI.
#[derive(Clone, Serialize, Deserialize)]
pub struct EnterpriseRobotCredentials {
    pub robot_code: String,

    /// App key used for the OAuth2 token request.
    pub access_key_id: String,

    /// App secret used for the OAuth2 token request.
    #[serde(serialize_with = "serialize_secret")]
    pub access_key_secret: Secret<String>,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_region_id")]
    pub region_id: String,
}

impl EnterpriseRobotCredentials {
    #[must_use]
    pub fn new(
        robot_code: impl Into<String>,
        access_key_id: impl Into<String>,
        access_key_secret: impl Into<String>,
    ) -> Self {
        Self {
            robot_code: robot_code.into(),
            access_key_id: access_key_id.into(),
            access_key_secret: Secret::new(access_key_secret.into()),
            protocol: default_protocol(),
            region_id: default_region_id(),
        }
    }

    fn validate(&self) -> Result<()> {
        let missing = [
            ("robot_code", self.robot_code.as_str()),
            ("access_key_id", self.access_key_id.as_str()),
            ("access_key_secret", self.access_key_secret.expose_secret()),
            ("protocol", self.protocol.as_str()),
            ("region_id", self.region_id.as_str()),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| format!("channel.{name}"))
        .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(Error::invalid(format!(
                "missing enterprise robot credentials: {}",
                missing.join(", ")
            )));
        }
        if !matches!(self.protocol.as_str(), "http" | "https") {
            return Err(Error::invalid(format!(
                "channel.protocol must be http or https, got '{}'",
                self.protocol
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for EnterpriseRobotCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnterpriseRobotCredentials")
            .field("robot_code", &self.robot_code)
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"[REDACTED]")
            .field("protocol", &self.protocol)
            .field("region_id", &self.region_id)
            .finish()
    }
}

fn default_protocol() -> String {
    "https".into()
}

fn default_region_id() -> String {
    "central".into()
}

/// Webhook URLs carry the robot token in their query string.
fn redact_query(url: &str) -> String {
    match url.split_once('?') {
        Some((base, _)) => format!("{base}?[REDACTED]"),
        None => url.to_string(),
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}
