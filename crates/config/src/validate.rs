//! Configuration validation.
//!
//! Parses a config file the same way the loader does and reports problems a
//! dispatch run would otherwise only hit at send time.

use std::path::{Path, PathBuf};

use crate::{
    env_subst::{substitute_env, unresolved_placeholders},
    loader::{find_config_file, parse_config},
    schema::{ChannelCredentials, DingbotConfig},
};

/// Documented ceiling for a single custom robot webhook.
const WEBHOOK_RATE_CEILING_PER_MINUTE: u32 = 20;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "channel.webhook_url"
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn new(severity: Severity, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result of validating a configuration file.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
    pub config_path: Option<PathBuf>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Count diagnostics by severity.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

/// Validate the config at `path`, or the discovered one when `None`.
pub fn validate(path: Option<&Path>) -> ValidationResult {
    let config_path = path.map(Path::to_path_buf).or_else(find_config_file);
    let Some(config_path) = config_path else {
        let mut result = ValidationResult::default();
        check_config(&DingbotConfig::default(), &mut result.diagnostics);
        return result;
    };

    let mut result = match std::fs::read_to_string(&config_path) {
        Ok(raw) => validate_str(&raw, &config_path),
        Err(e) => ValidationResult {
            diagnostics: vec![Diagnostic::new(
                Severity::Error,
                "",
                format!("cannot read config file: {e}"),
            )],
            config_path: None,
        },
    };
    result.config_path = Some(config_path);
    result
}

/// Validate raw (unsubstituted) config text; the format follows `path`'s extension.
pub fn validate_str(raw: &str, path: &Path) -> ValidationResult {
    let mut diagnostics = Vec::new();
    let substituted = substitute_env(raw);

    for name in unresolved_placeholders(&substituted) {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "",
            format!("environment variable {name} is not set"),
        ));
    }

    match parse_config(&substituted, path) {
        Ok(config) => check_config(&config, &mut diagnostics),
        Err(e) => diagnostics.push(Diagnostic::new(Severity::Error, "", e.to_string())),
    }

    ValidationResult {
        diagnostics,
        config_path: Some(path.to_path_buf()),
    }
}

fn check_config(config: &DingbotConfig, diagnostics: &mut Vec<Diagnostic>) {
    let timeouts = [
        ("http.request_timeout_secs", config.http.request_timeout_secs),
        ("http.connect_timeout_secs", config.http.connect_timeout_secs),
    ];
    for (path, secs) in timeouts {
        if secs == 0 {
            diagnostics.push(Diagnostic::new(
                Severity::Error,
                path,
                "must be greater than zero",
            ));
        }
    }
    if config.dispatch.run_deadline_secs == Some(0) {
        diagnostics.push(Diagnostic::new(
            Severity::Error,
            "dispatch.run_deadline_secs",
            "must be greater than zero when set",
        ));
    }
    match config.dispatch.webhook_requests_per_minute {
        Some(0) => diagnostics.push(Diagnostic::new(
            Severity::Error,
            "dispatch.webhook_requests_per_minute",
            "must be greater than zero when set",
        )),
        Some(n) if n > WEBHOOK_RATE_CEILING_PER_MINUTE => diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "dispatch.webhook_requests_per_minute",
            format!(
                "{n} exceeds the platform limit of {WEBHOOK_RATE_CEILING_PER_MINUTE} per webhook; \
                 sends may be throttled"
            ),
        )),
        _ => {},
    }

    let Some(channel) = &config.channel else {
        diagnostics.push(Diagnostic::new(
            Severity::Warning,
            "channel",
            "no channel credentials configured",
        ));
        return;
    };

    if let Err(e) = channel.validate() {
        diagnostics.push(Diagnostic::new(Severity::Error, "channel", e.to_string()));
    }

    if let ChannelCredentials::CustomRobot(robot) = channel {
        if !robot.webhook_url.is_empty() && !robot.webhook_url.starts_with("https://") {
            diagnostics.push(Diagnostic::new(
                Severity::Warning,
                "channel.webhook_url",
                "webhook URL is not https",
            ));
        }
        if robot.signing_secret().is_none() {
            diagnostics.push(Diagnostic::new(
                Severity::Info,
                "channel.webhook_sign",
                "no signing secret; requests are sent unsigned",
            ));
        }
    }
}
