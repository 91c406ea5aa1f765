use serde::Serialize;

/// Crate-wide result type for dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Failure kinds reported on output records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Auth,
    Resolution,
    Upload,
    Sign,
    Send,
    Transport,
    Config,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Auth => "auth",
            Self::Resolution => "resolution",
            Self::Upload => "upload",
            Self::Sign => "sign",
            Self::Send => "send",
            Self::Transport => "transport",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

/// Typed dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Access token could not be obtained.
    #[error("access token request failed: {message}")]
    Auth { message: String },

    /// A mobile number could not be mapped to a user id.
    #[error("user lookup failed for {mobile}: {message}")]
    Resolution { mobile: String, message: String },

    /// Media upload was rejected or returned no media id.
    #[error("media upload failed: {message}")]
    Upload { message: String },

    /// Webhook signature could not be computed.
    #[error("webhook signing failed: {message}")]
    Sign { message: String },

    /// The platform rejected the request (non-2xx or non-zero `errcode`).
    #[error("send rejected: {message}")]
    Send {
        message: String,
        /// Raw response body, JSON when the platform returned JSON.
        body: serde_json::Value,
    },

    /// The request never produced a response. The source has its URL removed,
    /// since enterprise URLs carry the access token.
    #[error("{context}: {source}")]
    Transport {
        context: String,
        #[source]
        source: reqwest::Error,
    },

    /// The run deadline elapsed before the item finished.
    #[error("run deadline of {secs}s exceeded")]
    DeadlineExceeded { secs: u64 },

    /// Missing or inconsistent input for the selected channel and message.
    #[error("invalid dispatch configuration: {message}")]
    Config { message: String },

    /// Error annotated with the index of the input item that raised it.
    #[error("item {item_index}: {source}")]
    Item {
        item_index: usize,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
}

impl Error {
    #[must_use]
    pub fn auth(message: impl std::fmt::Display) -> Self {
        Self::Auth {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn upload(message: impl std::fmt::Display) -> Self {
        Self::Upload {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn config(message: impl std::fmt::Display) -> Self {
        Self::Config {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn transport(context: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source: source.without_url(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Resolution { .. } => ErrorKind::Resolution,
            Self::Upload { .. } => ErrorKind::Upload,
            Self::Sign { .. } => ErrorKind::Sign,
            Self::Send { .. } => ErrorKind::Send,
            Self::Transport { .. } | Self::DeadlineExceeded { .. } => ErrorKind::Transport,
            Self::Config { .. } | Self::SerdeJson(_) => ErrorKind::Config,
            Self::Item { source, .. } => source.kind(),
        }
    }

    /// Attach an item index. Errors that already carry one are returned as-is.
    #[must_use]
    pub fn at_item(self, item_index: usize) -> Self {
        match self {
            Self::Item { .. } => self,
            other => Self::Item {
                item_index,
                source: Box::new(other),
            },
        }
    }

    /// Item index carried by this error, if any.
    #[must_use]
    pub fn item_index(&self) -> Option<usize> {
        match self {
            Self::Item { item_index, .. } => Some(*item_index),
            _ => None,
        }
    }

    /// Platform response body carried by a rejection.
    #[must_use]
    pub fn response_body(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Send { body, .. } => Some(body),
            Self::Item { source, .. } => source.response_body(),
            _ => None,
        }
    }
}

/// Serializable error record attached to a failed output item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
}

impl From<&Error> for ErrorDetail {
    fn from(err: &Error) -> Self {
        let inner = match err {
            Error::Item { source, .. } => source.as_ref(),
            other => other,
        };
        Self {
            kind: err.kind(),
            message: inner.to_string(),
            response: err.response_body().cloned(),
        }
    }
}
