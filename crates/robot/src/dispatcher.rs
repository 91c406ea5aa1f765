use {async_trait::async_trait, serde::Serialize, serde_json::Value};

use crate::{
    error::{ErrorDetail, Result},
    media::Attachment,
    message::MessageInput,
};

/// Which robot channel a run dispatches through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    CustomRobot,
    EnterpriseRobot,
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::CustomRobot => "custom_robot",
            Self::EnterpriseRobot => "enterprise_robot",
        })
    }
}

/// One input item, with its parameters already resolved by the host.
#[derive(Debug, Clone)]
pub struct DispatchItem {
    /// The host's original item payload, echoed back on failure.
    pub json: Value,
    pub message: MessageInput,
    /// Recipients of an enterprise send. Unused by the custom robot.
    pub mobiles: Vec<String>,
    /// Content for a `File` message that still needs uploading.
    pub attachment: Option<Attachment>,
}

impl DispatchItem {
    #[must_use]
    pub fn new(message: impl Into<MessageInput>) -> Self {
        Self {
            json: Value::Object(Default::default()),
            message: message.into(),
            mobiles: Vec::new(),
            attachment: None,
        }
    }

    #[must_use]
    pub fn with_json(mut self, json: Value) -> Self {
        self.json = json;
        self
    }

    #[must_use]
    pub fn with_mobiles<I, S>(mut self, mobiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.mobiles = mobiles.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// One entry of the ordered output batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DispatchOutput {
    /// Platform response body, or a `{"failUser": [...]}` resolution report.
    Response { json: Value },
    /// A failed item recorded under continue-on-fail.
    Failed {
        json: Value,
        error: ErrorDetail,
        #[serde(rename = "itemIndex")]
        item_index: usize,
    },
}

impl DispatchOutput {
    #[must_use]
    pub fn response(json: Value) -> Self {
        Self::Response { json }
    }

    #[must_use]
    pub fn fail_users(mobiles: &[String]) -> Self {
        Self::Response {
            json: serde_json::json!({ "failUser": mobiles }),
        }
    }

    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// `true` for a `{"failUser": [...]}` resolution report.
    #[must_use]
    pub fn is_fail_users(&self) -> bool {
        matches!(self, Self::Response { json } if json.get("failUser").is_some())
    }
}

/// Sends a single item end to end over one channel.
///
/// Entries are appended to `out` as they are produced, so a resolution report
/// survives a send failure that follows it.
#[async_trait]
pub trait ChannelDispatcher: Send + Sync {
    fn kind(&self) -> ChannelKind;

    async fn dispatch(
        &self,
        item_index: usize,
        item: &DispatchItem,
        out: &mut Vec<DispatchOutput>,
    ) -> Result<()>;
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::error::{Error, ErrorKind},
        serde_json::json,
    };

    #[test]
    fn outputs_serialize_flat() {
        let ok = DispatchOutput::response(json!({"errcode": 0}));
        assert_eq!(serde_json::to_value(&ok).unwrap(), json!({"json": {"errcode": 0}}));

        let err = Error::config("missing title").at_item(2);
        let failed = DispatchOutput::Failed {
            json: json!({"id": 7}),
            error: ErrorDetail::from(&err),
            item_index: 2,
        };
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({
                "json": {"id": 7},
                "error": {
                    "kind": "config",
                    "message": "invalid dispatch configuration: missing title"
                },
                "itemIndex": 2
            })
        );
        assert!(failed.is_failure());
        assert_eq!(ErrorDetail::from(&err).kind, ErrorKind::Config);
    }

    #[test]
    fn fail_users_entry() {
        let entry = DispatchOutput::fail_users(&["139".to_string()]);
        assert!(entry.is_fail_users());
        assert!(!entry.is_failure());
        assert_eq!(
            serde_json::to_value(&entry).unwrap(),
            json!({"json": {"failUser": ["139"]}})
        );
    }
}
