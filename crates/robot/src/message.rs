//! Outbound message model shared by both robot channels.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Who a text or markdown message @-mentions.
///
/// When `all` is set the per-user sets are ignored by every builder.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Mentions {
    pub all: bool,
    pub mobiles: BTreeSet<String>,
    pub user_ids: BTreeSet<String>,
}

impl Mentions {
    #[must_use]
    pub fn everyone() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn mobiles<I, S>(mobiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mobiles: clean_set(mobiles),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn user_ids<I, S>(user_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            user_ids: clean_set(user_ids),
            ..Self::default()
        }
    }
}

fn clean_set<I, S>(values: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    values
        .into_iter()
        .map(Into::into)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

/// Button layout of an action card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

impl Orientation {
    /// Wire value of `btnOrientation`.
    #[must_use]
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Vertical => "0",
            Self::Horizontal => "1",
        }
    }
}

/// A button on an action card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub title: String,
    pub url: String,
}

impl Action {
    #[must_use]
    pub fn new(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
        }
    }
}

/// Either one whole-card action or an ordered list of buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actions {
    Single(Action),
    Buttons(Vec<Action>),
}

/// One entry of a feed card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedLink {
    pub title: String,
    pub message_url: String,
    pub picture_url: String,
}

/// The six outbound message shapes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Message {
    Text {
        content: String,
        #[serde(default)]
        mentions: Mentions,
    },
    Markdown {
        title: String,
        text: String,
        #[serde(default)]
        mentions: Mentions,
    },
    Link {
        title: String,
        text: String,
        #[serde(default)]
        picture_url: Option<String>,
        message_url: String,
    },
    ActionCard {
        title: String,
        text: String,
        #[serde(default)]
        orientation: Orientation,
        actions: Actions,
    },
    FeedCard {
        links: Vec<FeedLink>,
    },
    /// Enterprise channel only. `media_id` is filled in by the uploader.
    File {
        file_name: String,
        file_type: String,
        #[serde(default)]
        media_id: Option<String>,
    },
}

impl Message {
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            mentions: Mentions::default(),
        }
    }

    #[must_use]
    pub fn markdown(title: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Markdown {
            title: title.into(),
            text: text.into(),
            mentions: Mentions::default(),
        }
    }

    /// A file message whose media still has to be uploaded.
    #[must_use]
    pub fn file(file_name: impl Into<String>) -> Self {
        let file_name = file_name.into();
        let file_type = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        Self::File {
            file_name,
            file_type,
            media_id: None,
        }
    }

    /// Platform `msgtype` of the custom robot channel.
    #[must_use]
    pub fn msgtype(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Markdown { .. } => "markdown",
            Self::Link { .. } => "link",
            Self::ActionCard { .. } => "actionCard",
            Self::FeedCard { .. } => "feedCard",
            Self::File { .. } => "file",
        }
    }

    /// `true` for a file message still waiting for its media id.
    #[must_use]
    pub fn needs_upload(&self) -> bool {
        matches!(self, Self::File { media_id, .. } if media_id.as_deref().is_none_or(str::is_empty))
    }

    /// Record the media id returned by the uploader. No-op for non-file messages.
    pub fn attach_media(&mut self, id: impl Into<String>) {
        if let Self::File { media_id, .. } = self {
            *media_id = Some(id.into());
        }
    }
}

/// A message as supplied by the host: structured, or a raw JSON object
/// passed through to the platform for shapes the model does not cover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageInput {
    Structured(Message),
    RawJson(serde_json::Map<String, serde_json::Value>),
}

impl From<Message> for MessageInput {
    fn from(message: Message) -> Self {
        Self::Structured(message)
    }
}

impl MessageInput {
    #[must_use]
    pub fn as_structured(&self) -> Option<&Message> {
        match self {
            Self::Structured(message) => Some(message),
            Self::RawJson(_) => None,
        }
    }
}
