//! Wire payloads for the two robot channels.
//!
//! The custom robot takes a `msgtype`-tagged body. The enterprise robot takes
//! a `msgKey` naming a sample template plus a flat, string-encoded `msgParam`.

use {
    serde::Serialize,
    serde_json::{Map, Value, json},
    tracing::warn,
};

use crate::{
    error::{Error, Result},
    message::{Action, Actions, FeedLink, Mentions, Message, MessageInput, Orientation},
};

// ── Custom robot ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "msgtype", rename_all = "camelCase")]
enum CustomBody<'a> {
    Text {
        text: TextBody<'a>,
        at: At<'a>,
    },
    Markdown {
        markdown: MarkdownBody<'a>,
        at: At<'a>,
    },
    Link {
        link: LinkBody<'a>,
    },
    ActionCard {
        #[serde(rename = "actionCard")]
        action_card: ActionCardBody<'a>,
    },
    FeedCard {
        #[serde(rename = "feedCard")]
        feed_card: FeedCardBody<'a>,
    },
}

#[derive(Debug, Serialize)]
struct TextBody<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct MarkdownBody<'a> {
    title: &'a str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LinkBody<'a> {
    title: &'a str,
    text: &'a str,
    pic_url: &'a str,
    message_url: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionCardBody<'a> {
    title: &'a str,
    text: &'a str,
    btn_orientation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    single_title: Option<&'a str>,
    #[serde(rename = "singleURL", skip_serializing_if = "Option::is_none")]
    single_url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    btns: Option<Vec<Button<'a>>>,
}

#[derive(Debug, Serialize)]
struct Button<'a> {
    title: &'a str,
    #[serde(rename = "actionURL")]
    action_url: &'a str,
}

#[derive(Debug, Serialize)]
struct FeedCardBody<'a> {
    links: Vec<FeedEntry<'a>>,
}

#[derive(Debug, Serialize)]
struct FeedEntry<'a> {
    title: &'a str,
    #[serde(rename = "messageURL")]
    message_url: &'a str,
    #[serde(rename = "picURL")]
    pic_url: &'a str,
}

/// `at` block of text and markdown messages.
///
/// `atMobiles`/`atUserIds` are omitted when empty and always when `isAtAll`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct At<'a> {
    is_at_all: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    at_mobiles: Vec<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    at_user_ids: Vec<&'a str>,
}

impl<'a> From<&'a Mentions> for At<'a> {
    fn from(mentions: &'a Mentions) -> Self {
        if mentions.all {
            return Self {
                is_at_all: true,
                at_mobiles: Vec::new(),
                at_user_ids: Vec::new(),
            };
        }
        Self {
            is_at_all: false,
            at_mobiles: mentions.mobiles.iter().map(String::as_str).collect(),
            at_user_ids: mentions.user_ids.iter().map(String::as_str).collect(),
        }
    }
}

/// Build the JSON body POSTed to a custom robot webhook.
///
/// Raw JSON input is returned unchanged.
pub fn custom_robot_body(input: &MessageInput) -> Result<Value> {
    let message = match input {
        MessageInput::RawJson(raw) => return Ok(Value::Object(raw.clone())),
        MessageInput::Structured(message) => message,
    };

    let body = match message {
        Message::Text { content, mentions } => CustomBody::Text {
            text: TextBody { content },
            at: mentions.into(),
        },
        Message::Markdown {
            title,
            text,
            mentions,
        } => CustomBody::Markdown {
            markdown: MarkdownBody { title, text },
            at: mentions.into(),
        },
        Message::Link {
            title,
            text,
            picture_url,
            message_url,
        } => CustomBody::Link {
            link: LinkBody {
                title,
                text,
                pic_url: picture_url.as_deref().unwrap_or_default(),
                message_url,
            },
        },
        Message::ActionCard {
            title,
            text,
            orientation,
            actions,
        } => CustomBody::ActionCard {
            action_card: action_card_body(title, text, *orientation, actions)?,
        },
        Message::FeedCard { links } => CustomBody::FeedCard {
            feed_card: FeedCardBody {
                links: links.iter().map(feed_entry).collect(),
            },
        },
        Message::File { .. } => {
            return Err(Error::config(
                "file messages require the enterprise robot channel",
            ));
        },
    };

    Ok(serde_json::to_value(body)?)
}

fn action_card_body<'a>(
    title: &'a str,
    text: &'a str,
    orientation: Orientation,
    actions: &'a Actions,
) -> Result<ActionCardBody<'a>> {
    let mut body = ActionCardBody {
        title,
        text,
        btn_orientation: orientation.as_wire(),
        single_title: None,
        single_url: None,
        btns: None,
    };
    match actions {
        Actions::Single(action) => {
            body.single_title = Some(&action.title);
            body.single_url = Some(&action.url);
        },
        Actions::Buttons(buttons) if buttons.is_empty() => {
            return Err(Error::config("action card needs at least one button"));
        },
        Actions::Buttons(buttons) => {
            body.btns = Some(
                buttons
                    .iter()
                    .map(|b| Button {
                        title: &b.title,
                        action_url: &b.url,
                    })
                    .collect(),
            );
        },
    }
    Ok(body)
}

fn feed_entry(link: &FeedLink) -> FeedEntry<'_> {
    FeedEntry {
        title: &link.title,
        message_url: &link.message_url,
        pic_url: &link.picture_url,
    }
}

// ── Enterprise robot ────────────────────────────────────────────────────────

/// Largest button count with a vertical sample template (`sampleActionCard5`).
const MAX_CARD_BUTTONS: usize = 5;

/// A sample template key and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct EnterpriseTemplate {
    pub msg_key: String,
    pub msg_param: Map<String, Value>,
}

/// Map a message onto the enterprise robot's sample templates.
pub fn enterprise_template(message: &Message) -> Result<EnterpriseTemplate> {
    let mut param = Map::new();
    let msg_key = match message {
        Message::Text { content, .. } => {
            param.insert("content".into(), json!(content));
            "sampleText".to_string()
        },
        Message::Markdown { title, text, .. } => {
            param.insert("title".into(), json!(title));
            param.insert("text".into(), json!(text));
            "sampleMarkdown".to_string()
        },
        Message::Link {
            title,
            text,
            picture_url,
            message_url,
        } => {
            param.insert("title".into(), json!(title));
            param.insert("text".into(), json!(text));
            param.insert(
                "picUrl".into(),
                json!(picture_url.as_deref().unwrap_or_default()),
            );
            param.insert("messageUrl".into(), json!(message_url));
            "sampleLink".to_string()
        },
        Message::ActionCard {
            title,
            text,
            orientation,
            actions,
        } => {
            param.insert("title".into(), json!(title));
            param.insert("text".into(), json!(text));
            action_card_template(*orientation, actions, &mut param)?
        },
        Message::FeedCard { .. } => {
            return Err(Error::config(
                "feed cards are not supported by the enterprise robot",
            ));
        },
        Message::File {
            file_name,
            file_type,
            media_id,
        } => {
            let media_id = media_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .ok_or_else(|| Error::config("file message has no media id; upload it first"))?;
            param.insert("mediaId".into(), json!(media_id));
            param.insert("fileName".into(), json!(file_name));
            param.insert("fileType".into(), json!(file_type));
            "sampleFile".to_string()
        },
    };
    Ok(EnterpriseTemplate {
        msg_key,
        msg_param: param,
    })
}

fn action_card_template(
    orientation: Orientation,
    actions: &Actions,
    param: &mut Map<String, Value>,
) -> Result<String> {
    let buttons: &[Action] = match actions {
        Actions::Single(action) => std::slice::from_ref(action),
        Actions::Buttons(buttons) => buttons,
    };

    match buttons {
        [] => Err(Error::config("action card needs at least one button")),
        [single] => {
            param.insert("singleTitle".into(), json!(single.title));
            param.insert("singleURL".into(), json!(single.url));
            Ok("sampleActionCard".into())
        },
        [first, second] if orientation == Orientation::Horizontal => {
            for (n, button) in [(1, first), (2, second)] {
                param.insert(format!("buttonTitle{n}"), json!(button.title));
                param.insert(format!("buttonUrl{n}"), json!(button.url));
            }
            Ok("sampleActionCard6".into())
        },
        many if many.len() > MAX_CARD_BUTTONS => Err(Error::config(format!(
            "action card has {} buttons; the enterprise robot supports at most {MAX_CARD_BUTTONS}",
            many.len()
        ))),
        many => {
            if orientation == Orientation::Horizontal {
                warn!(
                    buttons = many.len(),
                    "horizontal layout only exists for two buttons, sending vertical card"
                );
            }
            for (i, button) in many.iter().enumerate() {
                param.insert(format!("actionTitle{}", i + 1), json!(button.title));
                param.insert(format!("actionURL{}", i + 1), json!(button.url));
            }
            Ok(format!("sampleActionCard{}", many.len()))
        },
    }
}

/// Build the batch one-to-one send request body.
pub fn batch_send_body(
    robot_code: &str,
    user_ids: &[String],
    input: &MessageInput,
) -> Result<Value> {
    let mut body = Map::new();
    body.insert("robotCode".into(), json!(robot_code));
    body.insert("userIds".into(), json!(user_ids));

    match input {
        MessageInput::Structured(message) => {
            let template = enterprise_template(message)?;
            body.insert("msgKey".into(), Value::String(template.msg_key));
            body.insert(
                "msgParam".into(),
                Value::String(Value::Object(template.msg_param).to_string()),
            );
        },
        MessageInput::RawJson(raw) => {
            for (key, value) in raw {
                body.insert(key.clone(), value.clone());
            }
            if !body.get("msgKey").is_some_and(Value::is_string) {
                return Err(Error::config("raw enterprise payload must contain a string msgKey"));
            }
            if let Some(param) = body.get_mut("msgParam")
                && !param.is_string()
            {
                *param = Value::String(param.to_string());
            }
        },
    }

    Ok(Value::Object(body))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    fn text_with(mentions: Mentions) -> MessageInput {
        Message::Text {
            content: "hi".into(),
            mentions,
        }
        .into()
    }

    fn card(orientation: Orientation, n: usize) -> Message {
        Message::ActionCard {
            title: "Deploy".into(),
            text: "## done".into(),
            orientation,
            actions: Actions::Buttons(
                (1..=n)
                    .map(|i| Action::new(format!("b{i}"), format!("https://x/{i}")))
                    .collect(),
            ),
        }
    }

    #[test]
    fn text_body_matches_wire_example() {
        let body = custom_robot_body(&text_with(Mentions::mobiles(["13800000000"]))).unwrap();
        assert_eq!(
            body,
            json!({
                "msgtype": "text",
                "at": {"isAtAll": false, "atMobiles": ["13800000000"]},
                "text": {"content": "hi"}
            })
        );
    }

    #[rstest]
    #[case::everyone_only(Mentions::everyone())]
    #[case::everyone_with_users(Mentions {
        all: true,
        mobiles: ["13800000000".to_string()].into(),
        user_ids: ["u1".to_string()].into(),
    })]
    fn at_all_never_lists_users(#[case] mentions: Mentions) {
        for input in [
            text_with(mentions.clone()),
            Message::Markdown {
                title: "t".into(),
                text: "x".into(),
                mentions: mentions.clone(),
            }
            .into(),
        ] {
            let body = custom_robot_body(&input).unwrap();
            assert_eq!(body["at"], json!({"isAtAll": true}));
        }
    }

    #[test]
    fn empty_mentions_omit_user_keys() {
        let body = custom_robot_body(&text_with(Mentions::default())).unwrap();
        assert_eq!(body["at"], json!({"isAtAll": false}));
    }

    #[test]
    fn markdown_and_user_id_mentions() {
        let input: MessageInput = Message::Markdown {
            title: "Build".into(),
            text: "**green**".into(),
            mentions: Mentions::user_ids(["manager01"]),
        }
        .into();
        let body = custom_robot_body(&input).unwrap();
        assert_eq!(body["msgtype"], "markdown");
        assert_eq!(body["markdown"], json!({"title": "Build", "text": "**green**"}));
        assert_eq!(body["at"], json!({"isAtAll": false, "atUserIds": ["manager01"]}));
    }

    #[test]
    fn link_always_carries_pic_url() {
        let input: MessageInput = Message::Link {
            title: "t".into(),
            text: "x".into(),
            picture_url: None,
            message_url: "https://x".into(),
        }
        .into();
        let body = custom_robot_body(&input).unwrap();
        assert_eq!(
            body,
            json!({
                "msgtype": "link",
                "link": {"title": "t", "text": "x", "picUrl": "", "messageUrl": "https://x"}
            })
        );
    }

    #[test]
    fn action_card_single_and_buttons() {
        let single: MessageInput = Message::ActionCard {
            title: "t".into(),
            text: "x".into(),
            orientation: Orientation::Vertical,
            actions: Actions::Single(Action::new("Read", "https://x")),
        }
        .into();
        let body = custom_robot_body(&single).unwrap();
        assert_eq!(
            body["actionCard"],
            json!({
                "title": "t",
                "text": "x",
                "btnOrientation": "0",
                "singleTitle": "Read",
                "singleURL": "https://x"
            })
        );

        let body = custom_robot_body(&card(Orientation::Horizontal, 3).into()).unwrap();
        assert_eq!(body["actionCard"]["btnOrientation"], "1");
        let titles: Vec<_> = body["actionCard"]["btns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|b| b["title"].as_str().unwrap())
            .collect();
        assert_eq!(titles, ["b1", "b2", "b3"]);
        assert_eq!(body["actionCard"]["btns"][0]["actionURL"], "https://x/1");
        assert!(body["actionCard"].get("singleTitle").is_none());
    }

    #[test]
    fn feed_card_links() {
        let input: MessageInput = Message::FeedCard {
            links: vec![FeedLink {
                title: "a".into(),
                message_url: "https://a".into(),
                picture_url: "https://a.png".into(),
            }],
        }
        .into();
        let body = custom_robot_body(&input).unwrap();
        assert_eq!(
            body,
            json!({"msgtype": "feedCard", "feedCard": {"links": [
                {"title": "a", "messageURL": "https://a", "picURL": "https://a.png"}
            ]}})
        );
    }

    #[test]
    fn raw_json_passes_through() {
        let raw = json!({"msgtype": "future", "future": {"x": [1, 2]}, "at": {"isAtAll": true}});
        let input = MessageInput::RawJson(raw.as_object().unwrap().clone());
        assert_eq!(custom_robot_body(&input).unwrap(), raw);
    }

    #[test]
    fn file_rejected_on_custom_robot() {
        let err = custom_robot_body(&Message::file("a.pdf").into()).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[rstest]
    #[case(Orientation::Vertical, 1, "sampleActionCard")]
    #[case(Orientation::Vertical, 2, "sampleActionCard2")]
    #[case(Orientation::Vertical, 5, "sampleActionCard5")]
    #[case(Orientation::Horizontal, 2, "sampleActionCard6")]
    #[case(Orientation::Horizontal, 4, "sampleActionCard4")]
    fn action_card_template_keys(
        #[case] orientation: Orientation,
        #[case] buttons: usize,
        #[case] expected: &str,
    ) {
        let template = enterprise_template(&card(orientation, buttons)).unwrap();
        assert_eq!(template.msg_key, expected);
    }

    #[test]
    fn vertical_card_numbers_buttons_in_order() {
        let template = enterprise_template(&card(Orientation::Vertical, 3)).unwrap();
        assert_eq!(template.msg_param["actionTitle1"], "b1");
        assert_eq!(template.msg_param["actionURL3"], "https://x/3");
        assert_eq!(template.msg_param["title"], "Deploy");
    }

    #[test]
    fn horizontal_pair_uses_button_keys() {
        let template = enterprise_template(&card(Orientation::Horizontal, 2)).unwrap();
        assert_eq!(template.msg_param["buttonTitle2"], "b2");
        assert_eq!(template.msg_param["buttonUrl1"], "https://x/1");
    }

    #[test]
    fn too_many_buttons_is_config_error() {
        assert!(enterprise_template(&card(Orientation::Vertical, 6)).is_err());
        assert!(enterprise_template(&card(Orientation::Vertical, 0)).is_err());
    }

    #[test]
    fn file_template_requires_media_id() {
        let mut msg = Message::file("q3.xlsx");
        assert!(enterprise_template(&msg).is_err());
        msg.attach_media("@media");
        let template = enterprise_template(&msg).unwrap();
        assert_eq!(template.msg_key, "sampleFile");
        assert_eq!(
            Value::Object(template.msg_param),
            json!({"mediaId": "@media", "fileName": "q3.xlsx", "fileType": "xlsx"})
        );
    }

    #[test]
    fn batch_send_stringifies_msg_param() {
        let users = vec!["u1".to_string(), "u2".to_string()];
        let body = batch_send_body("dingrobot", &users, &Message::text("hello").into()).unwrap();
        assert_eq!(body["robotCode"], "dingrobot");
        assert_eq!(body["userIds"], json!(["u1", "u2"]));
        assert_eq!(body["msgKey"], "sampleText");
        let param: Value = serde_json::from_str(body["msgParam"].as_str().unwrap()).unwrap();
        assert_eq!(param, json!({"content": "hello"}));
    }

    #[test]
    fn batch_send_merges_raw_json() {
        let raw = json!({"msgKey": "sampleImageMsg", "msgParam": {"photoURL": "https://p"}});
        let input = MessageInput::RawJson(raw.as_object().unwrap().clone());
        let body = batch_send_body("r", &["u1".to_string()], &input).unwrap();
        assert_eq!(body["msgKey"], "sampleImageMsg");
        assert_eq!(body["msgParam"], r#"{"photoURL":"https://p"}"#);
        assert_eq!(body["userIds"], json!(["u1"]));

        let missing = MessageInput::RawJson(json!({"msgParam": "{}"}).as_object().unwrap().clone());
        assert!(batch_send_body("r", &[], &missing).is_err());
    }
}
