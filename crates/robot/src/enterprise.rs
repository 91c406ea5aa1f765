//! Enterprise robot: one-to-one batch sends to resolved users.

use std::borrow::Cow;

use {
    async_trait::async_trait,
    tracing::{debug, info},
};

use crate::{
    api::read_response,
    auth::AccessToken,
    dispatcher::{ChannelDispatcher, ChannelKind, DispatchItem, DispatchOutput},
    error::{Error, Result},
    media::MediaUploader,
    message::{Message, MessageInput},
    payload::{batch_send_body, enterprise_template},
    users::UserResolver,
};

/// Header carrying the access token on the new-style OpenAPI.
const TOKEN_HEADER: &str = "x-acs-dingtalk-access-token";

/// Sends items through the batch one-to-one API using a token acquired once
/// for the run.
pub struct EnterpriseRobotDispatcher<'run> {
    http: reqwest::Client,
    send_url: String,
    robot_code: String,
    token: &'run AccessToken,
    resolver: UserResolver,
    uploader: MediaUploader,
}

impl<'run> EnterpriseRobotDispatcher<'run> {
    #[must_use]
    pub fn new(
        http: reqwest::Client,
        api_base_url: &str,
        oapi_base_url: &str,
        robot_code: impl Into<String>,
        token: &'run AccessToken,
    ) -> Self {
        Self {
            send_url: format!(
                "{}/v1.0/robot/oToMessages/batchSend",
                api_base_url.trim_end_matches('/')
            ),
            robot_code: robot_code.into(),
            token,
            resolver: UserResolver::new(http.clone(), oapi_base_url),
            uploader: MediaUploader::new(http.clone(), oapi_base_url),
            http,
        }
    }

    /// Reject items that cannot be sent before spending any lookups on them.
    fn precheck(item: &DispatchItem) -> Result<()> {
        if item.mobiles.iter().all(|m| m.trim().is_empty()) {
            return Err(Error::config("enterprise robot items need at least one mobile"));
        }
        match item.message.as_structured() {
            Some(message) if message.needs_upload() => {
                if item.attachment.is_none() {
                    return Err(Error::config(
                        "file message has neither a media id nor an attachment",
                    ));
                }
            },
            Some(message) => {
                enterprise_template(message)?;
            },
            // Recipients do not affect whether a raw payload is accepted.
            None => {
                batch_send_body("", &[], &item.message)?;
            },
        }
        Ok(())
    }

    /// Upload the attachment of a file message that has no media id yet.
    async fn with_media<'a>(&self, item: &'a DispatchItem) -> Result<Cow<'a, MessageInput>> {
        let (Some(message), Some(attachment)) = (item.message.as_structured(), &item.attachment)
        else {
            return Ok(Cow::Borrowed(&item.message));
        };
        if !message.needs_upload() {
            return Ok(Cow::Borrowed(&item.message));
        }

        let media_id = self.uploader.upload(attachment, self.token).await?;
        let mut message: Message = message.clone();
        message.attach_media(media_id);
        Ok(Cow::Owned(MessageInput::Structured(message)))
    }
}

#[async_trait]
impl ChannelDispatcher for EnterpriseRobotDispatcher<'_> {
    fn kind(&self) -> ChannelKind {
        ChannelKind::EnterpriseRobot
    }

    async fn dispatch(
        &self,
        item_index: usize,
        item: &DispatchItem,
        out: &mut Vec<DispatchOutput>,
    ) -> Result<()> {
        Self::precheck(item)?;

        let resolution = self.resolver.resolve(&item.mobiles, self.token).await;
        if !resolution.failed.is_empty() {
            out.push(DispatchOutput::fail_users(&resolution.failed));
        }
        if resolution.resolved.is_empty() {
            info!(
                item_index,
                failed = resolution.failed.len(),
                "no recipients resolved, skipping send"
            );
            return Ok(());
        }

        let message = self.with_media(item).await?;
        let user_ids = resolution.user_ids();
        let body = batch_send_body(&self.robot_code, &user_ids, &message)?;
        debug!(
            item_index,
            msg_key = body.get("msgKey").and_then(|v| v.as_str()).unwrap_or_default(),
            recipients = user_ids.len(),
            "posting enterprise batch send"
        );

        let resp = self
            .http
            .post(&self.send_url)
            .header(TOKEN_HEADER, self.token.expose())
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport("batch send", e))?;
        let json = read_response(resp, "batch send").await?;
        out.push(DispatchOutput::response(json));
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{media::Attachment, message::FeedLink},
        mockito::Matcher,
        serde_json::json,
        std::time::Duration,
    };

    fn token() -> AccessToken {
        AccessToken::new("tok", Duration::from_secs(3600))
    }

    async fn mock_lookup(
        server: &mut mockito::Server,
        mobile: &str,
        user_id: Option<&str>,
    ) -> mockito::Mock {
        let body = match user_id {
            Some(id) => json!({"errcode": 0, "result": {"userid": id}}),
            None => json!({"errcode": 60121, "errmsg": "not found"}),
        };
        server
            .mock("POST", "/topapi/v2/user/getbymobile")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({ "mobile": mobile })))
            .with_status(200)
            .with_body(body.to_string())
            .create_async()
            .await
    }

    fn dispatcher<'a>(
        server: &mockito::Server,
        token: &'a AccessToken,
    ) -> EnterpriseRobotDispatcher<'a> {
        EnterpriseRobotDispatcher::new(
            reqwest::Client::new(),
            &server.url(),
            &server.url(),
            "dingrobot",
            token,
        )
    }

    #[tokio::test]
    async fn partial_resolution_reports_fail_users_and_sends() {
        let mut server = mockito::Server::new_async().await;
        let _found = mock_lookup(&mut server, "138", Some("u1")).await;
        let _missing = mock_lookup(&mut server, "139", None).await;
        let send = server
            .mock("POST", "/v1.0/robot/oToMessages/batchSend")
            .match_header(TOKEN_HEADER, "tok")
            .match_body(Matcher::PartialJson(json!({
                "robotCode": "dingrobot",
                "userIds": ["u1"],
                "msgKey": "sampleText",
                "msgParam": r#"{"content":"hi"}"#
            })))
            .with_status(200)
            .with_body(json!({"processQueryKey": "q1"}).to_string())
            .create_async()
            .await;

        let token = token();
        let item = DispatchItem::new(Message::text("hi")).with_mobiles(["138", "139"]);
        let mut out = Vec::new();
        dispatcher(&server, &token).dispatch(0, &item, &mut out).await.unwrap();

        assert_eq!(
            out,
            [
                DispatchOutput::fail_users(&["139".to_string()]),
                DispatchOutput::response(json!({"processQueryKey": "q1"})),
            ]
        );
        send.assert_async().await;
    }

    #[tokio::test]
    async fn nothing_resolved_skips_send() {
        let mut server = mockito::Server::new_async().await;
        let _missing = mock_lookup(&mut server, "139", None).await;
        let send = server
            .mock("POST", "/v1.0/robot/oToMessages/batchSend")
            .expect(0)
            .create_async()
            .await;

        let token = token();
        let item = DispatchItem::new(Message::text("hi")).with_mobiles(["139"]);
        let mut out = Vec::new();
        dispatcher(&server, &token).dispatch(0, &item, &mut out).await.unwrap();

        assert_eq!(out, [DispatchOutput::fail_users(&["139".to_string()])]);
        send.assert_async().await;
    }

    #[tokio::test]
    async fn file_message_is_uploaded_before_send() {
        let mut server = mockito::Server::new_async().await;
        let _found = mock_lookup(&mut server, "138", Some("u1")).await;
        let upload = server
            .mock("POST", "/media/upload")
            .match_query(Matcher::UrlEncoded("access_token".into(), "tok".into()))
            .with_status(200)
            .with_body(json!({"errcode": 0, "media_id": "@media1"}).to_string())
            .create_async()
            .await;
        let send = server
            .mock("POST", "/v1.0/robot/oToMessages/batchSend")
            .match_body(Matcher::PartialJson(json!({"msgKey": "sampleFile"})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let token = token();
        let item = DispatchItem::new(Message::file("q3.xlsx"))
            .with_mobiles(["138"])
            .with_attachment(Attachment::new("q3.xlsx", "cells"));
        let mut out = Vec::new();
        dispatcher(&server, &token).dispatch(0, &item, &mut out).await.unwrap();
        upload.assert_async().await;
        send.assert_async().await;
    }

    #[tokio::test]
    async fn existing_media_id_skips_upload() {
        let mut server = mockito::Server::new_async().await;
        let _found = mock_lookup(&mut server, "138", Some("u1")).await;
        let upload = server.mock("POST", "/media/upload").expect(0).create_async().await;
        let send = server
            .mock("POST", "/v1.0/robot/oToMessages/batchSend")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let mut message = Message::file("a.pdf");
        message.attach_media("@existing");
        let token = token();
        let item = DispatchItem::new(message).with_mobiles(["138"]);
        let mut out = Vec::new();
        dispatcher(&server, &token).dispatch(0, &item, &mut out).await.unwrap();
        upload.assert_async().await;
        send.assert_async().await;
    }

    #[tokio::test]
    async fn unsupported_message_fails_before_lookups() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("POST", "/topapi/v2/user/getbymobile")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let token = token();
        let item = DispatchItem::new(Message::FeedCard {
            links: vec![FeedLink {
                title: "a".into(),
                message_url: "https://a".into(),
                picture_url: String::new(),
            }],
        })
        .with_mobiles(["138"]);
        let mut out = Vec::new();
        let err = dispatcher(&server, &token)
            .dispatch(0, &item, &mut out)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let no_mobiles = DispatchItem::new(Message::text("hi"));
        assert!(dispatcher(&server, &token).dispatch(0, &no_mobiles, &mut out).await.is_err());
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn raw_payload_without_msg_key_fails_before_lookups() {
        let mut server = mockito::Server::new_async().await;
        let lookup = server
            .mock("POST", "/topapi/v2/user/getbymobile")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let token = token();
        let raw = json!({"msgParam": {"content": "hi"}});
        let item = DispatchItem::new(MessageInput::RawJson(raw.as_object().unwrap().clone()))
            .with_mobiles(["138", "139"]);
        let mut out = Vec::new();
        let err = dispatcher(&server, &token)
            .dispatch(0, &item, &mut out)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("msgKey"));
        assert!(out.is_empty());
        lookup.assert_async().await;
    }

    #[tokio::test]
    async fn send_rejection_keeps_fail_user_entry() {
        let mut server = mockito::Server::new_async().await;
        let _found = mock_lookup(&mut server, "138", Some("u1")).await;
        let _missing = mock_lookup(&mut server, "139", None).await;
        let _send = server
            .mock("POST", "/v1.0/robot/oToMessages/batchSend")
            .with_status(400)
            .with_body(json!({"code": "invalidParameter"}).to_string())
            .create_async()
            .await;

        let token = token();
        let item = DispatchItem::new(Message::text("hi")).with_mobiles(["138", "139"]);
        let mut out = Vec::new();
        let err = dispatcher(&server, &token)
            .dispatch(0, &item, &mut out)
            .await
            .unwrap_err();
        assert_eq!(err.response_body(), Some(&json!({"code": "invalidParameter"})));
        assert_eq!(out.len(), 1);
        assert!(out[0].is_fail_users());
    }
}
