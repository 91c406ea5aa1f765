//! File media upload for enterprise `sampleFile` messages.

use std::path::Path;

use {
    bytes::Bytes,
    reqwest::multipart::{Form, Part},
    serde_json::Value,
    tracing::debug,
};

use crate::{
    api::read_response,
    auth::AccessToken,
    error::{Error, Result},
};

/// Binary content attached to a dispatch item.
#[derive(Clone)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Bytes,
}

impl Attachment {
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes: bytes.into(),
        }
    }

    /// Read an attachment from disk, named after the file.
    pub async fn read(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| Error::upload(format!("reading {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::config(format!("{} has no file name", path.display())))?;
        Ok(Self::new(file_name, bytes))
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Uploads attachments and returns the platform media id.
pub struct MediaUploader {
    http: reqwest::Client,
    upload_url: String,
}

impl MediaUploader {
    #[must_use]
    pub fn new(http: reqwest::Client, oapi_base_url: &str) -> Self {
        Self {
            http,
            upload_url: format!("{}/media/upload", oapi_base_url.trim_end_matches('/')),
        }
    }

    pub async fn upload(&self, attachment: &Attachment, token: &AccessToken) -> Result<String> {
        let part = Part::bytes(attachment.bytes.to_vec()).file_name(attachment.file_name.clone());
        let form = Form::new().text("type", "file").part("media", part);

        let resp = self
            .http
            .post(&self.upload_url)
            .query(&[("access_token", token.expose())])
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::transport("media upload", e))?;
        let body = read_response(resp, "media upload")
            .await
            .map_err(|e| match e {
                Error::Send { message, .. } => Error::upload(message),
                other => other,
            })?;

        let media_id = body
            .get("media_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::upload("response carried no media_id"))?;
        debug!(file_name = %attachment.file_name, media_id, "media uploaded");
        Ok(media_id.to_string())
    }
}
