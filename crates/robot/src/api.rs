//! HTTP plumbing shared by every platform call.

use std::time::Duration;

use {
    dingbot_config::HttpConfig,
    reqwest::{Client, Response},
    serde_json::Value,
};

use crate::error::{Error, Result};

/// Build the shared HTTP client with the configured timeouts.
pub fn build_client(http: &HttpConfig) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(http.request_timeout_secs))
        .connect_timeout(Duration::from_secs(http.connect_timeout_secs))
        .user_agent(concat!("dingbot/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::transport("failed to build http client", e))
}

/// Read a platform response, turning rejections into [`Error::Send`].
///
/// A non-2xx status or a non-zero `errcode` is a rejection; the parsed body
/// (or the raw text when it is not JSON) travels with the error.
pub async fn read_response(resp: Response, context: &str) -> Result<Value> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| Error::transport(format!("{context}: reading response"), e))?;
    let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    if !status.is_success() {
        return Err(Error::Send {
            message: format!("{context}: HTTP {status}"),
            body,
        });
    }
    if let Some(code) = errcode(&body)
        && code != 0
    {
        let errmsg = body.get("errmsg").and_then(Value::as_str).unwrap_or_default();
        return Err(Error::Send {
            message: format!("{context}: errcode {code} {errmsg}").trim_end().to_string(),
            body,
        });
    }
    Ok(body)
}

fn errcode(body: &Value) -> Option<i64> {
    match body.get("errcode")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
