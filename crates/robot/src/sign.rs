//! Custom robot webhook signing.
//!
//! `sign = urlencode(base64(HMAC-SHA256(secret, "{timestamp}\n{secret}")))`,
//! appended to the webhook URL as `&timestamp=..&sign=..`.

use {
    base64::{Engine, engine::general_purpose::STANDARD},
    hmac::{Hmac, Mac},
    sha2::Sha256,
};

use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// A timestamp and the URL-encoded signature computed for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub timestamp: i64,
    pub sign: String,
}

/// Sign `timestamp_millis` with `secret`.
///
/// Fails only for an empty secret; callers treat that as "send unsigned".
pub fn sign(secret: &str, timestamp_millis: i64) -> Result<Signature> {
    if secret.is_empty() {
        return Err(Error::Sign {
            message: "secret is empty".into(),
        });
    }

    let string_to_sign = format!("{timestamp_millis}\n{secret}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| Error::Sign {
        message: e.to_string(),
    })?;
    mac.update(string_to_sign.as_bytes());
    let digest = STANDARD.encode(mac.finalize().into_bytes());

    Ok(Signature {
        timestamp: timestamp_millis,
        sign: urlencoding::encode(&digest).into_owned(),
    })
}

/// Wall-clock time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// The URL to POST to: signed when a non-empty secret is given.
pub fn signed_webhook_url(
    webhook_url: &str,
    secret: Option<&str>,
    timestamp_millis: i64,
) -> Result<String> {
    let Some(secret) = secret.filter(|s| !s.is_empty()) else {
        return Ok(webhook_url.to_string());
    };
    let Signature { timestamp, sign } = sign(secret, timestamp_millis)?;
    let separator = if webhook_url.contains('?') {
        '&'
    } else {
        '?'
    };
    Ok(format!(
        "{webhook_url}{separator}timestamp={timestamp}&sign={sign}"
    ))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    const T: i64 = 1_700_000_000_000;

    #[test]
    fn signature_is_deterministic() {
        let a = sign("s3cr3t", T).unwrap();
        let b = sign("s3cr3t", T).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.timestamp, T);
    }

    #[test]
    fn one_millisecond_changes_signature() {
        let a = sign("s3cr3t", T).unwrap();
        let b = sign("s3cr3t", T + 1).unwrap();
        assert_ne!(a.sign, b.sign);
    }

    #[test]
    fn signature_matches_manual_hmac() {
        let mut mac = HmacSha256::new_from_slice(b"s3cr3t").unwrap();
        mac.update(format!("{T}\ns3cr3t").as_bytes());
        let expected = STANDARD.encode(mac.finalize().into_bytes());

        let sig = sign("s3cr3t", T).unwrap();
        assert_eq!(urlencoding::decode(&sig.sign).unwrap(), expected);
        // base64 of a 32-byte digest always ends in one '=' padding char.
        assert!(sig.sign.ends_with("%3D"));
        assert!(!sig.sign.contains('+') && !sig.sign.contains('/'));
    }

    #[test]
    fn empty_secret_is_a_sign_error() {
        assert!(matches!(sign("", T), Err(Error::Sign { .. })));
    }

    #[test]
    fn unsigned_url_is_unchanged() {
        let url = "https://oapi.dingtalk.com/robot/send?access_token=abc";
        assert_eq!(signed_webhook_url(url, None, T).unwrap(), url);
        assert_eq!(signed_webhook_url(url, Some(""), T).unwrap(), url);
    }

    #[test]
    fn signed_url_appends_query() {
        let url = "https://oapi.dingtalk.com/robot/send?access_token=abc";
        let sig = sign("s3cr3t", T).unwrap();
        assert_eq!(
            signed_webhook_url(url, Some("s3cr3t"), T).unwrap(),
            format!("{url}&timestamp={T}&sign={}", sig.sign)
        );
        assert!(
            signed_webhook_url("https://hook.local/send", Some("s3cr3t"), T)
                .unwrap()
                .starts_with("https://hook.local/send?timestamp=")
        );
    }
}
