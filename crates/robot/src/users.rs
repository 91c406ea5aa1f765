//! Mobile number to user id lookup.

use {
    serde::Serialize,
    serde_json::{Value, json},
    tracing::{debug, warn},
};

use crate::{
    api::read_response,
    auth::AccessToken,
    error::{Error, Result},
};

/// A mobile number and the user id it maps to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedUser {
    pub mobile: String,
    pub user_id: String,
}

/// Outcome of resolving one item's mobiles. Both lists keep input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    pub resolved: Vec<ResolvedUser>,
    pub failed: Vec<String>,
}

impl Resolution {
    #[must_use]
    pub fn user_ids(&self) -> Vec<String> {
        self.resolved.iter().map(|u| u.user_id.clone()).collect()
    }

    #[must_use]
    pub fn user_id_for(&self, mobile: &str) -> Option<&str> {
        self.resolved
            .iter()
            .find(|u| u.mobile == mobile)
            .map(|u| u.user_id.as_str())
    }
}

/// Looks up user ids one mobile at a time.
pub struct UserResolver {
    http: reqwest::Client,
    lookup_url: String,
}

impl UserResolver {
    #[must_use]
    pub fn new(http: reqwest::Client, oapi_base_url: &str) -> Self {
        Self {
            http,
            lookup_url: format!(
                "{}/topapi/v2/user/getbymobile",
                oapi_base_url.trim_end_matches('/')
            ),
        }
    }

    /// Resolve every mobile. A failed lookup is recorded and the rest continue.
    pub async fn resolve(&self, mobiles: &[String], token: &AccessToken) -> Resolution {
        let mut resolution = Resolution::default();
        for mobile in mobiles.iter().map(|m| m.trim()).filter(|m| !m.is_empty()) {
            let seen = resolution.user_id_for(mobile).is_some()
                || resolution.failed.iter().any(|f| f == mobile);
            if seen {
                continue;
            }
            match self.lookup(mobile, token).await {
                Ok(user_id) => {
                    debug!(mobile, user_id = %user_id, "resolved mobile");
                    resolution.resolved.push(ResolvedUser {
                        mobile: mobile.to_string(),
                        user_id,
                    });
                },
                Err(e) => {
                    warn!(mobile, error = %e, "mobile lookup failed");
                    resolution.failed.push(mobile.to_string());
                },
            }
        }
        resolution
    }

    async fn lookup(&self, mobile: &str, token: &AccessToken) -> Result<String> {
        let failed = |message: String| Error::Resolution {
            mobile: mobile.to_string(),
            message,
        };

        let resp = self
            .http
            .post(&self.lookup_url)
            .query(&[("access_token", token.expose())])
            .json(&json!({ "mobile": mobile }))
            .send()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?;
        let body = read_response(resp, "getbymobile")
            .await
            .map_err(|e| failed(e.to_string()))?;

        body.pointer("/result/userid")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| failed("response carried no userid".into()))
    }
}
