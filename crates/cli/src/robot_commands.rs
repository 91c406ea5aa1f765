use {
    anyhow::{Context, Result, bail},
    clap::Args,
    dingbot_config::{ChannelCredentials, DingbotConfig},
    dingbot_robot::{Orchestrator, sign},
    serde_json::json,
};

#[derive(Args)]
pub struct SignArgs {
    /// Signing secret. Defaults to the configured custom robot's `webhook_sign`.
    #[arg(long, env = "DINGBOT_WEBHOOK_SIGN", hide_env_values = true)]
    secret: Option<String>,
    /// Epoch milliseconds to sign. Defaults to now.
    #[arg(long)]
    timestamp: Option<i64>,
    /// Print the full signed URL for this webhook instead of the bare signature.
    #[arg(long)]
    webhook_url: Option<String>,
}

#[derive(Args)]
pub struct TokenArgs {
    /// Print the token itself instead of a masked prefix.
    #[arg(long)]
    reveal: bool,
}

pub fn handle_sign(config: &DingbotConfig, args: SignArgs) -> Result<()> {
    let configured = match &config.channel {
        Some(ChannelCredentials::CustomRobot(creds)) => Some(creds),
        _ => None,
    };
    let secret = match (&args.secret, configured.and_then(|c| c.signing_secret())) {
        (Some(secret), _) => secret.as_str(),
        (None, Some(secret)) => secret,
        (None, None) => bail!("no signing secret: pass --secret or configure channel.webhook_sign"),
    };
    let timestamp = args.timestamp.unwrap_or_else(sign::now_millis);

    let signature = sign::sign(secret, timestamp)?;
    let webhook_url = args
        .webhook_url
        .as_deref()
        .or(configured.map(|c| c.webhook_url.as_str()));
    let mut out = json!({ "timestamp": signature.timestamp, "sign": signature.sign });
    if let Some(url) = webhook_url {
        out["url"] = json!(sign::signed_webhook_url(url, Some(secret), timestamp)?);
    }
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

pub async fn handle_token(config: &DingbotConfig, args: TokenArgs) -> Result<()> {
    if !matches!(config.channel, Some(ChannelCredentials::EnterpriseRobot(_))) {
        bail!("`dingbot token` needs an enterprise_robot channel in the config");
    }
    let orchestrator = Orchestrator::from_config(config)?;
    let tokens = orchestrator
        .token_manager()
        .context("enterprise channel has no token manager")?;
    let token = tokens.acquire().await?;

    let value = if args.reveal {
        token.expose().to_string()
    } else {
        mask(token.expose())
    };
    let out = json!({
        "accessToken": value,
        "acquiredAt": token.acquired_at().to_rfc3339(),
        "expiresIn": token.expires_in().as_secs(),
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Show at most a quarter of the token, never more than six characters.
fn mask(token: &str) -> String {
    let shown = (token.chars().count() / 4).min(6);
    let prefix: String = token.chars().take(shown).collect();
    format!("{prefix}…")
}
