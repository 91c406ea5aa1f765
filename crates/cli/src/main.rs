mod config_commands;
mod robot_commands;
mod send_commands;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    dingbot_config::DingbotConfig,
    tracing::{debug, info},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "dingbot", about = "dingbot: DingTalk robot notifications")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of discovering `dingbot.{toml,yaml,json}`.
    #[arg(long, global = true, env = "DINGBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch every item of an items file over the configured channel.
    Send(send_commands::SendArgs),
    /// Compute a custom robot webhook signature.
    Sign(robot_commands::SignArgs),
    /// Fetch an enterprise robot access token to check credentials.
    Token(robot_commands::TokenArgs),
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays machine-readable.
    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Load the explicit config file, or discover one (falling back to defaults).
fn load_config(path: Option<&Path>) -> anyhow::Result<DingbotConfig> {
    match path {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            Ok(dingbot_config::load_config(path)?)
        },
        None => Ok(dingbot_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "dingbot starting");

    match cli.command {
        Commands::Send(args) => {
            let config = load_config(cli.config.as_deref())?;
            send_commands::handle_send(config, args).await
        },
        Commands::Sign(args) => {
            let config = load_config(cli.config.as_deref())?;
            robot_commands::handle_sign(&config, args)
        },
        Commands::Token(args) => {
            let config = load_config(cli.config.as_deref())?;
            robot_commands::handle_token(&config, args).await
        },
        Commands::Config { action } => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}
