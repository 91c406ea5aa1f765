//! Configuration loading, env substitution, and validation for dingbot.
//!
//! Config files: `dingbot.toml`, `dingbot.yaml`, or `dingbot.json`
//! Searched in `./` then `~/.config/dingbot/`.
//!
//! Supports `${ENV_VAR}` and `${ENV_VAR:-default}` substitution in the raw file.

pub mod env_subst;
pub mod error;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    error::{Error, Result},
    loader::{config_dir, discover_and_load, find_config_file, load_config, parse_config},
    schema::{
        ChannelCredentials, CustomRobotCredentials, DingbotConfig, DispatchConfig, Endpoints,
        EndpointsConfig, EnterpriseRobotCredentials, HttpConfig,
    },
    validate::{Diagnostic, Severity, ValidationResult},
};
