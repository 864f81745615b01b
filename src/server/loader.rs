//! Layered configuration
//!
//! Sources, lowest priority first: the defaults compiled into the binary,
//! `config/default`, `config/{SHELLCORD_ENV}`, `config/local`, then
//! `SHELLCORD_*` variables (`SHELLCORD_ENGINE__IDLE_TIMEOUT_SECS=300`).

use super::config::AppConfig;
use anyhow::{bail, Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use std::collections::HashMap;
use std::path::Path;

/// Defaults compiled into the binary
pub const DEFAULT_CONFIG: &str = include_str!("../../config/default.toml");

const CONFIG_DIR: &str = "config";
const ENV_PREFIX: &str = "SHELLCORD";
const DEFAULT_PROFILE: &str = "development";

/// Load configuration from files and the process environment
pub fn load_config() -> Result<AppConfig> {
    let profile = std::env::var("SHELLCORD_ENV").unwrap_or_else(|_| DEFAULT_PROFILE.to_string());
    load_from(Path::new(CONFIG_DIR), &profile, None)
}

/// Load with an explicit config directory and, for tests, a fixed variable set
/// in place of the process environment
fn load_from(
    dir: &Path,
    profile: &str,
    vars: Option<HashMap<String, String>>,
) -> Result<AppConfig> {
    let config = layered(dir, profile)
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(vars),
        )
        .build()
        .context("Failed to build configuration")?;

    let mut app: AppConfig = config
        .try_deserialize()
        .context("Failed to deserialize configuration")?;
    app.discord = app.discord.with_env_token();

    validate(&app)?;
    Ok(app)
}

fn layered(dir: &Path, profile: &str) -> ConfigBuilder<DefaultState> {
    let file = |name: &str| File::with_name(&dir.join(name).to_string_lossy()).required(false);

    Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(file("default"))
        .add_source(file(profile))
        .add_source(file("local"))
}

/// Reject settings the engine cannot run with
fn validate(app: &AppConfig) -> Result<()> {
    let engine = &app.engine;
    if engine.poll_interval_ms == 0 {
        bail!("engine.poll_interval_ms must be greater than zero");
    }
    if engine.read_chunk == 0 || engine.window_lines == 0 || engine.window_chars == 0 {
        bail!("engine.read_chunk, engine.window_lines and engine.window_chars must be positive");
    }
    if engine.message_ceiling == 0 || engine.status_ceiling == 0 {
        bail!("engine display ceilings must be positive");
    }
    if !matches!(app.logging.format.to_ascii_lowercase().as_str(), "pretty" | "json") {
        bail!(
            "logging.format must be \"pretty\" or \"json\", got \"{}\"",
            app.logging.format
        );
    }
    Ok(())
}
