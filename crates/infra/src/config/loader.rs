//! Configuration loader
//!
//! Loads application configuration from files and environment variables.
//!
//! ## Loading Strategy
//! 1. Starts from a config file when one is found (probing multiple paths,
//!    or the path named by `CALWEAVE_CONFIG`)
//! 2. Falls back to built-in defaults when no file exists
//! 3. Applies `CALWEAVE_*` environment overrides on top in either case
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `CALWEAVE_CONFIG`: Explicit config file path
//! - `CALWEAVE_SERVER_HOST` / `CALWEAVE_SERVER_PORT`: HTTP listener
//! - `CALWEAVE_SYNC_ENABLED`: Whether the scheduled sweep runs (true/false)
//! - `CALWEAVE_SWEEP_INTERVAL`: Seconds between reconciliation sweeps
//! - `CALWEAVE_SYNC_WINDOW_PAST_DAYS` / `CALWEAVE_SYNC_WINDOW_FUTURE_DAYS`
//! - `CALWEAVE_MAX_SYNC_RETRIES`: Transient retry budget per sync cycle
//! - `CALWEAVE_GLOBAL_CONCURRENCY`: Cap on concurrently executing sync tasks
//! - `CALWEAVE_MAX_PENDING_TASKS`: Queue admission limit
//! - `CALWEAVE_TASK_TIMEOUT`: Per-task bound in seconds
//! - `CALWEAVE_WEBHOOK_DEDUPE_TTL`: Duplicate suppression window in seconds
//! - `CALWEAVE_CHANNEL_RENEWAL_LEAD`: Channel renewal lead window in seconds
//! - `CALWEAVE_CALLBACK_BASE_URL`: Public base URL providers push to
//! - `CALWEAVE_GOOGLE_CLIENT_ID` / `CALWEAVE_GOOGLE_CLIENT_SECRET` /
//!   `CALWEAVE_GOOGLE_REDIRECT_URI`
//! - `CALWEAVE_MICROSOFT_CLIENT_ID` / `CALWEAVE_MICROSOFT_CLIENT_SECRET` /
//!   `CALWEAVE_MICROSOFT_REDIRECT_URI`
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. The path in `CALWEAVE_CONFIG`, when set
//! 2. `./config.json` or `./config.toml` (current working directory)
//! 3. `./calweave.json` or `./calweave.toml` (current working directory)
//! 4. Parent directories (up to 2 levels)
//! 5. Relative to executable location

use std::path::{Path, PathBuf};
use std::str::FromStr;

use calweave_domain::{CalWeaveError, Config, OAuthClientConfig, Result};

/// Load configuration with automatic fallback strategy
///
/// Starts from a config file when one exists, otherwise from defaults, and
/// applies environment overrides on top.
///
/// # Errors
/// Returns `CalWeaveError::Config` if:
/// - A config file was found but cannot be parsed
/// - An environment override has an invalid value
/// - An OAuth client is configured without its secret
pub fn load() -> Result<Config> {
    let base = match probe_config_paths() {
        Some(path) => load_from_file(Some(path))?,
        None => {
            tracing::info!("No config file found, starting from defaults");
            Config::default()
        }
    };
    apply_env_overrides(base)
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Arguments
/// * `path` - Optional path to config file. If `None`, uses
///   [`probe_config_paths`].
///
/// # Errors
/// Returns `CalWeaveError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(CalWeaveError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            CalWeaveError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| CalWeaveError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Errors
/// Returns `CalWeaveError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| CalWeaveError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| CalWeaveError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(CalWeaveError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// `CALWEAVE_CONFIG` wins when set; otherwise the standard locations are
/// searched in order.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    if let Ok(explicit) = std::env::var("CALWEAVE_CONFIG") {
        let path = PathBuf::from(explicit);
        if path.exists() {
            return Some(path);
        }
    }

    let mut candidates = Vec::new();

    // Try current working directory
    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("calweave.json"),
            cwd.join("calweave.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
            cwd.join("../../config.json"),
            cwd.join("../../config.toml"),
        ]);
    }

    // Try relative to executable
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("calweave.json"),
                exe_dir.join("calweave.toml"),
            ]);
        }
    }

    // Return first existing candidate
    candidates.into_iter().find(|path| path.exists())
}

/// Apply `CALWEAVE_*` environment overrides onto a base configuration
///
/// Unset variables leave the base value untouched.
fn apply_env_overrides(mut config: Config) -> Result<Config> {
    if let Ok(host) = std::env::var("CALWEAVE_SERVER_HOST") {
        config.server.host = host;
    }
    if let Some(port) = env_parse::<u16>("CALWEAVE_SERVER_PORT")? {
        config.server.port = port;
    }

    config.sync.enabled = env_bool("CALWEAVE_SYNC_ENABLED", config.sync.enabled);
    if let Some(interval) = env_parse::<u64>("CALWEAVE_SWEEP_INTERVAL")? {
        config.sync.sweep_interval_seconds = interval;
    }
    if let Some(days) = env_parse::<i64>("CALWEAVE_SYNC_WINDOW_PAST_DAYS")? {
        config.sync.window_past_days = days;
    }
    if let Some(days) = env_parse::<i64>("CALWEAVE_SYNC_WINDOW_FUTURE_DAYS")? {
        config.sync.window_future_days = days;
    }
    if let Some(retries) = env_parse::<u32>("CALWEAVE_MAX_SYNC_RETRIES")? {
        config.sync.max_retries = retries;
    }
    if let Some(concurrency) = env_parse::<usize>("CALWEAVE_GLOBAL_CONCURRENCY")? {
        config.sync.global_concurrency = concurrency;
    }
    if let Some(pending) = env_parse::<usize>("CALWEAVE_MAX_PENDING_TASKS")? {
        config.sync.max_pending_tasks = pending;
    }
    if let Some(timeout) = env_parse::<u64>("CALWEAVE_TASK_TIMEOUT")? {
        config.sync.task_timeout_seconds = timeout;
    }

    if let Some(ttl) = env_parse::<u64>("CALWEAVE_WEBHOOK_DEDUPE_TTL")? {
        config.webhook.dedupe_ttl_seconds = ttl;
    }
    if let Some(lead) = env_parse::<u64>("CALWEAVE_CHANNEL_RENEWAL_LEAD")? {
        config.webhook.channel_renewal_lead_seconds = lead;
    }
    if let Ok(url) = std::env::var("CALWEAVE_CALLBACK_BASE_URL") {
        config.webhook.callback_base_url = Some(url);
    }

    if let Some(google) = oauth_from_env("GOOGLE")? {
        config.providers.google = Some(google);
    }
    if let Some(microsoft) = oauth_from_env("MICROSOFT")? {
        config.providers.microsoft = Some(microsoft);
    }

    Ok(config)
}

/// Assemble one OAuth client block from `CALWEAVE_{PROVIDER}_*` variables
///
/// # Errors
/// Returns `CalWeaveError::Config` when a client id is present without its
/// secret, which would otherwise fail much later at the token endpoint.
fn oauth_from_env(provider: &str) -> Result<Option<OAuthClientConfig>> {
    let client_id = std::env::var(format!("CALWEAVE_{provider}_CLIENT_ID")).ok();
    let client_secret = std::env::var(format!("CALWEAVE_{provider}_CLIENT_SECRET")).ok();

    match (client_id, client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(Some(OAuthClientConfig {
            client_id,
            client_secret,
            redirect_uri: std::env::var(format!("CALWEAVE_{provider}_REDIRECT_URI")).ok(),
        })),
        (Some(_), None) => Err(CalWeaveError::Config(format!(
            "CALWEAVE_{provider}_CLIENT_SECRET must be set when CALWEAVE_{provider}_CLIENT_ID is"
        ))),
        _ => Ok(None),
    }
}

/// Parse an optional environment variable
///
/// # Errors
/// Returns `CalWeaveError::Config` if the variable is set but unparseable.
fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|e| CalWeaveError::Config(format!("Invalid value for {key}: {e}"))),
        Err(_) => Ok(None),
    }
}

/// Parse boolean from environment variable
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
///
/// # Arguments
/// * `key` - Environment variable name
/// * `default` - Default value if variable is not set
///
/// # Returns
/// The parsed boolean value, or `default` if not set.
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
