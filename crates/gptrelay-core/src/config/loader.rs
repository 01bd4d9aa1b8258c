//! Config loader: reads `~/.gptrelay/config.json`, merges env vars, and
//! applies legacy migrations.
//!
//! # Loading precedence
//! 1. Defaults (from `Config::default()`)
//! 2. JSON file at `~/.gptrelay/config.json`
//! 3. Environment variables `GPTRELAY_<SECTION>__<FIELD>` (override JSON)

use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::schema::Config;

/// Default config file path.
pub fn get_config_path() -> PathBuf {
    crate::utils::get_data_path().join("config.json")
}

/// Load configuration from the given path (or the default one) + env vars.
///
/// Falls back to `Config::default()` if the file doesn't exist or can't be parsed.
pub fn load_config(path: Option<&Path>) -> Config {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    load_config_from_path(&config_path)
}

/// Load config from a specific file path.
fn load_config_from_path(path: &Path) -> Config {
    if !path.exists() {
        info!("No config file found at {}, using defaults", path.display());
        return apply_env_overrides(Config::default());
    }

    debug!("Loading config from {}", path.display());

    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to read config file {}: {}", path.display(), e);
            return apply_env_overrides(Config::default());
        }
    };

    let mut raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to parse config JSON: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    migrate_config(&mut raw);

    let config: Config = match serde_json::from_value(raw) {
        Ok(c) => c,
        Err(e) => {
            warn!("Failed to deserialize config: {}", e);
            return apply_env_overrides(Config::default());
        }
    };

    apply_env_overrides(config)
}

/// Save configuration to disk (pretty-printed JSON with camelCase keys).
pub fn save_config(config: &Config, path: Option<&Path>) -> std::io::Result<()> {
    let config_path = path
        .map(PathBuf::from)
        .unwrap_or_else(get_config_path);

    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(config).map_err(std::io::Error::other)?;

    std::fs::write(&config_path, json)?;
    debug!("Config saved to {}", config_path.display());
    Ok(())
}

/// Apply legacy config migrations.
///
/// Older configs were flat:
/// `{"auth": "secret", "printLog": true, "openai": {"enabled", "baseUrl", "apiKey"}}`.
/// Each legacy key is only moved when its new home is absent.
fn migrate_config(raw: &mut serde_json::Value) {
    let Some(obj) = raw.as_object_mut() else {
        return;
    };

    // auth: "secret" → auth.secret
    if let Some(secret) = obj.get("auth").and_then(|v| v.as_str()).map(String::from) {
        obj.insert("auth".into(), serde_json::json!({ "secret": secret }));
        debug!("Migrated auth → auth.secret");
    }

    // printLog → log.printAnswers
    if let Some(print) = obj.remove("printLog") {
        if !obj.contains_key("log") {
            obj.insert("log".into(), serde_json::json!({ "printAnswers": print }));
            debug!("Migrated printLog → log.printAnswers");
        }
    }

    // openai: {...} → channels: [{name: "openai", ...}]
    if let Some(openai) = obj.remove("openai") {
        if !obj.contains_key("channels") {
            let mut channel = serde_json::json!({ "name": "openai", "kind": "openai" });
            for key in ["enabled", "baseUrl", "apiKey"] {
                if let Some(v) = openai.get(key) {
                    channel[key] = v.clone();
                }
            }
            obj.insert("channels".into(), serde_json::json!([channel]));
            debug!("Migrated openai → channels[openai]");
        }
    }
}

/// Apply environment variable overrides on top of a loaded config.
///
/// Env var format: `GPTRELAY_<SECTION>__<FIELD>` (double underscore as delimiter).
///
/// Supported overrides:
/// - `GPTRELAY_SERVER__HOST`, `GPTRELAY_SERVER__PORT`, `GPTRELAY_SERVER__MAX_BODY_BYTES`
/// - `GPTRELAY_AUTH__SECRET`
/// - `GPTRELAY_LOG__PRINT_ANSWERS`
/// - `GPTRELAY_TRANSPORT__PROXY`, `GPTRELAY_TRANSPORT__INSECURE_TLS`
/// - `GPTRELAY_CHANNELS__<NAME>__API_KEY`, `GPTRELAY_CHANNELS__<NAME>__BASE_URL`
fn apply_env_overrides(config: Config) -> Config {
    apply_overrides(config, |key| std::env::var(key).ok())
}

fn apply_overrides(mut config: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(val) = var("GPTRELAY_SERVER__HOST") {
        config.server.host = val;
    }
    if let Some(val) = var("GPTRELAY_SERVER__PORT") {
        match val.parse::<u16>() {
            Ok(p) => config.server.port = p,
            Err(_) => warn!("Ignoring invalid GPTRELAY_SERVER__PORT: {}", val),
        }
    }
    if let Some(val) = var("GPTRELAY_SERVER__MAX_BODY_BYTES") {
        if let Ok(n) = val.parse::<usize>() {
            config.server.max_body_bytes = n;
        }
    }

    if let Some(val) = var("GPTRELAY_AUTH__SECRET") {
        config.auth.secret = val;
    }
    if let Some(val) = var("GPTRELAY_LOG__PRINT_ANSWERS") {
        config.log.print_answers = parse_flag(&val);
    }

    if let Some(val) = var("GPTRELAY_TRANSPORT__PROXY") {
        config.transport.proxy = if val.is_empty() { None } else { Some(val) };
    }
    if let Some(val) = var("GPTRELAY_TRANSPORT__INSECURE_TLS") {
        config.transport.insecure_tls = parse_flag(&val);
    }

    for channel in &mut config.channels {
        let name = env_segment(&channel.name);
        if let Some(val) = var(&format!("GPTRELAY_CHANNELS__{name}__API_KEY")) {
            channel.api_key = val;
        }
        if let Some(val) = var(&format!("GPTRELAY_CHANNELS__{name}__BASE_URL")) {
            channel.base_url = val;
        }
    }

    config
}

/// `my-channel` → `MY_CHANNEL`.
fn env_segment(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}

fn parse_flag(val: &str) -> bool {
    val == "true" || val == "1"
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
