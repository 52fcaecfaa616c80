/// `load_config` module: loads a static YAML config and injects environment secrets into it.
///
/// This module is the only place where untrusted YAML is parsed and mapped onto
/// the strongly-typed [`SyncConfig`] of the core crate.
///
/// # Responsibilities
/// - Parse the YAML file into loose intermediate structs
/// - Map them onto [`SyncConfig`] (e.g. a plain `accept_format` string becomes
///   [`AcceptFormat::Literal`])
/// - Inject the API location and token from the environment
///   (`UPLOAD_API_URL` overrides the file, `UPLOAD_API_TOKEN` is env-only)
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::{error, info};
use upload_sync_core::config::{AcceptFormat, SyncConfig};

/// Where uploads are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApiSettings {
    pub base_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug)]
pub struct CliConfig {
    pub field: SyncConfig,
    pub api: ApiSettings,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    field: Option<FieldSection>,
    #[serde(default)]
    api: Option<ApiSection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldSection {
    #[serde(default = "default_max_count")]
    max_count: Option<usize>,
    remove_on_error: Option<bool>,
    remove_confirm: Option<bool>,
    keep_missing_id: Option<bool>,
    max_size_mb: Option<f64>,
    accept: Option<String>,
    accept_format: Option<String>,
    show_success_msg: Option<bool>,
    abort_on_drop: Option<bool>,
    #[serde(default)]
    extra_data: serde_json::Map<String, serde_json::Value>,
}

fn default_max_count() -> Option<usize> {
    SyncConfig::default().max_count
}

#[derive(Debug, Deserialize)]
struct ApiSection {
    base_url: Option<String>,
}

impl FieldSection {
    fn into_sync_config(self) -> SyncConfig {
        let defaults = SyncConfig::default();
        SyncConfig {
            max_count: self.max_count,
            remove_on_error: self.remove_on_error.unwrap_or(defaults.remove_on_error),
            remove_confirm: self.remove_confirm.unwrap_or(defaults.remove_confirm),
            keep_missing_id: self.keep_missing_id.unwrap_or(defaults.keep_missing_id),
            max_size_mb: self.max_size_mb.unwrap_or(defaults.max_size_mb),
            accept: self.accept,
            accept_format: self.accept_format.map(AcceptFormat::Literal),
            show_success_msg: self.show_success_msg.unwrap_or(defaults.show_success_msg),
            abort_on_drop: self.abort_on_drop.unwrap_or(defaults.abort_on_drop),
            extra_data: self.extra_data,
        }
    }
}

/// Loads a static YAML config file (no secrets) and injects env vars for secrets.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let raw: RawConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    let field = raw
        .field
        .map(FieldSection::into_sync_config)
        .unwrap_or_default();
    if field.max_size_mb <= 0.0 {
        error!(max_size_mb = field.max_size_mb, "max_size_mb must be positive");
        anyhow::bail!("max_size_mb must be positive, got {}", field.max_size_mb);
    }
    if field.max_count == Some(0) {
        error!("max_count must be at least 1");
        anyhow::bail!("max_count must be at least 1 (use null for unbounded)");
    }
    field.trace_loaded();

    let base_url = match std::env::var("UPLOAD_API_URL") {
        Ok(url) => {
            info!("UPLOAD_API_URL found in env, overriding config file");
            Some(url)
        }
        Err(_) => raw.api.and_then(|api| api.base_url),
    };
    let token = std::env::var("UPLOAD_API_TOKEN").ok();
    if token.is_some() {
        info!("UPLOAD_API_TOKEN found in env");
    }

    info!(
        base_url = ?base_url,
        mode = ?field.mode(),
        "Config loaded and merged successfully"
    );

    Ok(CliConfig {
        field,
        api: ApiSettings { base_url, token },
    })
}
