//! Configuration loading and types for assetgate.
//!
//! Configuration comes from an optional YAML file deserialized into
//! [`Config`], then environment variables override individual fields
//! (`LISTEN_ADDR`, `MINIO_*`, `ASSET_*`, `LOG_*`).  [`Config::validate`]
//! normalizes the storage endpoint and rejects incomplete settings.

use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

use crate::asset::cache_control::CachePolicy;
use crate::asset::key::PrefixAuthorizer;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// S3-compatible storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Asset delivery policy.
    #[serde(default)]
    pub assets: AssetsConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port` or `:port`.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Seconds in-flight requests get to finish after a shutdown signal.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

impl ServerConfig {
    /// Socket address suitable for `TcpListener::bind`.
    pub fn bind_addr(&self) -> String {
        if self.listen_addr.starts_with(':') {
            format!("0.0.0.0{}", self.listen_addr)
        } else {
            self.listen_addr.clone()
        }
    }
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// `host[:port]`, or a full `http(s)://` URL before validation.
    #[serde(default)]
    pub endpoint: String,

    /// Use TLS.  Derived from the scheme when `endpoint` is a URL.
    #[serde(default = "default_true")]
    pub use_ssl: bool,

    #[serde(default)]
    pub access_key_id: String,

    #[serde(default)]
    pub secret_access_key: String,

    /// Bucket all assets are served from.
    #[serde(default)]
    pub bucket: String,

    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            use_ssl: true,
            access_key_id: String::new(),
            secret_access_key: String::new(),
            bucket: String::new(),
            region: default_region(),
        }
    }
}

impl StorageConfig {
    /// Endpoint URL for the SDK client.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}", self.endpoint)
    }
}

/// Asset delivery policy.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetsConfig {
    /// Overrides every Cache-Control decision when non-empty.
    #[serde(default)]
    pub cache_control: String,

    /// Cache-Control for ordinary keys.
    #[serde(default = "default_cache_control")]
    pub cache_control_default: String,

    /// Cache-Control for versioned (`.v<digit>`) keys.
    #[serde(default = "default_cache_control_immutable")]
    pub cache_control_immutable: String,

    /// Key prefixes that may be served.  Empty allows everything.
    #[serde(default)]
    pub allowed_prefixes: Vec<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            cache_control: String::new(),
            cache_control_default: default_cache_control(),
            cache_control_immutable: default_cache_control_immutable(),
            allowed_prefixes: Vec::new(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

/// Immutable per-process settings consumed by the asset pipeline.
#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub bucket: String,
    pub cache_policy: CachePolicy,
    pub authorizer: PrefixAuthorizer,
}

impl Config {
    /// Settings for [`crate::asset::pipeline::AssetPipeline`].
    pub fn asset_settings(&self) -> AssetSettings {
        AssetSettings {
            bucket: self.storage.bucket.clone(),
            cache_policy: CachePolicy {
                override_value: self.assets.cache_control.trim().to_string(),
                default_value: self.assets.cache_control_default.trim().to_string(),
                immutable_value: self.assets.cache_control_immutable.trim().to_string(),
            },
            authorizer: PrefixAuthorizer::new(&self.assets.allowed_prefixes),
        }
    }

    /// Apply environment overrides from `vars`.
    ///
    /// Blank values are ignored so they never clobber a file or default value,
    /// except `ASSET_CACHE_CONTROL` and `ASSET_ALLOWED_PREFIXES` which are
    /// empty by default anyway.
    pub fn apply_env(&mut self, vars: &HashMap<String, String>) {
        let get = |name: &str| {
            vars.get(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(v) = get("LISTEN_ADDR") {
            self.server.listen_addr = v;
        }
        if let Some(v) = get("MINIO_ENDPOINT") {
            self.storage.endpoint = v;
        }
        if let Some(v) = get("MINIO_USE_SSL") {
            if let Some(b) = parse_bool(&v) {
                self.storage.use_ssl = b;
            }
        }
        if let Some(v) = get("MINIO_ACCESS_KEY_ID") {
            self.storage.access_key_id = v;
        }
        if let Some(v) = get("MINIO_SECRET_ACCESS_KEY") {
            self.storage.secret_access_key = v;
        }
        if let Some(v) = get("MINIO_BUCKET") {
            self.storage.bucket = v;
        }
        if let Some(v) = get("MINIO_REGION") {
            self.storage.region = v;
        }
        if let Some(v) = get("ASSET_CACHE_CONTROL") {
            self.assets.cache_control = v;
        }
        if let Some(v) = get("ASSET_CACHE_CONTROL_DEFAULT") {
            self.assets.cache_control_default = v;
        }
        if let Some(v) = get("ASSET_CACHE_CONTROL_IMMUTABLE") {
            self.assets.cache_control_immutable = v;
        }
        if let Some(v) = get("ASSET_ALLOWED_PREFIXES") {
            self.assets.allowed_prefixes = split_csv(&v);
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.logging.format = v;
        }
    }

    /// Normalize the endpoint and check required fields.
    pub fn validate(&mut self) -> anyhow::Result<()> {
        let storage = &mut self.storage;
        storage.endpoint = storage.endpoint.trim().to_string();

        if storage.endpoint.is_empty() {
            bail!("MINIO_ENDPOINT is required");
        }

        // host:port or a full URL; a URL decides TLS from its scheme.
        if let Some((scheme, rest)) = storage.endpoint.split_once("://") {
            storage.use_ssl = match scheme.to_ascii_lowercase().as_str() {
                "http" => false,
                "https" => true,
                other => bail!("MINIO_ENDPOINT scheme must be http or https, got {other:?}"),
            };
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            if host.is_empty() {
                bail!("MINIO_ENDPOINT url must include host");
            }
            storage.endpoint = host.to_string();
        }

        if storage.access_key_id.is_empty() {
            bail!("MINIO_ACCESS_KEY_ID is required");
        }
        if storage.secret_access_key.is_empty() {
            bail!("MINIO_SECRET_ACCESS_KEY is required");
        }
        if storage.bucket.is_empty() {
            bail!("MINIO_BUCKET is required");
        }

        self.assets.allowed_prefixes = split_csv(&self.assets.allowed_prefixes.join(","));
        Ok(())
    }
}

/// Split a comma-separated list, trimming entries and dropping blanks.
pub fn split_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts the same spellings as Go's `strconv.ParseBool`.
fn parse_bool(v: &str) -> Option<bool> {
    match v {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_listen_addr() -> String {
    ":8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    15
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_cache_control() -> String {
    "public, max-age=3600".to_string()
}

fn default_cache_control_immutable() -> String {
    "public, max-age=31536000, immutable".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load configuration: YAML file (when given), then process environment.
pub fn load_config<P: AsRef<Path>>(path: Option<P>) -> anyhow::Result<Config> {
    let mut config = match path {
        Some(path) => {
            let path = path.as_ref();
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            serde_yaml::from_str(&contents)
                .with_context(|| format!("parsing config file {}", path.display()))?
        }
        None => Config::default(),
    };
    let vars: HashMap<String, String> = std::env::vars().collect();
    config.apply_env(&vars);
    config.validate()?;
    Ok(config)
}

// -- Tests --------------------------------------------------------------------
