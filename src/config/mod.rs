//! Configuration management
//!
//! Configuration is read from `config.yml` and then overridden by environment
//! variables named `QUILLPRESS_<SECTION>_<KEY>`. Missing values fall back to
//! defaults, so an absent or empty file yields a runnable development setup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub site: SiteConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (cookie-based auth needs an explicit origin)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
    /// Public base URL, used to build OAuth callback URLs
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
            base_url: default_base_url(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite database path or `sqlite:` URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Maximum pooled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_database_url() -> String {
    "data/quillpress.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

/// Page and listing cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Maximum number of cached entries
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl(),
            max_capacity: default_max_capacity(),
        }
    }
}

fn default_ttl() -> u64 {
    300
}

fn default_max_capacity() -> u64 {
    10_000
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign OAuth state values
    #[serde(default)]
    pub secret: String,
    /// Session lifetime in days
    #[serde(default = "default_session_days")]
    pub session_days: i64,
    #[serde(default)]
    pub github: OAuthProviderConfig,
    #[serde(default)]
    pub google: OAuthProviderConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            session_days: default_session_days(),
            github: OAuthProviderConfig::default(),
            google: OAuthProviderConfig::default(),
        }
    }
}

fn default_session_days() -> i64 {
    7
}

impl AuthConfig {
    /// Whether any OAuth provider has credentials
    pub fn any_oauth_enabled(&self) -> bool {
        self.github.is_enabled() || self.google.is_enabled()
    }
}

/// OAuth client credentials for one provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OAuthProviderConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl OAuthProviderConfig {
    /// A provider is enabled once both credentials are present
    pub fn is_enabled(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Media CDN configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Public delivery endpoint, e.g. `https://ik.imagekit.io/demo`
    #[serde(default)]
    pub url_endpoint: String,
    /// Upload API endpoint
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    #[serde(default)]
    pub public_key: String,
    #[serde(default)]
    pub private_key: String,
    /// Destination folder on the CDN
    #[serde(default = "default_media_folder")]
    pub folder: String,
    /// Maximum upload size in bytes (default: 10MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Allowed image MIME types
    #[serde(default = "default_allowed_types")]
    pub allowed_types: Vec<String>,
    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            url_endpoint: String::new(),
            upload_url: default_upload_url(),
            public_key: String::new(),
            private_key: String::new(),
            folder: default_media_folder(),
            max_file_size: default_max_file_size(),
            allowed_types: default_allowed_types(),
            timeout_secs: default_timeout_secs(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_upload_url() -> String {
    "https://upload.imagekit.io/api/v1/files/upload".to_string()
}

fn default_media_folder() -> String {
    "/blog".to_string()
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_allowed_types() -> Vec<String> {
    vec![
        "image/jpeg".to_string(),
        "image/png".to_string(),
        "image/gif".to_string(),
        "image/webp".to_string(),
        "image/avif".to_string(),
    ]
}

fn default_timeout_secs() -> u64 {
    30
}

impl MediaConfig {
    /// Credentials and endpoints required for uploads are present
    pub fn is_configured(&self) -> bool {
        !self.private_key.is_empty() && !self.upload_url.is_empty() && !self.url_endpoint.is_empty()
    }

    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.iter().any(|t| t == mime_type)
    }
}

/// Exponential backoff settings for media uploads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

/// Site presentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_site_title")]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_posts_per_page")]
    pub posts_per_page: u32,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: default_site_title(),
            description: String::new(),
            posts_per_page: default_posts_per_page(),
        }
    }
}

fn default_site_title() -> String {
    "Quillpress".to_string()
}

fn default_posts_per_page() -> u32 {
    10
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Load configuration from file
    ///
    /// A missing or empty file yields the defaults. Invalid YAML is an error
    /// carrying the line and column.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: Config = serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })?;

        Ok(config)
    }

    /// Load configuration from file, then apply environment overrides
    ///
    /// Recognised variables:
    /// - QUILLPRESS_SERVER_HOST, QUILLPRESS_SERVER_PORT,
    ///   QUILLPRESS_SERVER_CORS_ORIGIN, QUILLPRESS_SERVER_BASE_URL
    /// - QUILLPRESS_DATABASE_URL, QUILLPRESS_DATABASE_MAX_CONNECTIONS
    /// - QUILLPRESS_CACHE_TTL_SECONDS
    /// - QUILLPRESS_AUTH_SECRET, QUILLPRESS_AUTH_SESSION_DAYS
    /// - QUILLPRESS_AUTH_GITHUB_CLIENT_ID, QUILLPRESS_AUTH_GITHUB_CLIENT_SECRET
    /// - QUILLPRESS_AUTH_GOOGLE_CLIENT_ID, QUILLPRESS_AUTH_GOOGLE_CLIENT_SECRET
    /// - QUILLPRESS_MEDIA_URL_ENDPOINT, QUILLPRESS_MEDIA_UPLOAD_URL,
    ///   QUILLPRESS_MEDIA_PUBLIC_KEY, QUILLPRESS_MEDIA_PRIVATE_KEY,
    ///   QUILLPRESS_MEDIA_MAX_RETRIES
    /// - QUILLPRESS_SITE_TITLE
    pub fn load_with_env(path: &Path) -> anyhow::Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        override_string("QUILLPRESS_SERVER_HOST", &mut self.server.host);
        override_parsed("QUILLPRESS_SERVER_PORT", &mut self.server.port);
        override_string("QUILLPRESS_SERVER_CORS_ORIGIN", &mut self.server.cors_origin);
        override_string("QUILLPRESS_SERVER_BASE_URL", &mut self.server.base_url);

        override_string("QUILLPRESS_DATABASE_URL", &mut self.database.url);
        override_parsed(
            "QUILLPRESS_DATABASE_MAX_CONNECTIONS",
            &mut self.database.max_connections,
        );

        override_parsed("QUILLPRESS_CACHE_TTL_SECONDS", &mut self.cache.ttl_seconds);

        override_string("QUILLPRESS_AUTH_SECRET", &mut self.auth.secret);
        override_parsed("QUILLPRESS_AUTH_SESSION_DAYS", &mut self.auth.session_days);
        override_string("QUILLPRESS_AUTH_GITHUB_CLIENT_ID", &mut self.auth.github.client_id);
        override_string(
            "QUILLPRESS_AUTH_GITHUB_CLIENT_SECRET",
            &mut self.auth.github.client_secret,
        );
        override_string("QUILLPRESS_AUTH_GOOGLE_CLIENT_ID", &mut self.auth.google.client_id);
        override_string(
            "QUILLPRESS_AUTH_GOOGLE_CLIENT_SECRET",
            &mut self.auth.google.client_secret,
        );

        override_string("QUILLPRESS_MEDIA_URL_ENDPOINT", &mut self.media.url_endpoint);
        override_string("QUILLPRESS_MEDIA_UPLOAD_URL", &mut self.media.upload_url);
        override_string("QUILLPRESS_MEDIA_PUBLIC_KEY", &mut self.media.public_key);
        override_string("QUILLPRESS_MEDIA_PRIVATE_KEY", &mut self.media.private_key);
        override_parsed("QUILLPRESS_MEDIA_MAX_RETRIES", &mut self.media.retry.max_retries);

        override_string("QUILLPRESS_SITE_TITLE", &mut self.site.title);
    }

    /// Reject combinations that cannot work at runtime
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth.any_oauth_enabled() && self.auth.secret.is_empty() {
            return Err(ConfigError::ValidationError(
                "auth.secret is required when an OAuth provider is configured".to_string(),
            ));
        }
        if self.auth.session_days <= 0 {
            return Err(ConfigError::ValidationError(
                "auth.session_days must be positive".to_string(),
            ));
        }
        if self.media.retry.base_delay_ms > self.media.retry.max_delay_ms {
            return Err(ConfigError::ValidationError(
                "media.retry.base_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        if self.site.posts_per_page == 0 {
            return Err(ConfigError::ValidationError(
                "site.posts_per_page must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn override_string(var: &str, target: &mut String) {
    if let Ok(value) = std::env::var(var) {
        *target = value;
    }
}

/// Invalid values are ignored and the previous value kept
fn override_parsed<T: std::str::FromStr>(var: &str, target: &mut T) {
    if let Ok(value) = std::env::var(var) {
        if let Ok(parsed) = value.parse::<T>() {
            *target = parsed;
        }
    }
}

/// Format YAML parsing error with location
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

/// Resolve the config path from `QUILLPRESS_CONFIG`, defaulting to `config.yml`
pub fn config_path() -> PathBuf {
    std::env::var("QUILLPRESS_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.yml"))
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn server_strategy() -> impl Strategy<Value = ServerConfig> {
        (
            prop_oneof![
                Just("0.0.0.0".to_string()),
                Just("127.0.0.1".to_string()),
                "[a-z][a-z0-9]{0,10}",
            ],
            1u16..=65535,
        )
            .prop_map(|(host, port)| ServerConfig {
                host,
                port,
                ..ServerConfig::default()
            })
    }

    fn retry_strategy() -> impl Strategy<Value = RetryConfig> {
        (0u32..10, 1u64..1_000, 1_000u64..60_000).prop_map(|(max_retries, base, max)| {
            RetryConfig {
                max_retries,
                base_delay_ms: base,
                max_delay_ms: max,
            }
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        /// Serializing a config to YAML and loading it back yields the same values
        #[test]
        fn config_yaml_roundtrip(server in server_strategy(), retry in retry_strategy()) {
            let mut config = Config::default();
            config.server = server;
            config.media.retry = retry;

            let yaml = serde_yaml::to_string(&config).expect("serialize config");
            let mut file = NamedTempFile::new().expect("temp file");
            write!(file, "{}", yaml).expect("write config");

            let parsed = Config::load(file.path()).expect("parse config");
            prop_assert_eq!(&parsed.server.host, &config.server.host);
            prop_assert_eq!(parsed.server.port, config.server.port);
            prop_assert_eq!(&parsed.media.retry, &config.media.retry);
            prop_assert!(parsed.validate().is_ok());
        }

        /// Wrongly typed scalars never load silently
        #[test]
        fn config_rejects_wrong_types(value in "[a-z]{3,8}") {
            let yaml = format!("cache:\n  ttl_seconds: {}\n", value);
            let mut file = NamedTempFile::new().expect("temp file");
            write!(file, "{}", yaml).expect("write config");
            prop_assert!(Config::load(file.path()).is_err());
        }
    }
}
