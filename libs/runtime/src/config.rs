use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Main application configuration.
///
/// The server section is a flat enumerated record: every knob an operator
/// can turn is visible in one place, so deployments can be diffed.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Logging configuration (optional, console-only defaults if None).
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub path_prefix: String,
    pub cors_enabled: bool,
    /// Allowed origins. Empty or containing "*" means allow-all.
    pub cors_origins: Vec<String>,
    pub auth_enabled: bool,
    pub auth_header: String,
    pub auth_key: String,
    /// Requests per minute per client IP. 0 disables rate limiting.
    pub rate_limit: u32,
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub write_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Duration,
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            path_prefix: "/api/v1".to_string(),
            cors_enabled: false,
            cors_origins: Vec::new(),
            auth_enabled: false,
            auth_header: "X-API-Key".to_string(),
            auth_key: String::new(),
            rate_limit: 0,
            cache_ttl: Duration::from_secs(300),
            read_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(120),
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    pub console_level: String, // "info", "debug", "error", "off"
    /// Log file path, relative paths resolved against the working dir.
    /// Empty disables the file sink.
    pub file: String,
    pub file_level: String,
    pub max_size_mb: u64,
    pub max_backups: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            console_level: "info".to_string(),
            file: String::new(),
            file_level: "debug".to_string(),
            max_size_mb: 100,
            max_backups: 3,
        }
    }
}

impl AppConfig {
    /// Layered loading: defaults → YAML file → `STARMAP__` environment →
    /// `HTTP_HOST`/`HTTP_PORT` overrides.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(AppConfig::default()))
            .merge(Yaml::file(config_path.as_ref()))
            // Example: STARMAP__SERVER__PORT=8080 maps to server.port
            .merge(Env::prefixed("STARMAP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| "Failed to extract config from figment".to_string())?;

        config.apply_env_overrides();
        Ok(config)
    }

    /// Load configuration from file or fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                c.apply_env_overrides();
                Ok(c)
            }
        }
    }

    /// `HTTP_PORT` and `HTTP_HOST` take precedence over file and prefixed
    /// environment settings.
    fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("HTTP_HOST") {
            if !host.trim().is_empty() {
                self.server.host = host;
            }
        }
        if let Ok(port) = std::env::var("HTTP_PORT") {
            if let Ok(port) = port.trim().parse::<u16>() {
                self.server.port = port;
            }
        }
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.port = port;
        }

        let logging = self.logging.get_or_insert_with(LoggingConfig::default);
        logging.console_level = match args.verbose {
            0 => logging.console_level.clone(), // keep
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        };
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub port: Option<u16>,
    pub print_config: bool,
    pub verbose: u8,
}
