use std::time::Duration;

/// API server configuration - a flat enumerated record so every knob is
/// visible in one place.
#[derive(Debug, Clone)]
pub struct ApiConfig {
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
    pub cache_ttl: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub metrics_enabled: bool,
}

impl Default for ApiConfig {
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

impl ApiConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cors_allow_all(&self) -> bool {
        self.cors_origins.is_empty() || self.cors_origins.iter().any(|o| o == "*")
    }

    /// Paths exempt from authentication.
    pub fn is_public_path(&self, path: &str) -> bool {
        if path == "/health" || path == "/favicon.ico" {
            return true;
        }
        let prefix = self.path_prefix.trim_end_matches('/');
        [
            format!("{prefix}/health"),
            format!("{prefix}/ready"),
            format!("{prefix}/openapi.json"),
            format!("{prefix}/openapi.yaml"),
        ]
        .iter()
        .any(|p| p == path)
    }
}
