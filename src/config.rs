/*
 * Responsibility
 * - 環境変数の読み込み (PORT, CORS 許可, Graph API の接続先と識別子など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::services::roles::AssignmentFailurePolicy;

const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    pub fn from_env() -> Self {
        match std::env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Connection settings for the identity-graph API.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    pub base_url: Url,
    // Directory tenant. Only reported at startup; lookups go through the caller's token.
    pub tenant_id: String,
    // Application (client) id whose service principal carries the role catalog.
    pub client_id: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout: Duration,

    pub graph: GraphConfig,
    pub assignment_failure_policy: AssignmentFailurePolicy,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(3000);

        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::from_env();

        let cors_allowed_origins = std::env::var("CORS_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        let request_timeout_seconds = std::env::var("REQUEST_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(30);

        let base_url = std::env::var("GRAPH_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_GRAPH_BASE_URL.to_string());
        let base_url = parse_base_url(&base_url).ok_or(ConfigError::Invalid("GRAPH_BASE_URL"))?;

        let tenant_id = required("GRAPH_TENANT_ID")?;
        let client_id = required("GRAPH_CLIENT_ID")?;

        let graph_timeout_seconds = std::env::var("GRAPH_TIMEOUT_SECONDS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(10);

        let assignment_failure_policy = match std::env::var("ASSIGNMENT_FAILURE_POLICY") {
            Ok(raw) => AssignmentFailurePolicy::from_str(&raw)
                .map_err(|_| ConfigError::Invalid("ASSIGNMENT_FAILURE_POLICY"))?,
            Err(_) => AssignmentFailurePolicy::default(),
        };

        Ok(Self {
            addr,
            app_env,
            cors_allowed_origins,
            request_timeout: Duration::from_secs(request_timeout_seconds),
            graph: GraphConfig {
                base_url,
                tenant_id,
                client_id,
                timeout: Duration::from_secs(graph_timeout_seconds),
            },
            assignment_failure_policy,
        })
    }
}

fn required(key: &'static str) -> Result<String, ConfigError> {
    non_empty(key, std::env::var(key).ok())
}

// Blank values count as missing.
fn non_empty(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(ConfigError::Missing(key)),
    }
}

// Only absolute http(s) URLs that can take path segments are usable as a base.
fn parse_base_url(raw: &str) -> Option<Url> {
    let url = Url::parse(raw.trim()).ok()?;
    if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
        return None;
    }
    Some(url)
}
