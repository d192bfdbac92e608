use anyhow::Context;
use ipnet::IpNet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub tracking_server: ServerConfig,
    pub geo: GeoConfig,
    pub prefetch: PrefetchConfig,
    pub trusted_proxies: Vec<IpNet>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: DatabaseBackend,
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoConfig {
    /// Provider credential. Enrichment is disabled when absent.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "GeoConfig::default_api_url")]
    pub api_url: String,
    #[serde(default = "GeoConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "GeoConfig::default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "GeoConfig::default_cache_capacity")]
    pub cache_capacity: u64,
}

impl GeoConfig {
    fn default_api_url() -> String {
        "https://ipgeolocation.abstractapi.com/v1/".to_string()
    }

    const fn default_timeout_ms() -> u64 {
        3000
    }

    const fn default_cache_ttl_secs() -> u64 {
        900
    }

    const fn default_cache_capacity() -> u64 {
        10_000
    }
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: Self::default_api_url(),
            timeout_ms: Self::default_timeout_ms(),
            cache_ttl_secs: Self::default_cache_ttl_secs(),
            cache_capacity: Self::default_cache_capacity(),
        }
    }
}

/// How a recognized image-proxy user agent affects open recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefetchPolicy {
    /// Webmail proxies only fetch images after the recipient opens the message,
    /// so only proxied fetches are recorded.
    ProxyImpliesHuman,
    /// Proxied fetches are treated as automated prefetches and skipped.
    ProxyIsBot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefetchConfig {
    pub policy: PrefetchPolicy,
    pub proxy_signatures: Vec<String>,
}

impl PrefetchConfig {
    pub fn default_signatures() -> Vec<String> {
        vec!["GoogleImageProxy".to_string()]
    }
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self {
            policy: PrefetchPolicy::ProxyImpliesHuman,
            proxy_signatures: Self::default_signatures(),
        }
    }
}

fn parse_env<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{name} has an invalid value: '{raw}'")),
        Err(_) => Ok(default),
    }
}

fn parse_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let backend_str =
            std::env::var("DATABASE_BACKEND").unwrap_or_else(|_| "sqlite".to_string());

        let backend = match backend_str.to_lowercase().as_str() {
            "postgres" | "postgresql" => DatabaseBackend::Postgres,
            _ => DatabaseBackend::Sqlite,
        };

        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./mailtrack.db?mode=rwc".to_string());
        let max_connections = parse_env("DATABASE_MAX_CONNECTIONS", 10u32)?;

        let host = std::env::var("TRACKING_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_env("TRACKING_PORT", 5000u16)?;

        let geo = GeoConfig {
            api_key: std::env::var("GEO_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty()),
            api_url: std::env::var("GEO_API_URL").unwrap_or_else(|_| GeoConfig::default_api_url()),
            timeout_ms: parse_env("GEO_TIMEOUT_MS", GeoConfig::default_timeout_ms())?,
            cache_ttl_secs: parse_env("GEO_CACHE_TTL_SECS", GeoConfig::default_cache_ttl_secs())?,
            cache_capacity: parse_env("GEO_CACHE_CAPACITY", GeoConfig::default_cache_capacity())?,
        };

        let policy = match std::env::var("PREFETCH_POLICY")
            .unwrap_or_else(|_| "proxy_implies_human".to_string())
            .to_lowercase()
            .as_str()
        {
            "proxy_implies_human" => PrefetchPolicy::ProxyImpliesHuman,
            "proxy_is_bot" => PrefetchPolicy::ProxyIsBot,
            other => {
                tracing::warn!(
                    "Unknown PREFETCH_POLICY '{other}', falling back to 'proxy_implies_human'. Supported values: proxy_implies_human, proxy_is_bot"
                );
                PrefetchPolicy::ProxyImpliesHuman
            }
        };

        let proxy_signatures = match std::env::var("PROXY_SIGNATURES") {
            Ok(raw) => parse_list(&raw).map(str::to_string).collect(),
            Err(_) => PrefetchConfig::default_signatures(),
        };

        let trusted_proxies = match std::env::var("TRUSTED_PROXIES") {
            Ok(raw) => parse_list(&raw)
                .map(|cidr| {
                    cidr.parse::<IpNet>()
                        .with_context(|| format!("TRUSTED_PROXIES contains an invalid CIDR: '{cidr}'"))
                })
                .collect::<anyhow::Result<Vec<_>>>()?,
            Err(_) => Vec::new(),
        };

        Ok(Config {
            database: DatabaseConfig {
                backend,
                url: database_url,
                max_connections,
            },
            tracking_server: ServerConfig { host, port },
            geo,
            prefetch: PrefetchConfig {
                policy,
                proxy_signatures,
            },
            trusted_proxies,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_skips_blanks() {
        let items: Vec<&str> = parse_list(" GoogleImageProxy, ,YahooMailProxy ,").collect();
        assert_eq!(items, vec!["GoogleImageProxy", "YahooMailProxy"]);
    }

    #[test]
    fn test_prefetch_defaults() {
        let prefetch = PrefetchConfig::default();
        assert_eq!(prefetch.policy, PrefetchPolicy::ProxyImpliesHuman);
        assert_eq!(prefetch.proxy_signatures, vec!["GoogleImageProxy".to_string()]);
    }

    #[test]
    fn test_geo_defaults() {
        let geo = GeoConfig::default();
        assert!(geo.api_key.is_none());
        assert_eq!(geo.timeout_ms, 3000);
    }
}
