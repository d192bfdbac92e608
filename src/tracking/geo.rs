//! Best-effort geolocation of source addresses
//!
//! Lookups go to a third-party HTTP provider. Every lookup is bounded by a
//! strict budget and any failure degrades to an empty [`GeoInfo`], so the
//! pixel or redirect response never waits on provider downtime.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use moka::future::Cache;
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::GeoConfig;
use crate::models::GeoInfo;

#[derive(Debug, Error)]
pub enum GeoLookupError {
    #[error("lookup timed out")]
    Timeout,
    #[error("provider responded with status {0}")]
    Status(StatusCode),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("malformed payload: {0}")]
    Payload(String),
}

#[async_trait]
pub trait GeoProvider: Send + Sync {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, GeoLookupError>;

    /// Provider name for logs
    fn name(&self) -> &'static str;
}

/// Used when no provider credential is configured.
pub struct DisabledGeoProvider;

#[async_trait]
impl GeoProvider for DisabledGeoProvider {
    async fn lookup(&self, _ip: IpAddr) -> Result<GeoInfo, GeoLookupError> {
        Ok(GeoInfo::default())
    }

    fn name(&self) -> &'static str {
        "disabled"
    }
}

#[derive(Debug, Deserialize)]
struct AbstractApiResponse {
    city: Option<String>,
    country: Option<String>,
    country_code: Option<String>,
    #[serde(default)]
    connection: Option<AbstractApiConnection>,
}

#[derive(Debug, Deserialize)]
struct AbstractApiConnection {
    isp_name: Option<String>,
}

impl From<AbstractApiResponse> for GeoInfo {
    fn from(payload: AbstractApiResponse) -> Self {
        GeoInfo {
            city: payload.city,
            country: payload.country,
            country_code: payload.country_code,
            isp: payload.connection.and_then(|c| c.isp_name),
        }
    }
}

/// Abstract API IP geolocation (`?api_key=..&ip_address=..`).
pub struct AbstractApiProvider {
    client: Client,
    endpoint: Url,
    api_key: String,
}

impl AbstractApiProvider {
    pub fn new(endpoint: &str, api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("mailtrack/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for geo lookups")?;

        let endpoint = Url::parse(endpoint)
            .with_context(|| format!("invalid geo provider URL '{endpoint}'"))?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.to_string(),
        })
    }

    fn request_url(&self, ip: IpAddr) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("api_key", &self.api_key)
            .append_pair("ip_address", &ip.to_string());
        url
    }
}

#[async_trait]
impl GeoProvider for AbstractApiProvider {
    async fn lookup(&self, ip: IpAddr) -> Result<GeoInfo, GeoLookupError> {
        let response = self
            .client
            .get(self.request_url(ip))
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    GeoLookupError::Timeout
                } else {
                    GeoLookupError::Transport(err.to_string())
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(GeoLookupError::Status(status));
        }

        let payload = response.json::<AbstractApiResponse>().await.map_err(|err| {
            if err.is_timeout() {
                GeoLookupError::Timeout
            } else {
                GeoLookupError::Payload(err.to_string())
            }
        })?;

        Ok(payload.into())
    }

    fn name(&self) -> &'static str {
        "abstractapi"
    }
}

/// Time-bounded, cached front for a [`GeoProvider`]. Never fails.
pub struct GeoEnricher {
    provider: Arc<dyn GeoProvider>,
    budget: Duration,
    /// `None` when the configured capacity is zero.
    cache: Option<Cache<IpAddr, GeoInfo>>,
}

impl GeoEnricher {
    pub fn new(
        provider: Arc<dyn GeoProvider>,
        budget: Duration,
        cache_ttl: Duration,
        cache_capacity: u64,
    ) -> Self {
        let cache = (cache_capacity > 0).then(|| {
            Cache::builder()
                .max_capacity(cache_capacity)
                .time_to_live(cache_ttl)
                .build()
        });

        Self {
            provider,
            budget,
            cache,
        }
    }

    /// Pick the provider from configuration: Abstract API when a key is set, disabled otherwise.
    pub fn from_config(config: &GeoConfig) -> Result<Self> {
        let budget = Duration::from_millis(config.timeout_ms);
        let provider: Arc<dyn GeoProvider> = match config.api_key.as_deref() {
            Some(key) => Arc::new(AbstractApiProvider::new(&config.api_url, key, budget)?),
            None => Arc::new(DisabledGeoProvider),
        };

        Ok(Self::new(
            provider,
            budget,
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_capacity,
        ))
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub async fn lookup(&self, ip: IpAddr) -> GeoInfo {
        if !is_routable(ip) {
            debug!(%ip, "skipping geo lookup for non-routable address");
            return GeoInfo::default();
        }

        if let Some(cache) = &self.cache {
            if let Some(cached) = cache.get(&ip).await {
                return cached;
            }
        }

        match tokio::time::timeout(self.budget, self.provider.lookup(ip)).await {
            Ok(Ok(geo)) => {
                if let Some(cache) = self.cache.as_ref().filter(|_| !geo.is_empty()) {
                    cache.insert(ip, geo.clone()).await;
                }
                geo
            }
            Ok(Err(err)) => {
                warn!(%ip, provider = self.provider.name(), error = %err, "geo lookup failed");
                GeoInfo::default()
            }
            Err(_) => {
                warn!(
                    %ip,
                    provider = self.provider.name(),
                    budget_ms = self.budget.as_millis() as u64,
                    "geo lookup exceeded budget"
                );
                GeoInfo::default()
            }
        }
    }
}

/// Private, loopback and link-local addresses have no public geolocation.
fn is_routable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            let unique_local = (first & 0xfe00) == 0xfc00;
            let link_local = (first & 0xffc0) == 0xfe80;
            !(v6.is_loopback() || v6.is_unspecified() || unique_local || link_local)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: AtomicUsize,
        response: fn() -> Result<GeoInfo, GeoLookupError>,
        delay: Duration,
    }

    #[async_trait]
    impl GeoProvider for CountingProvider {
        async fn lookup(&self, _ip: IpAddr) -> Result<GeoInfo, GeoLookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            (self.response)()
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn london() -> Result<GeoInfo, GeoLookupError> {
        Ok(GeoInfo {
            city: Some("London".to_string()),
            country: Some("United Kingdom".to_string()),
            country_code: Some("GB".to_string()),
            isp: Some("Example Telecom".to_string()),
        })
    }

    fn server_error() -> Result<GeoInfo, GeoLookupError> {
        Err(GeoLookupError::Status(StatusCode::INTERNAL_SERVER_ERROR))
    }

    fn enricher(provider: Arc<CountingProvider>, budget: Duration) -> GeoEnricher {
        GeoEnricher::new(provider, budget, Duration::from_secs(60), 100)
    }

    fn public_ip() -> IpAddr {
        "203.0.113.9".parse().unwrap()
    }

    #[tokio::test]
    async fn test_lookup_success_is_cached() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            response: london,
            delay: Duration::ZERO,
        });
        let enricher = enricher(Arc::clone(&provider), Duration::from_secs(1));

        let first = enricher.lookup(public_ip()).await;
        let second = enricher.lookup(public_ip()).await;

        assert_eq!(first.city.as_deref(), Some("London"));
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_capacity_disables_cache() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            response: london,
            delay: Duration::ZERO,
        });
        let enricher = GeoEnricher::new(
            Arc::clone(&provider) as Arc<dyn GeoProvider>,
            Duration::from_secs(1),
            Duration::from_secs(60),
            0,
        );

        assert_eq!(enricher.lookup(public_ip()).await.city.as_deref(), Some("London"));
        assert_eq!(enricher.lookup(public_ip()).await.city.as_deref(), Some("London"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_returns_empty_and_is_not_cached() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            response: server_error,
            delay: Duration::ZERO,
        });
        let enricher = enricher(Arc::clone(&provider), Duration::from_secs(1));

        assert!(enricher.lookup(public_ip()).await.is_empty());
        assert!(enricher.lookup(public_ip()).await.is_empty());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_lookup_timeout_is_bounded() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            response: london,
            delay: Duration::from_secs(30),
        });
        let enricher = enricher(provider, Duration::from_millis(50));

        let started = std::time::Instant::now();
        let geo = enricher.lookup(public_ip()).await;

        assert!(geo.is_empty());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_private_addresses_skip_provider() {
        let provider = Arc::new(CountingProvider {
            calls: AtomicUsize::new(0),
            response: london,
            delay: Duration::ZERO,
        });
        let enricher = enricher(Arc::clone(&provider), Duration::from_secs(1));

        for ip in ["127.0.0.1", "10.1.2.3", "192.168.0.10", "::1", "fd00::1", "fe80::1"] {
            assert!(enricher.lookup(ip.parse().unwrap()).await.is_empty());
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_provider_returns_empty() {
        let geo = DisabledGeoProvider.lookup(public_ip()).await.unwrap();
        assert!(geo.is_empty());
    }

    #[test]
    fn test_abstract_api_payload_mapping() {
        let payload: AbstractApiResponse = serde_json::from_str(
            r#"{
                "ip_address": "203.0.113.9",
                "city": "Berlin",
                "country": "Germany",
                "country_code": "DE",
                "connection": {"isp_name": "Example GmbH", "autonomous_system_number": 64500}
            }"#,
        )
        .unwrap();
        let geo: GeoInfo = payload.into();
        assert_eq!(geo.city.as_deref(), Some("Berlin"));
        assert_eq!(geo.country_code.as_deref(), Some("DE"));
        assert_eq!(geo.isp.as_deref(), Some("Example GmbH"));
    }

    #[test]
    fn test_abstract_api_partial_payload() {
        let payload: AbstractApiResponse =
            serde_json::from_str(r#"{"country": "Japan", "city": null}"#).unwrap();
        let geo: GeoInfo = payload.into();
        assert_eq!(geo.country.as_deref(), Some("Japan"));
        assert!(geo.city.is_none());
        assert!(geo.isp.is_none());
    }

    #[test]
    fn test_request_url_carries_credentials() {
        let provider = AbstractApiProvider::new(
            "https://geo.example.com/v1/",
            "secret",
            Duration::from_secs(3),
        )
        .unwrap();
        let url = provider.request_url(public_ip());
        assert_eq!(
            url.as_str(),
            "https://geo.example.com/v1/?api_key=secret&ip_address=203.0.113.9"
        );
    }
}
