use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, ConnectInfo, Query, State},
    http::{
        header::{self, HeaderMap, HeaderValue},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use ipnet::IpNet;
use serde::Serialize;
use thiserror::Error;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::models::{Account, ResourceKind, ResourceRecord};
use crate::tracking::{
    extract_client_ip, Denial, EventRecorder, GeoEnricher, IdentityError, IdentityResolver,
    PrefetchClassifier, RecordError, ResourceGuard,
};

/// 1x1 fully transparent PNG (grayscale + alpha), served on every `/track` request.
pub static TRANSPARENT_PNG: [u8; 68] = [
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, //
    0x49, 0x48, 0x44, 0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, //
    0x08, 0x04, 0x00, 0x00, 0x00, 0xb5, 0x1c, 0x0c, 0x02, 0x00, 0x00, 0x00, //
    0x0b, 0x49, 0x44, 0x41, 0x54, 0x78, 0xda, 0x63, 0x64, 0x60, 0x00, 0x00, //
    0x00, 0x06, 0x00, 0x02, 0x30, 0x81, 0xd0, 0x2f, 0x00, 0x00, 0x00, 0x00, //
    0x49, 0x45, 0x4e, 0x44, 0xae, 0x42, 0x60, 0x82,
];

pub const MISSING_URL_MESSAGE: &str = "Invalid link: No destination URL provided.";

pub struct TrackingState {
    pub identity: IdentityResolver,
    pub guard: ResourceGuard,
    pub classifier: PrefetchClassifier,
    pub geo: GeoEnricher,
    pub recorder: EventRecorder,
    pub trusted_proxies: Vec<IpNet>,
}

/// Raw query pairs in request order. Repeated keys are kept so that one
/// duplicated parameter cannot reject the whole query.
type QueryPairs = Vec<(String, String)>;

fn first_value(pairs: &[(String, String)], key: &str) -> Option<String> {
    pairs
        .iter()
        .find(|(name, _)| name == key)
        .map(|(_, value)| value.clone())
}

fn query_pairs(params: Result<Query<QueryPairs>, QueryRejection>) -> QueryPairs {
    match params {
        Ok(Query(pairs)) => pairs,
        Err(rejection) => {
            debug!(error = %rejection, "unreadable query string");
            Vec::new()
        }
    }
}

#[derive(Debug, Default)]
pub struct TrackParams {
    pub api_key: Option<String>,
    pub uid: Option<String>,
}

impl TrackParams {
    /// First value wins for repeated keys.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            api_key: first_value(pairs, "api_key"),
            uid: first_value(pairs, "uid"),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClickParams {
    pub api_key: Option<String>,
    pub uid: Option<String>,
    pub url: Option<String>,
}

impl ClickParams {
    /// First value wins for repeated keys.
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            api_key: first_value(pairs, "api_key"),
            uid: first_value(pairs, "uid"),
            url: first_value(pairs, "url"),
        }
    }
}

/// Why a tracking request produced no event. Every variant ends in the fallback response.
#[derive(Debug, Error)]
enum Skip {
    #[error("{0}")]
    Identity(IdentityError),
    #[error("uid missing or malformed")]
    MissingUid,
    #[error("{0}")]
    Denied(Denial),
    #[error("user agent not eligible under prefetch policy")]
    NotHumanOpen,
    #[error("{0}")]
    Record(RecordError),
}

fn parse_uid(uid: Option<&str>) -> Option<i64> {
    uid.and_then(|raw| raw.trim().parse::<i64>().ok())
        .filter(|id| *id > 0)
}

/// Non-ASCII bytes are kept (lossily decoded) so a proxy signature is still visible.
fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default()
}

fn pixel_response() -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-cache, no-store, must-revalidate"),
        ],
        Bytes::from_static(&TRANSPARENT_PNG),
    )
        .into_response()
}

fn redirect_response(location: HeaderValue) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// Pixel endpoint: `GET /track?api_key=..&uid=<campaign id>`
///
/// Always answers with the transparent PNG, whatever happened.
pub async fn track_open(
    State(state): State<Arc<TrackingState>>,
    params: Result<Query<QueryPairs>, QueryRejection>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let params = TrackParams::from_pairs(&query_pairs(params));
    let client_ip = extract_client_ip(&headers, addr.ip(), &state.trusted_proxies);
    let user_agent = user_agent(&headers);

    // Spawned so a client disconnect cannot cancel recording.
    let task = tokio::spawn(process_open(state, params, client_ip, user_agent));
    match task.await {
        Ok(Ok(event_id)) => debug!(event_id, "open recorded"),
        Ok(Err(skip)) => log_skip("open", &skip),
        Err(err) => error!(error = %err, "open tracking task failed"),
    }

    pixel_response()
}

async fn process_open(
    state: Arc<TrackingState>,
    params: TrackParams,
    client_ip: IpAddr,
    user_agent: String,
) -> Result<i64, Skip> {
    let account = state
        .identity
        .resolve(params.api_key.as_deref())
        .await
        .map_err(Skip::Identity)?;
    let uid = parse_uid(params.uid.as_deref()).ok_or(Skip::MissingUid)?;
    let campaign = state
        .guard
        .authorize(ResourceKind::Campaign, uid, &account)
        .await
        .map_err(Skip::Denied)?;

    if !state.classifier.should_record_open(&user_agent) {
        return Err(Skip::NotHumanOpen);
    }

    let geo_info = state.geo.lookup(client_ip).await;
    let event_id = state
        .recorder
        .record_open(&campaign, &account, client_ip, &user_agent, geo_info)
        .await
        .map_err(Skip::Record)?;

    info!(campaign_id = campaign.id, owner_id = account.id, "tracked open");
    Ok(event_id)
}

/// Redirect endpoint: `GET /click?api_key=..&uid=<link id>&url=<destination>`
///
/// Redirects to `url` on every path; only a missing or unusable `url` is an error.
pub async fn track_click(
    State(state): State<Arc<TrackingState>>,
    params: Result<Query<QueryPairs>, QueryRejection>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Response {
    let mut params = ClickParams::from_pairs(&query_pairs(params));

    let destination = match params.url.take().filter(|url| !url.trim().is_empty()) {
        Some(url) => url,
        None => return (StatusCode::BAD_REQUEST, MISSING_URL_MESSAGE).into_response(),
    };

    let location = match HeaderValue::from_bytes(destination.as_bytes()) {
        Ok(location) => location,
        Err(_) => {
            debug!("destination URL is not a valid Location header");
            return (StatusCode::BAD_REQUEST, MISSING_URL_MESSAGE).into_response();
        }
    };

    let client_ip = extract_client_ip(&headers, addr.ip(), &state.trusted_proxies);
    let user_agent = user_agent(&headers);

    let task = tokio::spawn(process_click(
        state,
        params,
        destination,
        client_ip,
        user_agent,
    ));
    match task.await {
        Ok(Ok(event_id)) => debug!(event_id, "click recorded"),
        Ok(Err(skip)) => log_skip("click", &skip),
        Err(err) => error!(error = %err, "click tracking task failed"),
    }

    redirect_response(location)
}

async fn process_click(
    state: Arc<TrackingState>,
    params: ClickParams,
    destination: String,
    client_ip: IpAddr,
    user_agent: String,
) -> Result<i64, Skip> {
    let account: Account = state
        .identity
        .resolve(params.api_key.as_deref())
        .await
        .map_err(Skip::Identity)?;
    let uid = parse_uid(params.uid.as_deref()).ok_or(Skip::MissingUid)?;
    let link: ResourceRecord = state
        .guard
        .authorize(ResourceKind::Link, uid, &account)
        .await
        .map_err(Skip::Denied)?;

    let geo_info = state.geo.lookup(client_ip).await;
    let event_id = state
        .recorder
        .record_click(&link, &account, &destination, client_ip, &user_agent, geo_info)
        .await
        .map_err(Skip::Record)?;

    info!(link_id = link.id, owner_id = account.id, "tracked click");
    Ok(event_id)
}

fn log_skip(kind: &'static str, skip: &Skip) {
    match skip {
        Skip::Record(RecordError::Increment { event_id, .. }) => {
            error!(kind, event_id, reason = %skip, "event recorded without counter increment");
        }
        Skip::Record(RecordError::Insert(_)) => {
            warn!(kind, reason = %skip, "event not recorded");
        }
        _ => debug!(kind, reason = %skip, "event not recorded"),
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    #[derive(Serialize)]
    struct HealthResponse {
        status: String,
    }

    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}
