use anyhow::Result;
use axum::{routing::get, Router};
use ipnet::IpNet;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::storage::{EventStore, IdentityStore, ResourceStore, Storage};
use crate::tracking::{
    EventRecorder, GeoEnricher, IdentityResolver, PrefetchClassifier, ResourceGuard,
};

use super::handlers::{health_check, track_click, track_open, TrackingState};

impl TrackingState {
    pub fn new(
        identities: Arc<dyn IdentityStore>,
        resources: Arc<dyn ResourceStore>,
        events: Arc<dyn EventStore>,
        classifier: PrefetchClassifier,
        geo: GeoEnricher,
        trusted_proxies: Vec<IpNet>,
    ) -> Self {
        Self {
            identity: IdentityResolver::new(identities),
            guard: ResourceGuard::new(Arc::clone(&resources)),
            classifier,
            geo,
            recorder: EventRecorder::new(events, resources),
            trusted_proxies,
        }
    }

    /// Wire every collaborator to a single store, as the server binary does.
    pub fn from_config(storage: Arc<dyn Storage>, config: &Config) -> Result<Self> {
        Ok(Self::new(
            storage.clone(),
            storage.clone(),
            storage,
            PrefetchClassifier::from_config(&config.prefetch),
            GeoEnricher::from_config(&config.geo)?,
            config.trusted_proxies.clone(),
        ))
    }
}

pub fn create_tracking_router(state: Arc<TrackingState>) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/track", get(track_open))
        .route("/click", get(track_click))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
