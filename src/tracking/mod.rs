//! Tracking ingestion core
//!
//! The pieces the `/track` and `/click` endpoints are assembled from:
//! API key resolution, ownership/status checks, prefetch classification,
//! bounded geo enrichment and event recording.

pub mod classifier;
pub mod geo;
pub mod guard;
pub mod identity;
pub mod ip_extractor;
pub mod recorder;

pub use classifier::PrefetchClassifier;
pub use geo::{
    AbstractApiProvider, DisabledGeoProvider, GeoEnricher, GeoLookupError, GeoProvider,
};
pub use guard::{Denial, ResourceGuard};
pub use identity::{IdentityError, IdentityResolver};
pub use ip_extractor::extract_client_ip;
pub use recorder::{EventRecorder, RecordError};
