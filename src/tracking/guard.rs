use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Account, ResourceKind, ResourceRecord};
use crate::storage::ResourceStore;

/// Reason a campaign or link may not receive events.
///
/// Never surfaced to the tracked party, only logged.
#[derive(Debug, Error)]
pub enum Denial {
    #[error("resource not found")]
    NotFound,
    #[error("resource owned by another account")]
    NotOwned,
    #[error("resource inactive")]
    Inactive,
    #[error("resource store unavailable: {0}")]
    Store(#[source] anyhow::Error),
}

/// Ownership and active-status gate in front of the event recorder.
#[derive(Clone)]
pub struct ResourceGuard {
    store: Arc<dyn ResourceStore>,
}

impl ResourceGuard {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self { store }
    }

    pub async fn authorize(
        &self,
        kind: ResourceKind,
        id: i64,
        owner: &Account,
    ) -> Result<ResourceRecord, Denial> {
        let result = match self.store.find_resource(kind, id).await {
            Ok(Some(record)) if record.owner_id != owner.id => Err(Denial::NotOwned),
            Ok(Some(record)) if !record.is_active => Err(Denial::Inactive),
            Ok(Some(record)) => Ok(record),
            Ok(None) => Err(Denial::NotFound),
            Err(err) => Err(Denial::Store(err)),
        };

        match &result {
            Ok(_) => {}
            Err(Denial::Store(err)) => {
                warn!(%kind, id, owner_id = owner.id, error = %err, "resource lookup failed");
            }
            Err(denial) => {
                debug!(%kind, id, owner_id = owner.id, reason = %denial, "tracking denied");
            }
        }

        result
    }
}
