use std::net::IpAddr;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{
    Account, GeoInfo, NewClickEvent, NewOpenEvent, ResourceKind, ResourceRecord,
};
use crate::storage::{EventStore, ResourceStore};

#[derive(Debug, Error)]
pub enum RecordError {
    /// Nothing was written.
    #[error("failed to insert event: {0}")]
    Insert(#[source] anyhow::Error),
    /// The event exists but its counter was not incremented.
    #[error("event {event_id} inserted but counter increment failed: {source}")]
    Increment {
        event_id: i64,
        #[source]
        source: anyhow::Error,
    },
}

/// Appends events and bumps the parent counter, one pair per qualifying request.
///
/// The counter is only incremented after the insert succeeded, so a counter
/// can lag its events after a crash but never run ahead of them.
#[derive(Clone)]
pub struct EventRecorder {
    events: Arc<dyn EventStore>,
    resources: Arc<dyn ResourceStore>,
}

impl EventRecorder {
    pub fn new(events: Arc<dyn EventStore>, resources: Arc<dyn ResourceStore>) -> Self {
        Self { events, resources }
    }

    pub async fn record_open(
        &self,
        campaign: &ResourceRecord,
        account: &Account,
        ip: IpAddr,
        user_agent: &str,
        geo_info: GeoInfo,
    ) -> Result<i64, RecordError> {
        let event = NewOpenEvent {
            campaign_id: campaign.id,
            owner_id: account.id,
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            opened_at: chrono::Utc::now().timestamp(),
            geo_info,
            is_real_open: true,
        };

        let event_id = self
            .events
            .insert_open(&event)
            .await
            .map_err(RecordError::Insert)?;

        self.increment(ResourceKind::Campaign, campaign.id, event_id)
            .await
    }

    pub async fn record_click(
        &self,
        link: &ResourceRecord,
        account: &Account,
        destination_url: &str,
        ip: IpAddr,
        user_agent: &str,
        geo_info: GeoInfo,
    ) -> Result<i64, RecordError> {
        let event = NewClickEvent {
            link_id: link.id,
            owner_id: account.id,
            destination_url: destination_url.to_string(),
            ip: ip.to_string(),
            user_agent: user_agent.to_string(),
            clicked_at: chrono::Utc::now().timestamp(),
            geo_info,
        };

        let event_id = self
            .events
            .insert_click(&event)
            .await
            .map_err(RecordError::Insert)?;

        self.increment(ResourceKind::Link, link.id, event_id).await
    }

    async fn increment(
        &self,
        kind: ResourceKind,
        id: i64,
        event_id: i64,
    ) -> Result<i64, RecordError> {
        self.resources
            .increment_counter(kind, id)
            .await
            .map_err(|source| RecordError::Increment { event_id, source })?;

        Ok(event_id)
    }
}
