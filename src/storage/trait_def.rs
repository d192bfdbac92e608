use crate::models::{
    Account, Campaign, ClickEvent, NewClickEvent, NewOpenEvent, OpenEvent, ResourceKind,
    ResourceRecord, TrackedLink,
};
use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record already exists")]
    Conflict,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Maps tracking API keys to accounts.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Account>>;
}

/// Campaign and link registry consulted by the tracking path.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Look up ownership and status of a campaign or link
    async fn find_resource(&self, kind: ResourceKind, id: i64) -> Result<Option<ResourceRecord>>;

    /// Add one to the open or click counter of a resource
    async fn increment_counter(&self, kind: ResourceKind, id: i64) -> Result<()>;
}

/// Append-only event log.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_open(&self, event: &NewOpenEvent) -> Result<i64>;

    async fn insert_click(&self, event: &NewClickEvent) -> Result<i64>;
}

#[async_trait]
pub trait Storage: IdentityStore + ResourceStore + EventStore {
    /// Initialize the storage (create tables and indexes)
    async fn init(&self) -> Result<()>;

    /// Create an account with a freshly generated API key
    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password_hash: Option<&str>,
    ) -> StorageResult<Account>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Create an active campaign with a zero open count
    async fn create_campaign(&self, owner_id: i64, name: &str) -> Result<Campaign>;

    /// Create an active tracked link with a zero click count
    async fn create_link(&self, owner_id: i64, name: &str, destination_url: &str)
        -> Result<TrackedLink>;

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>>;

    async fn get_link(&self, id: i64) -> Result<Option<TrackedLink>>;

    /// Toggle a resource's status. Returns false if it does not exist or is owned by someone else.
    async fn set_status(
        &self,
        kind: ResourceKind,
        id: i64,
        owner_id: i64,
        active: bool,
    ) -> Result<bool>;

    async fn list_campaigns(&self, owner_id: i64) -> Result<Vec<Campaign>>;

    async fn list_links(&self, owner_id: i64) -> Result<Vec<TrackedLink>>;

    /// Open events of an owner, newest first, optionally restricted to one campaign
    async fn list_open_events(
        &self,
        owner_id: i64,
        campaign_id: Option<i64>,
    ) -> Result<Vec<OpenEvent>>;

    /// Click events of an owner, newest first, optionally restricted to one link
    async fn list_click_events(
        &self,
        owner_id: i64,
        link_id: Option<i64>,
    ) -> Result<Vec<ClickEvent>>;
}

/// Generate a new tracking API key: `trk_` followed by 16 random bytes, URL-safe base64.
pub fn generate_api_key() -> String {
    use base64::prelude::*;

    let bytes: [u8; 16] = rand::random();
    format!("trk_{}", BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

pub(crate) fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}
