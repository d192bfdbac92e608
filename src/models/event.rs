use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Approximate location of a source address. Any field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct GeoInfo {
    pub city: Option<String>,
    pub country: Option<String>,
    pub country_code: Option<String>,
    pub isp: Option<String>,
}

impl GeoInfo {
    pub fn is_empty(&self) -> bool {
        self.city.is_none()
            && self.country.is_none()
            && self.country_code.is_none()
            && self.isp.is_none()
    }
}

/// A recorded pixel fetch. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OpenEvent {
    pub id: i64,
    pub campaign_id: i64,
    pub owner_id: i64,
    pub ip: String,
    pub user_agent: String,
    pub opened_at: i64,
    #[sqlx(flatten)]
    pub geo_info: GeoInfo,
    pub is_real_open: bool,
}

/// A recorded redirect. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ClickEvent {
    pub id: i64,
    pub link_id: i64,
    pub owner_id: i64,
    pub destination_url: String,
    pub ip: String,
    pub user_agent: String,
    pub clicked_at: i64,
    #[sqlx(flatten)]
    pub geo_info: GeoInfo,
}

#[derive(Debug, Clone)]
pub struct NewOpenEvent {
    pub campaign_id: i64,
    pub owner_id: i64,
    pub ip: String,
    pub user_agent: String,
    pub opened_at: i64,
    pub geo_info: GeoInfo,
    pub is_real_open: bool,
}

#[derive(Debug, Clone)]
pub struct NewClickEvent {
    pub link_id: i64,
    pub owner_id: i64,
    pub destination_url: String,
    pub ip: String,
    pub user_agent: String,
    pub clicked_at: i64,
    pub geo_info: GeoInfo,
}
