use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;

/// The two kinds of trackable resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Campaign,
    Link,
}

impl ResourceKind {
    pub fn table(self) -> &'static str {
        match self {
            Self::Campaign => "campaigns",
            Self::Link => "tracked_links",
        }
    }

    pub fn counter_column(self) -> &'static str {
        match self {
            Self::Campaign => "open_count",
            Self::Link => "click_count",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Campaign => f.write_str("campaign"),
            Self::Link => f.write_str("link"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Active,
    Inactive,
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
        }
    }
}

impl From<bool> for ResourceStatus {
    fn from(is_active: bool) -> Self {
        if is_active {
            Self::Active
        } else {
            Self::Inactive
        }
    }
}

/// Ownership and status columns shared by campaigns and links.
#[derive(Debug, Clone, FromRow)]
pub struct ResourceRecord {
    pub id: i64,
    pub owner_id: i64,
    pub is_active: bool,
}

/// An email whose opens are counted through the tracking pixel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub created_at: i64,
    pub is_active: bool,
    pub open_count: i64,
}

impl Campaign {
    pub fn status(&self) -> ResourceStatus {
        self.is_active.into()
    }
}

/// A redirect whose clicks are counted.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TrackedLink {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub destination_url: String,
    pub created_at: i64,
    pub is_active: bool,
    pub click_count: i64,
}

impl TrackedLink {
    pub fn status(&self) -> ResourceStatus {
        self.is_active.into()
    }
}
