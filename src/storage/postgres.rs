use crate::models::{
    Account, Campaign, ClickEvent, NewClickEvent, NewOpenEvent, OpenEvent, ResourceKind,
    ResourceRecord, TrackedLink,
};
use crate::storage::trait_def::{generate_api_key, now_unix};
use crate::storage::{EventStore, IdentityStore, ResourceStore, Storage, StorageError, StorageResult};
use anyhow::Result;
use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, api_key, created_at";
const CAMPAIGN_COLUMNS: &str = "id, owner_id, name, created_at, is_active, open_count";
const LINK_COLUMNS: &str =
    "id, owner_id, name, destination_url, created_at, is_active, click_count";
const OPEN_EVENT_COLUMNS: &str = "id, campaign_id, owner_id, ip, user_agent, opened_at, city, country, country_code, isp, is_real_open";
const CLICK_EVENT_COLUMNS: &str = "id, link_id, owner_id, destination_url, ip, user_agent, clicked_at, city, country, country_code, isp";

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl IdentityStore for PostgresStorage {
    async fn find_by_api_key(&self, api_key: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE api_key = $1"
        ))
        .bind(api_key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(account)
    }
}

#[async_trait]
impl ResourceStore for PostgresStorage {
    async fn find_resource(&self, kind: ResourceKind, id: i64) -> Result<Option<ResourceRecord>> {
        let record = sqlx::query_as::<_, ResourceRecord>(&format!(
            "SELECT id, owner_id, is_active FROM {} WHERE id = $1",
            kind.table()
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(record)
    }

    async fn increment_counter(&self, kind: ResourceKind, id: i64) -> Result<()> {
        let column = kind.counter_column();
        sqlx::query(&format!(
            "UPDATE {} SET {column} = {column} + 1 WHERE id = $1",
            kind.table()
        ))
        .bind(id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }
}

#[async_trait]
impl EventStore for PostgresStorage {
    async fn insert_open(&self, event: &NewOpenEvent) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO open_events
                (campaign_id, owner_id, ip, user_agent, opened_at, city, country, country_code, isp, is_real_open)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(event.campaign_id)
        .bind(event.owner_id)
        .bind(&event.ip)
        .bind(&event.user_agent)
        .bind(event.opened_at)
        .bind(&event.geo_info.city)
        .bind(&event.geo_info.country)
        .bind(&event.geo_info.country_code)
        .bind(&event.geo_info.isp)
        .bind(event.is_real_open)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }

    async fn insert_click(&self, event: &NewClickEvent) -> Result<i64> {
        let id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO click_events
                (link_id, owner_id, destination_url, ip, user_agent, clicked_at, city, country, country_code, isp)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(event.link_id)
        .bind(event.owner_id)
        .bind(&event.destination_url)
        .bind(&event.ip)
        .bind(&event.user_agent)
        .bind(event.clicked_at)
        .bind(&event.geo_info.city)
        .bind(&event.geo_info.country)
        .bind(&event.geo_info.country_code)
        .bind(&event.geo_info.isp)
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(id)
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS accounts (
                id BIGSERIAL PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT,
                api_key TEXT NOT NULL UNIQUE,
                created_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS campaigns (
                id BIGSERIAL PRIMARY KEY,
                owner_id BIGINT NOT NULL REFERENCES accounts(id),
                name TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                open_count BIGINT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tracked_links (
                id BIGSERIAL PRIMARY KEY,
                owner_id BIGINT NOT NULL REFERENCES accounts(id),
                name TEXT NOT NULL,
                destination_url TEXT NOT NULL,
                created_at BIGINT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                click_count BIGINT NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS open_events (
                id BIGSERIAL PRIMARY KEY,
                campaign_id BIGINT NOT NULL REFERENCES campaigns(id),
                owner_id BIGINT NOT NULL REFERENCES accounts(id),
                ip TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                opened_at BIGINT NOT NULL,
                city TEXT,
                country TEXT,
                country_code TEXT,
                isp TEXT,
                is_real_open BOOLEAN NOT NULL DEFAULT TRUE
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS click_events (
                id BIGSERIAL PRIMARY KEY,
                link_id BIGINT NOT NULL REFERENCES tracked_links(id),
                owner_id BIGINT NOT NULL REFERENCES accounts(id),
                destination_url TEXT NOT NULL,
                ip TEXT NOT NULL,
                user_agent TEXT NOT NULL,
                clicked_at BIGINT NOT NULL,
                city TEXT,
                country TEXT,
                country_code TEXT,
                isp TEXT
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_campaigns_owner ON campaigns(owner_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_owner ON tracked_links(owner_id)")
            .execute(self.pool.as_ref())
            .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_open_events_owner ON open_events(owner_id, opened_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_click_events_owner ON click_events(owner_id, clicked_at)",
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn create_account(
        &self,
        name: &str,
        email: &str,
        password_hash: Option<&str>,
    ) -> StorageResult<Account> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (name, email, password_hash, api_key, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .bind(generate_api_key())
        .bind(now_unix())
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StorageError::Other(e.into()))?;

        account.ok_or(StorageError::Conflict)
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(account)
    }

    async fn create_campaign(&self, owner_id: i64, name: &str) -> Result<Campaign> {
        let campaign = sqlx::query_as::<_, Campaign>(&format!(
            r#"
            INSERT INTO campaigns (owner_id, name, created_at, is_active, open_count)
            VALUES ($1, $2, $3, TRUE, 0)
            RETURNING {CAMPAIGN_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(name)
        .bind(now_unix())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(campaign)
    }

    async fn create_link(
        &self,
        owner_id: i64,
        name: &str,
        destination_url: &str,
    ) -> Result<TrackedLink> {
        let link = sqlx::query_as::<_, TrackedLink>(&format!(
            r#"
            INSERT INTO tracked_links (owner_id, name, destination_url, created_at, is_active, click_count)
            VALUES ($1, $2, $3, $4, TRUE, 0)
            RETURNING {LINK_COLUMNS}
            "#
        ))
        .bind(owner_id)
        .bind(name)
        .bind(destination_url)
        .bind(now_unix())
        .fetch_one(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn get_campaign(&self, id: i64) -> Result<Option<Campaign>> {
        let campaign = sqlx::query_as::<_, Campaign>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(campaign)
    }

    async fn get_link(&self, id: i64) -> Result<Option<TrackedLink>> {
        let link = sqlx::query_as::<_, TrackedLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM tracked_links WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(link)
    }

    async fn set_status(
        &self,
        kind: ResourceKind,
        id: i64,
        owner_id: i64,
        active: bool,
    ) -> Result<bool> {
        let result = sqlx::query(&format!(
            "UPDATE {} SET is_active = $1 WHERE id = $2 AND owner_id = $3",
            kind.table()
        ))
        .bind(active)
        .bind(id)
        .bind(owner_id)
        .execute(self.pool.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_campaigns(&self, owner_id: i64) -> Result<Vec<Campaign>> {
        let campaigns = sqlx::query_as::<_, Campaign>(&format!(
            "SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(campaigns)
    }

    async fn list_links(&self, owner_id: i64) -> Result<Vec<TrackedLink>> {
        let links = sqlx::query_as::<_, TrackedLink>(&format!(
            "SELECT {LINK_COLUMNS} FROM tracked_links WHERE owner_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(owner_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(links)
    }

    async fn list_open_events(
        &self,
        owner_id: i64,
        campaign_id: Option<i64>,
    ) -> Result<Vec<OpenEvent>> {
        let events = sqlx::query_as::<_, OpenEvent>(&format!(
            r#"
            SELECT {OPEN_EVENT_COLUMNS}
            FROM open_events
            WHERE owner_id = $1 AND ($2::BIGINT IS NULL OR campaign_id = $2)
            ORDER BY opened_at DESC, id DESC
            "#
        ))
        .bind(owner_id)
        .bind(campaign_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }

    async fn list_click_events(
        &self,
        owner_id: i64,
        link_id: Option<i64>,
    ) -> Result<Vec<ClickEvent>> {
        let events = sqlx::query_as::<_, ClickEvent>(&format!(
            r#"
            SELECT {CLICK_EVENT_COLUMNS}
            FROM click_events
            WHERE owner_id = $1 AND ($2::BIGINT IS NULL OR link_id = $2)
            ORDER BY clicked_at DESC, id DESC
            "#
        ))
        .bind(owner_id)
        .bind(link_id)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(events)
    }
}
