use anyhow::{anyhow, bail, Context, Result};
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use mailtrack::config::{Config, DatabaseBackend};
use mailtrack::dispatch::urls::{click_url, pixel_tag, pixel_url};
use mailtrack::models::{Account, GeoInfo, ResourceKind, ResourceStatus};
use mailtrack::storage::{PostgresStorage, SqliteStorage, Storage, StorageError};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "mailtrack-admin")]
#[command(about = "Mailtrack account, campaign and link management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Campaign,
    Link,
}

impl From<Kind> for ResourceKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Campaign => ResourceKind::Campaign,
            Kind::Link => ResourceKind::Link,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum EventKind {
    Opens,
    Clicks,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account and print its API key
    CreateAccount {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// Pre-computed password hash to store with the account
        #[arg(long)]
        password_hash: Option<String>,
    },
    /// Create an active campaign
    CreateCampaign {
        #[arg(long)]
        account_email: String,
        #[arg(long)]
        name: String,
    },
    /// Create an active tracked link
    CreateLink {
        #[arg(long)]
        account_email: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        url: String,
    },
    /// Activate or deactivate a campaign or link
    SetStatus {
        kind: Kind,
        id: i64,
        #[arg(long)]
        account_email: String,
        #[arg(long, action = clap::ArgAction::Set)]
        active: bool,
    },
    /// List campaigns and links with their counters
    List {
        #[arg(long)]
        account_email: String,
    },
    /// Show recorded events, newest first
    Events {
        kind: EventKind,
        #[arg(long)]
        account_email: String,
        /// Restrict to one campaign or link
        #[arg(long)]
        id: Option<i64>,
    },
    /// Print the pixel tag or tracked link to embed in an email
    Snippet {
        kind: Kind,
        id: i64,
        #[arg(long)]
        account_email: String,
        /// Public base URL of the tracking server
        #[arg(long)]
        base_url: String,
    },
}

async fn account_by_email(storage: &Arc<dyn Storage>, email: &str) -> Result<Account> {
    storage
        .find_account_by_email(email)
        .await?
        .ok_or_else(|| anyhow!("no account with email '{email}'"))
}

fn format_time(ts: i64) -> String {
    Utc.timestamp_opt(ts, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ts.to_string())
}

fn format_geo(geo: &GeoInfo) -> String {
    if geo.is_empty() {
        return "-".to_string();
    }
    [&geo.city, &geo.country_code, &geo.isp]
        .iter()
        .filter_map(|field| field.as_deref())
        .collect::<Vec<_>>()
        .join(" / ")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let storage: Arc<dyn Storage> = match config.database.backend {
        DatabaseBackend::Sqlite => Arc::new(
            SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
        DatabaseBackend::Postgres => Arc::new(
            PostgresStorage::new(&config.database.url, config.database.max_connections).await?,
        ),
    };

    // Ensure database is initialized
    storage.init().await?;

    match cli.command {
        Commands::CreateAccount {
            name,
            email,
            password_hash,
        } => match storage
            .create_account(&name, &email, password_hash.as_deref())
            .await
        {
            Ok(account) => {
                println!("✓ Created account {} for '{}'", account.id, account.email);
                println!("  API key: {}", account.api_key);
            }
            Err(StorageError::Conflict) => bail!("email address '{email}' is already in use"),
            Err(StorageError::Other(err)) => return Err(err.context("failed to create account")),
        },
        Commands::CreateCampaign {
            account_email,
            name,
        } => {
            let account = account_by_email(&storage, &account_email).await?;
            let campaign = storage.create_campaign(account.id, &name).await?;
            println!("✓ Created campaign {} '{}'", campaign.id, campaign.name);
        }
        Commands::CreateLink {
            account_email,
            name,
            url,
        } => {
            reqwest::Url::parse(&url).with_context(|| format!("invalid destination URL '{url}'"))?;
            let account = account_by_email(&storage, &account_email).await?;
            let link = storage.create_link(account.id, &name, &url).await?;
            println!(
                "✓ Created link {} '{}' -> {}",
                link.id, link.name, link.destination_url
            );
        }
        Commands::SetStatus {
            kind,
            id,
            account_email,
            active,
        } => {
            let kind = ResourceKind::from(kind);
            let account = account_by_email(&storage, &account_email).await?;
            if storage.set_status(kind, id, account.id, active).await? {
                println!("✓ {} {} is now {}", kind, id, ResourceStatus::from(active));
            } else {
                println!("⚠ {} {} not found for '{}'", kind, id, account.email);
            }
        }
        Commands::List { account_email } => {
            let account = account_by_email(&storage, &account_email).await?;

            let campaigns = storage.list_campaigns(account.id).await?;
            println!("Campaigns:");
            println!("{:<8} {:<32} {:<10} {:>8}", "ID", "Name", "Status", "Opens");
            println!("{}", "-".repeat(62));
            for c in campaigns {
                println!(
                    "{:<8} {:<32} {:<10} {:>8}",
                    c.id,
                    c.name,
                    c.status().to_string(),
                    c.open_count
                );
            }

            let links = storage.list_links(account.id).await?;
            println!();
            println!("Links:");
            println!(
                "{:<8} {:<24} {:<10} {:>8}  {}",
                "ID", "Name", "Status", "Clicks", "Destination"
            );
            println!("{}", "-".repeat(80));
            for l in links {
                println!(
                    "{:<8} {:<24} {:<10} {:>8}  {}",
                    l.id,
                    l.name,
                    l.status().to_string(),
                    l.click_count,
                    l.destination_url
                );
            }
        }
        Commands::Events {
            kind,
            account_email,
            id,
        } => {
            let account = account_by_email(&storage, &account_email).await?;
            match kind {
                EventKind::Opens => {
                    let events = storage.list_open_events(account.id, id).await?;
                    if events.is_empty() {
                        println!("No open events found.");
                    }
                    for e in events {
                        println!(
                            "{}  campaign {:<6} {:<40} {}",
                            format_time(e.opened_at),
                            e.campaign_id,
                            e.ip,
                            format_geo(&e.geo_info)
                        );
                    }
                }
                EventKind::Clicks => {
                    let events = storage.list_click_events(account.id, id).await?;
                    if events.is_empty() {
                        println!("No click events found.");
                    }
                    for e in events {
                        println!(
                            "{}  link {:<6} {:<40} {}  {}",
                            format_time(e.clicked_at),
                            e.link_id,
                            e.ip,
                            format_geo(&e.geo_info),
                            e.destination_url
                        );
                    }
                }
            }
        }
        Commands::Snippet {
            kind,
            id,
            account_email,
            base_url,
        } => {
            let account = account_by_email(&storage, &account_email).await?;
            match ResourceKind::from(kind) {
                ResourceKind::Campaign => {
                    storage
                        .get_campaign(id)
                        .await?
                        .filter(|c| c.owner_id == account.id)
                        .ok_or_else(|| anyhow!("campaign {id} not found for '{account_email}'"))?;
                    let url = pixel_url(&base_url, &account.api_key, id)?;
                    println!("{}", pixel_tag(&url));
                }
                ResourceKind::Link => {
                    let link = storage
                        .get_link(id)
                        .await?
                        .filter(|l| l.owner_id == account.id)
                        .ok_or_else(|| anyhow!("link {id} not found for '{account_email}'"))?;
                    let url = click_url(&base_url, &account.api_key, id, &link.destination_url)?;
                    println!("{}", url);
                }
            }
        }
    }

    Ok(())
}
