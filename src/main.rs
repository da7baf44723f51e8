use anyhow::Context;
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use trak_sync::config::Config;
use trak_sync::logging;
use trak_sync::rcrainfo::ReqwestRcrainfo;
use trak_sync::search::{DateType, SearchFilters, SearchQueryBuilder, SearchSiteType};
use trak_sync::storage::{InMemoryStorage, Storage};
use trak_sync::SyncOrchestrator;

#[derive(Parser)]
#[command(name = "trak_sync")]
#[command(about = "Pull hazardous waste manifests from RCRAInfo")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull the listed manifests by tracking number
    Pull {
        /// Manifest tracking numbers, e.g. 123456789ELC
        #[arg(required = true)]
        mtns: Vec<String>,
    },
    /// Search RCRAInfo for manifest tracking numbers
    Search {
        /// EPA ID of the site
        #[arg(long)]
        site_id: Option<String>,
        /// Manifest status in RCRAInfo
        #[arg(long)]
        status: Option<String>,
        /// CertifiedDate|ReceivedDate|ShippedDate|UpdatedDate
        #[arg(long)]
        date_type: Option<DateType>,
        /// Two-letter state code
        #[arg(long)]
        state_code: Option<String>,
        /// Generator|Tsdf|Transporter|RejectionInfo_AlternateTsdf
        #[arg(long)]
        site_type: Option<SearchSiteType>,
        /// Window start (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start_date: Option<DateTime<Utc>>,
        /// Window end (RFC 3339 or YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        end_date: Option<DateTime<Utc>>,
        /// Also pull every manifest found
        #[arg(long)]
        pull: bool,
    },
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("'{}' is not an RFC 3339 timestamp or YYYY-MM-DD date", value))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    let _guard = logging::init_logging(&config.logging);

    let rcrainfo = Arc::new(ReqwestRcrainfo::new(&config.rcrainfo)?);
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let orchestrator = SyncOrchestrator::new(config.sync.username.clone(), rcrainfo, storage)
        .with_query_builder(SearchQueryBuilder::new(config.sync.search_window_days));

    match cli.command {
        Commands::Pull { mtns } => {
            info!("Pulling {} manifests", mtns.len());
            let results = orchestrator.pull_manifests(&mtns).await;
            println!("{}", serde_json::to_string_pretty(&results)?);
        }
        Commands::Search {
            site_id,
            status,
            date_type,
            state_code,
            site_type,
            start_date,
            end_date,
            pull,
        } => {
            let filters = SearchFilters {
                site_id,
                status,
                date_type,
                state_code,
                site_type,
                start_date,
                end_date,
            };
            if pull {
                match orchestrator.sync_site(&filters).await {
                    Ok(results) => println!("{}", serde_json::to_string_pretty(&results)?),
                    Err(e) => {
                        error!("Site sync failed: {}", e);
                        return Err(e.into());
                    }
                }
            } else {
                let tracking_numbers = orchestrator.search(&filters).await?;
                println!("{}", serde_json::to_string_pretty(&tracking_numbers)?);
            }
        }
    }
    Ok(())
}
