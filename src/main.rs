//! search-governor command line.
//!
//! ```text
//! search-governor [--config governor.toml] search --resource projects \
//!     --criteria '{"fiscal_years":[2024]}' --offset 0 --limit 50
//! search-governor get --resource projects --criteria '{"project_nums":["5R01AI000001-02"]}'
//! search-governor config
//! ```
//!
//! Responses and error reports are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::Value;

use search_governor::config::{load_config_or_default, GovernorConfig};
use search_governor::observability::{init_logging, metrics};
use search_governor::{
    GovernorError, HttpTransport, RequestGovernor, Resource, RetryPolicy, SearchRequest,
};

#[derive(Parser)]
#[command(name = "search-governor")]
#[command(about = "Rate-limited, cached, retrying client for the search API", long_about = None)]
struct Cli {
    /// TOML configuration file. Environment overrides apply either way.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one search and print the response
    Search {
        #[arg(short, long, value_enum)]
        resource: Resource,

        /// Search criteria as a JSON object
        #[arg(long, default_value = "{}")]
        criteria: String,

        #[arg(long)]
        offset: Option<u64>,

        #[arg(long)]
        limit: Option<u64>,
    },
    /// Fetch the first record matching the criteria
    Get {
        #[arg(short, long, value_enum)]
        resource: Resource,

        /// Search criteria as a JSON object
        #[arg(long)]
        criteria: String,
    },
    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config_or_default(cli.config.as_deref())?;

    init_logging(&config.observability)?;
    tracing::info!("search-governor v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        if let Ok(addr) = config.observability.metrics_address.parse() {
            metrics::init_metrics(addr);
        } else {
            tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    match cli.command {
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Search {
            resource,
            criteria,
            offset,
            limit,
        } => {
            let mut request = SearchRequest::new(resource, parse_criteria(&criteria)?);
            request.offset = offset;
            request.limit = limit;

            let governor = build_governor(&config)?;
            let result = governor.execute(&request, &RetryPolicy::from_config(&config.retries)).await;
            report(result)
        }
        Commands::Get { resource, criteria } => {
            let governor = build_governor(&config)?;
            let result = governor
                .fetch_one(resource, parse_criteria(&criteria)?, &RetryPolicy::from_config(&config.retries))
                .await;
            report(result)
        }
    }
}

fn build_governor(config: &GovernorConfig) -> Result<RequestGovernor<HttpTransport>, Box<dyn std::error::Error>> {
    let transport = HttpTransport::new(&config.api)?;
    tracing::info!(base_url = %transport.base_url(), "Using search API");
    Ok(RequestGovernor::new(config, transport)?)
}

fn parse_criteria(raw: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let criteria: Value = serde_json::from_str(raw)?;
    if !criteria.is_object() {
        return Err("criteria must be a JSON object".into());
    }
    Ok(criteria)
}

fn report(result: Result<Value, GovernorError>) -> Result<ExitCode, Box<dyn std::error::Error>> {
    match result {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response)?);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e.report())?);
            Ok(ExitCode::FAILURE)
        }
    }
}
