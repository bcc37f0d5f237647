//! ShortQuota CLI
//!
//! Drives the quota store against a JSON state file and replays recorded
//! page traces through the page monitor.

mod simulate;
mod store;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use sq_core::blockpage::{
    format_remaining, parse_limit_input, time_until_midnight, usage_level, BlockPageInfo, UsageLevel,
};
use sq_core::platform::{Clock, StateStorage, SystemClock, TabHost};
use sq_core::types::KNOWN_SITES;
use sq_core::{MonitorConfig, QuotaStore, TabId};

use store::{ConsoleTabs, FileStorage};

#[derive(Parser)]
#[command(name = "sq-cli")]
#[command(about = "ShortQuota quota store and detection tools")]
struct Cli {
    /// Quota state file
    #[arg(long, global = true, default_value = "shortquota-state.json")]
    state: PathBuf,

    /// Monitor settings file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show today's counters and limits
    Status,

    /// Count one view for a site
    Increment {
        #[arg(short, long)]
        site: String,

        /// Tab the view happened in; it is swapped for the block page at the limit
        #[arg(long)]
        tab: Option<TabId>,
    },

    /// Set the daily limit for one site
    SetLimit {
        #[arg(short, long)]
        site: String,

        #[arg(short, long)]
        limit: String,
    },

    /// Set the same daily limit for several sites
    SetAllLimits {
        #[arg(short, long)]
        limit: String,

        /// Sites to update (default: every site with a limit)
        #[arg(long, value_delimiter = ',')]
        sites: Vec<String>,
    },

    /// Zero today's counters
    Reset,

    /// Print what the block page would show for a site
    BlockPage {
        #[arg(short, long)]
        site: String,
    },

    /// Classify a page snapshot
    ContentId {
        /// Page snapshot file (JSON)
        #[arg(short, long, conflicts_with = "url")]
        page: Option<PathBuf>,

        /// Bare page URL
        #[arg(short, long)]
        url: Option<String>,

        /// Timestamp used for time-bucketed identifiers
        #[arg(long)]
        now_ms: Option<u64>,
    },

    /// Replay a recorded page trace against the state file
    Simulate {
        #[arg(short, long)]
        trace: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    env_logger::Builder::from_default_env()
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Warn
        })
        .init();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = load_config(cli.config.as_deref())?;
    let store = QuotaStore::new(FileStorage::new(&cli.state), ConsoleTabs::default(), SystemClock);

    match cli.command {
        Commands::Status => cmd_status(&store).await,
        Commands::Increment { site, tab } => cmd_increment(&store, &site, tab).await,
        Commands::SetLimit { site, limit } => cmd_set_limit(&store, &site, &limit).await,
        Commands::SetAllLimits { limit, sites } => cmd_set_all_limits(&store, sites, &limit).await,
        Commands::Reset => cmd_reset(&store).await,
        Commands::BlockPage { site } => cmd_block_page(&store, &site).await,
        Commands::ContentId { page, url, now_ms } => {
            simulate::cmd_content_id(page.as_deref(), url.as_deref(), now_ms)
        }
        Commands::Simulate { trace } => simulate::cmd_simulate(&cli.state, &trace, config).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<MonitorConfig, String> {
    let Some(path) = path else {
        return Ok(MonitorConfig::default());
    };
    let text = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;
    MonitorConfig::from_json(&text)
        .map_err(|e| format!("Invalid monitor settings in '{}': {}", path.display(), e))
}

async fn cmd_status<S, T, C>(store: &QuotaStore<S, T, C>) -> Result<(), String>
where
    S: StateStorage,
    T: TabHost,
    C: Clock,
{
    let status = store
        .get_status()
        .await
        .map_err(|e| format!("Failed to read status: {}", e))?;

    let sites: BTreeSet<&String> = status.limits.keys().chain(status.counter.keys()).collect();

    println!("Today ({}):", store.clock().today());
    for site in sites {
        let count = status.counter.get(site).copied().unwrap_or(0);
        let limit = status
            .limits
            .get(site)
            .copied()
            .unwrap_or(sq_core::types::FALLBACK_LIMIT);
        let marker = match usage_level(count, limit) {
            UsageLevel::Ok => "",
            UsageLevel::Near => "  (almost there)",
            UsageLevel::Exceeded => "  (limit reached)",
        };
        println!("  {:<16} {:>3} / {:<3}{}", site, count, limit, marker);
    }
    println!(
        "Counters reset in {}",
        format_remaining(time_until_midnight(store.clock().local_now()))
    );

    Ok(())
}

async fn cmd_increment<S, T, C>(store: &QuotaStore<S, T, C>, site: &str, tab: Option<TabId>) -> Result<(), String>
where
    S: StateStorage,
    T: TabHost,
    C: Clock,
{
    let reply = store
        .increment_counter(site, tab)
        .await
        .map_err(|e| format!("Failed to count view: {}", e))?;

    println!("{}: {} / {}", site, reply.today_counter, reply.limit);
    if reply.reached {
        println!("  Daily limit reached");
    } else if reply.one_left() {
        println!("  One view left today");
    }

    Ok(())
}

async fn cmd_set_limit<S, T, C>(store: &QuotaStore<S, T, C>, site: &str, input: &str) -> Result<(), String>
where
    S: StateStorage,
    T: TabHost,
    C: Clock,
{
    let limit = parse_limit_input(input).map_err(|e| e.to_string())?;
    let reply = store
        .set_limit(site, limit)
        .await
        .map_err(|e| format!("Failed to set limit: {}", e))?;

    println!("Limit for {} set to {}", reply.updated_site, reply.new_limit);
    Ok(())
}

async fn cmd_set_all_limits<S, T, C>(
    store: &QuotaStore<S, T, C>,
    mut sites: Vec<String>,
    input: &str,
) -> Result<(), String>
where
    S: StateStorage,
    T: TabHost,
    C: Clock,
{
    let limit = parse_limit_input(input).map_err(|e| e.to_string())?;

    if sites.is_empty() {
        let status = store
            .get_status()
            .await
            .map_err(|e| format!("Failed to read status: {}", e))?;
        sites = status.limits.into_keys().collect();
    }
    if sites.is_empty() {
        sites = KNOWN_SITES.iter().map(|s| s.domain.to_string()).collect();
    }

    let reply = store
        .set_all_limits(&sites, limit)
        .await
        .map_err(|e| format!("Failed to set limits: {}", e))?;

    println!(
        "Limit for {} set to {}",
        reply.updated_sites.join(", "),
        reply.new_limit
    );
    Ok(())
}

async fn cmd_reset<S, T, C>(store: &QuotaStore<S, T, C>) -> Result<(), String>
where
    S: StateStorage,
    T: TabHost,
    C: Clock,
{
    store
        .reset_counters()
        .await
        .map_err(|e| format!("Failed to reset counters: {}", e))?;
    println!("Counters reset");
    Ok(())
}

async fn cmd_block_page<S, T, C>(store: &QuotaStore<S, T, C>, site: &str) -> Result<(), String>
where
    S: StateStorage,
    T: TabHost,
    C: Clock,
{
    let status = store
        .get_status()
        .await
        .map_err(|e| format!("Failed to read status: {}", e))?;
    let info = BlockPageInfo::new(site, &status, store.clock().local_now());
    let text = serde_json::to_string_pretty(&info).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}
