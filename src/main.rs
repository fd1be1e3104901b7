mod analysis;
mod cache;
mod candles;
mod config;
mod data_fetcher;
mod discovery;
mod filter_utils;
mod indicators;
mod market_analyzer;
mod notifier;
mod predictor;
mod report_table;
mod scheduler;
mod sector_scanner;
mod storage_utils;
mod watchlist;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::{MarketSelection, StockBot};
use crate::config::{AppConfig, resolve_webhook, webhook_is_configured};
use crate::storage_utils::AsyncStorageManager;
use crate::watchlist::{MarketId, Watchlist};

const CONFIG_FILE: &str = "config";
const WATCHLIST_FILE: &str = "stocks";
const WEBHOOK_ENV: &str = "STOCK_PULSE_WEBHOOK_URL";

#[derive(Parser)]
#[command(name = "stock-pulse")]
#[command(about = "Taiwan and US market analysis pushed to a Discord webhook", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding config.json, stocks.json and last_report.json
    /// (default: "storage" next to the executable)
    #[arg(long, global = true)]
    storage_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "stock_pulse=debug"; RUST_LOG wins when set
    #[arg(short, long, global = true, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the analysis once and send it to the webhook
    Run {
        #[arg(short = 'k', long, value_enum, default_value = "all")]
        market: MarketSelection,

        /// Webhook URL, overrides the environment and config.json
        #[arg(short, long)]
        webhook: Option<String>,

        /// Index analysis only
        #[arg(short, long)]
        quick: bool,

        #[arg(long)]
        no_discovery: bool,
    },

    /// Send daily reports on the market-close schedule
    Schedule {
        #[arg(short, long)]
        webhook: Option<String>,

        #[arg(long)]
        no_discovery: bool,
    },

    /// Print the analysis to the terminal without sending anything
    Print {
        #[arg(short = 'k', long, value_enum, default_value = "all")]
        market: MarketSelection,

        #[arg(long)]
        no_discovery: bool,
    },

    /// Short-horizon forecast for one symbol
    Predict {
        /// Ticker, e.g. 2330.TW or NVDA
        symbol: String,

        /// Display name (default: the provider's name)
        #[arg(long)]
        name: Option<String>,

        #[arg(long, default_value = "1 week")]
        horizon: String,

        /// Also post the forecast to the webhook
        #[arg(long)]
        send: bool,

        #[arg(short, long)]
        webhook: Option<String>,
    },

    /// Manage the watchlist in stocks.json
    #[command(subcommand)]
    Watchlist(WatchlistCommand),
}

#[derive(Subcommand)]
enum WatchlistCommand {
    /// Show indices, sectors and symbols
    List {
        #[arg(value_enum)]
        market: Option<MarketId>,
    },
    AddStock {
        #[arg(value_enum)]
        market: MarketId,
        sector: String,
        symbol: String,
    },
    RemoveStock {
        #[arg(value_enum)]
        market: MarketId,
        sector: String,
        symbol: String,
    },
    AddSector {
        #[arg(value_enum)]
        market: MarketId,
        name: String,
        symbols: Vec<String>,
    },
    RemoveSector {
        #[arg(value_enum)]
        market: MarketId,
        name: String,
    },
    /// Print the file location and its JSON
    Export,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn open_storage(dir: Option<PathBuf>) -> Result<AsyncStorageManager> {
    match dir {
        Some(dir) => AsyncStorageManager::new(dir).await,
        None => AsyncStorageManager::new_relative("storage").await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let storage = open_storage(cli.storage_dir).await?;
    let config: AppConfig = storage.load_or_init(CONFIG_FILE).await?;
    let mut watchlist: Watchlist = storage.load_or_init(WATCHLIST_FILE).await?;
    info!(storage = ?storage.base_dir, "configuration loaded");

    let env_webhook = std::env::var(WEBHOOK_ENV).ok();
    let webhook = |flag: Option<&str>| resolve_webhook(flag, env_webhook.as_deref(), &config.webhook_url);

    match cli.command {
        Commands::Run {
            market,
            webhook: flag,
            quick,
            no_discovery,
        } => {
            let url = webhook(flag.as_deref());
            if !webhook_is_configured(&url) {
                warn!("webhook url is not configured; use --webhook, {} or config.json", WEBHOOK_ENV);
            }
            // Quick mode never runs discovery.
            let bot = StockBot::new(config, watchlist, url, storage, !no_discovery && !quick)?;
            if quick {
                bot.send_quick_update(market).await;
            } else {
                bot.send_daily_report(market).await;
            }
        }
        Commands::Schedule {
            webhook: flag,
            no_discovery,
        } => {
            let url = webhook(flag.as_deref());
            if !webhook_is_configured(&url) {
                bail!("scheduled mode needs a webhook url (--webhook, {} or config.json)", WEBHOOK_ENV);
            }
            let bot = StockBot::new(config, watchlist, url, storage, !no_discovery)?;
            scheduler::run_scheduler(&bot).await?;
        }
        Commands::Print { market, no_discovery } => {
            let bot = StockBot::new(config, watchlist, String::new(), storage, !no_discovery)?;
            bot.print_analysis(market).await;
        }
        Commands::Predict {
            symbol,
            name,
            horizon,
            send,
            webhook: flag,
        } => {
            let url = webhook(flag.as_deref());
            let bot = StockBot::new(config, watchlist, url, storage, false)?;
            bot.predict(&symbol.trim().to_uppercase(), name.as_deref(), &horizon, send)
                .await?;
        }
        Commands::Watchlist(command) => {
            if manage_watchlist(command, &mut watchlist, &storage)? {
                storage.save(WATCHLIST_FILE, &watchlist).await?;
            }
        }
    }

    Ok(())
}

/// Applies a watchlist command; true when the list changed.
fn manage_watchlist(command: WatchlistCommand, watchlist: &mut Watchlist, storage: &AsyncStorageManager) -> Result<bool> {
    let changed = match command {
        WatchlistCommand::List { market } => {
            for id in [MarketId::Tw, MarketId::Us] {
                if market.is_none_or(|m| m == id) {
                    print_market(id, watchlist);
                }
            }
            false
        }
        WatchlistCommand::AddStock { market, sector, symbol } => {
            let added = watchlist.market_mut(market).add_stock(&sector, &symbol)?;
            if added {
                println!("✅ Added {} to {} / {}", symbol, market.key(), sector);
            } else {
                println!("❌ {} is already in {}", symbol, sector);
            }
            added
        }
        WatchlistCommand::RemoveStock { market, sector, symbol } => {
            let removed = watchlist.market_mut(market).remove_stock(&sector, &symbol)?;
            if removed {
                println!("✅ Removed {} from {}", symbol, sector);
            } else {
                println!("❌ {} was not found in {}", symbol, sector);
            }
            removed
        }
        WatchlistCommand::AddSector { market, name, symbols } => {
            let added = watchlist.market_mut(market).add_sector(&name, &symbols)?;
            if added {
                println!("✅ Added sector {} with {} symbols", name, symbols.len());
            } else {
                println!("❌ Sector {} already exists", name);
            }
            added
        }
        WatchlistCommand::RemoveSector { market, name } => {
            let removed = watchlist.market_mut(market).remove_sector(&name);
            if removed {
                println!("✅ Removed sector {}", name);
            } else {
                println!("❌ Sector {} was not found", name);
            }
            removed
        }
        WatchlistCommand::Export => {
            println!("Watchlist file: {:?}", storage.base_dir.join(format!("{}.json", WATCHLIST_FILE)));
            println!("{}", serde_json::to_string_pretty(&*watchlist)?);
            false
        }
    };
    Ok(changed)
}

fn print_market(id: MarketId, watchlist: &Watchlist) {
    let market = watchlist.market(id);
    println!("\n📊 {} ({})", market.name, id.key());
    println!("  Primary index: {}", market.primary_index);
    for index in &market.indices {
        println!("    - {}: {}", index.name, index.symbol);
    }
    for sector in &market.sectors {
        println!("\n  [{}] ({} symbols)", sector.name, sector.symbols.len());
        for symbol in &sector.symbols {
            println!("      {}", symbol);
        }
    }
}
