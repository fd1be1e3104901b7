//! This module contains the core analysis pipeline: index and sector scans per
//! market, outlooks, discovery and report delivery.

use anyhow::{Result, bail};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::data_fetcher::DataFetcher;
use crate::discovery::{Discoveries, StockDiscovery};
use crate::market_analyzer::{MarketAnalysis, MarketAnalyzer};
use crate::notifier::{self, DailyReport, DiscordNotifier, MarketSection};
use crate::predictor::{self, MarketOutlook, PricePrediction, TrendPredictor};
use crate::report_table;
use crate::sector_scanner::{self, SectorAnalysis, SectorScanner, StockAnalysis, by_strength_desc};
use crate::storage_utils::AsyncStorageManager;
use crate::watchlist::{MarketId, Watchlist};

const TOP_STOCKS_PER_MARKET: usize = 5;
const TOP_STOCKS_IN_REPORT: usize = 10;
const PRINTED_MOVERS: usize = 5;
pub const LAST_REPORT_FILE: &str = "last_report";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum MarketSelection {
    Tw,
    Us,
    All,
}

impl MarketSelection {
    pub fn includes(self, market: MarketId) -> bool {
        match self {
            MarketSelection::All => true,
            MarketSelection::Tw => market == MarketId::Tw,
            MarketSelection::Us => market == MarketId::Us,
        }
    }

    /// `None` for both markets.
    pub fn single(self) -> Option<MarketId> {
        match self {
            MarketSelection::Tw => Some(MarketId::Tw),
            MarketSelection::Us => Some(MarketId::Us),
            MarketSelection::All => None,
        }
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct MarketReport {
    pub market: MarketId,
    pub name: String,
    pub indices: Vec<MarketAnalysis>,
    pub sectors: Vec<SectorAnalysis>,
    /// Only when the primary index could be analyzed.
    pub outlook: Option<MarketOutlook>,
    pub top_stocks: Vec<StockAnalysis>,
    pub buy_signals: Vec<StockAnalysis>,
}

impl MarketReport {
    pub fn has_data(&self) -> bool {
        !self.indices.is_empty() || self.sectors.iter().any(|s| s.stock_count > 0)
    }
}

#[derive(Serialize, Debug, Clone)]
pub struct AnalysisRun {
    pub tw: Option<MarketReport>,
    pub us: Option<MarketReport>,
    pub discoveries: Discoveries,
    pub generated_at: DateTime<FixedOffset>,
}

impl AnalysisRun {
    pub fn reports(&self) -> impl Iterator<Item = &MarketReport> {
        self.tw.iter().chain(self.us.iter())
    }

    /// Top stocks of every analyzed market, strongest first.
    pub fn merged_top_stocks(&self, limit: usize) -> Vec<StockAnalysis> {
        let mut stocks: Vec<StockAnalysis> = self.reports().flat_map(|r| r.top_stocks.iter().cloned()).collect();
        stocks.sort_by(by_strength_desc);
        stocks.truncate(limit);
        stocks
    }
}

pub struct StockBot {
    config: AppConfig,
    watchlist: Watchlist,
    offset: FixedOffset,
    fetcher: Arc<DataFetcher>,
    analyzer: MarketAnalyzer,
    scanner: Arc<SectorScanner>,
    predictor: TrendPredictor,
    discovery: StockDiscovery,
    notifier: DiscordNotifier,
    storage: AsyncStorageManager,
    discovery_enabled: bool,
}

impl StockBot {
    pub fn new(
        config: AppConfig,
        watchlist: Watchlist,
        webhook_url: String,
        storage: AsyncStorageManager,
        discovery_enabled: bool,
    ) -> Result<Self> {
        let offset = config.offset()?;
        let fetcher = Arc::new(DataFetcher::new(&config.fetch)?);
        let period = config.fetch.period.clone();

        let analyzer = MarketAnalyzer::new(Arc::clone(&fetcher), config.technical.clone(), period.clone());
        let scanner = Arc::new(SectorScanner::new(Arc::clone(&fetcher), config.technical.clone(), period));
        let predictor = TrendPredictor::new(
            Arc::clone(&fetcher),
            config.technical.clone(),
            config.fetch.prediction_period.clone(),
        );
        let discovery = StockDiscovery::new(Arc::clone(&fetcher), Arc::clone(&scanner), config.discovery.clone());
        let notifier = DiscordNotifier::new(webhook_url)?;

        info!(discovery = discovery_enabled, "stock bot initialized");
        Ok(Self {
            discovery_enabled: discovery_enabled && config.discovery.enabled,
            config,
            watchlist,
            offset,
            fetcher,
            analyzer,
            scanner,
            predictor,
            discovery,
            notifier,
            storage,
        })
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }

    pub fn notifier(&self) -> &DiscordNotifier {
        &self.notifier
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn analyze_market(&self, market: MarketId) -> MarketReport {
        let config = self.watchlist.market(market);
        info!(market = market.key(), "analyzing market");

        let indices = self.analyzer.analyze_indices(config).await;
        let sectors = self.scanner.scan_all_sectors(&config.sectors).await;

        let primary = indices.iter().find(|i| i.symbol == config.primary_index);
        let outlook = primary.map(|index| predictor::market_outlook(&config.name, Some(index), &sectors));

        MarketReport {
            market,
            name: config.name.clone(),
            top_stocks: sector_scanner::top_stocks(&sectors, TOP_STOCKS_PER_MARKET),
            buy_signals: sector_scanner::buy_signals(&sectors),
            indices,
            sectors,
            outlook,
        }
    }

    pub async fn run_analysis(&self, selection: MarketSelection) -> AnalysisRun {
        // Each run starts from fresh quotes.
        self.fetcher.clear_cache();

        let tw = if selection.includes(MarketId::Tw) {
            Some(self.analyze_market(MarketId::Tw).await)
        } else {
            None
        };
        let us = if selection.includes(MarketId::Us) {
            Some(self.analyze_market(MarketId::Us).await)
        } else {
            None
        };

        let discoveries = if self.discovery_enabled {
            self.discovery.discover(selection.single(), &self.watchlist).await
        } else {
            Discoveries::default()
        };

        AnalysisRun {
            tw,
            us,
            discoveries,
            generated_at: self.now(),
        }
    }

    async fn build_and_send_report(&self, selection: MarketSelection) -> Result<()> {
        let run = self.run_analysis(selection).await;
        if !run.reports().any(MarketReport::has_data) {
            bail!("no market data could be retrieved");
        }

        let top_stocks = run.merged_top_stocks(TOP_STOCKS_IN_REPORT);
        let report = DailyReport {
            markets: run
                .reports()
                .map(|r| MarketSection {
                    name: &r.name,
                    indices: &r.indices,
                    sectors: &r.sectors,
                    outlook: r.outlook.as_ref(),
                })
                .collect(),
            top_stocks: &top_stocks,
        };
        self.notifier.send_daily_report(&report, run.generated_at).await;

        if !run.discoveries.is_empty() {
            let radar = notifier::discovery_embeds(
                &[run.discoveries.tw.as_slice(), run.discoveries.us.as_slice()],
                run.generated_at,
            );
            self.notifier.send_embeds(radar).await;
        }

        // Sent already, so a failed snapshot only warns.
        if let Err(e) = self.storage.save(LAST_REPORT_FILE, &run).await {
            warn!(error = %e, "could not store the last report snapshot");
        }
        Ok(())
    }

    /// Full report to the webhook. Failures are reported to the channel
    /// instead of being returned.
    pub async fn send_daily_report(&self, selection: MarketSelection) {
        info!(?selection, "generating daily report");
        match self.build_and_send_report(selection).await {
            Ok(()) => info!("daily report sent"),
            Err(e) => {
                error!(error = %e, "daily report failed");
                self.notifier
                    .send_text(format!("⚠️ Report generation failed: {}", e))
                    .await;
            }
        }
    }

    /// Index analyses only.
    pub async fn send_quick_update(&self, selection: MarketSelection) {
        info!(?selection, "sending quick update");
        self.fetcher.clear_cache();
        let generated_at = self.now();

        for market in [MarketId::Tw, MarketId::Us] {
            if !selection.includes(market) {
                continue;
            }
            let config = self.watchlist.market(market);
            let indices = self.analyzer.analyze_indices(config).await;
            if indices.is_empty() {
                continue;
            }
            let embeds = notifier::market_analysis_embeds(&indices, &config.name, generated_at);
            self.notifier.send_embeds(embeds).await;
        }
    }

    /// Analysis rendered as terminal tables; nothing is sent.
    pub async fn print_analysis(&self, selection: MarketSelection) {
        let run = self.run_analysis(selection).await;

        for report in run.reports() {
            println!("{}", report_table::heading(&format!("{} market", report.name), run.generated_at));
            if !report.indices.is_empty() {
                println!("{}", report_table::indices_table(&report.indices));
            }
            if !report.sectors.is_empty() {
                println!("\nSector ranking\n{}", report_table::sector_table(&report.sectors));
            }
            if let Some(outlook) = &report.outlook {
                println!("\nMarket outlook\n{}", report_table::outlook_table(outlook));
            }
            if !report.top_stocks.is_empty() {
                println!("\nStrongest stocks\n{}", report_table::stock_table(&report.top_stocks));
            }
        }

        for market in [MarketId::Tw, MarketId::Us] {
            let movers = run.discoveries.get(market);
            if movers.is_empty() {
                continue;
            }
            let name = &self.watchlist.market(market).name;
            let shown = &movers[..movers.len().min(PRINTED_MOVERS)];
            println!("\n📡 Market radar: {}\n{}", name, report_table::stock_table(shown));
        }
    }

    /// Forecast for one symbol, printed and optionally posted.
    pub async fn predict(&self, symbol: &str, name: Option<&str>, horizon: &str, send: bool) -> Result<PricePrediction> {
        // Index symbols keep their configured display name.
        let name = name.or_else(|| {
            [MarketId::Tw, MarketId::Us]
                .into_iter()
                .find_map(|m| self.watchlist.market(m).index(symbol))
                .map(|index| index.name.as_str())
        });
        let Some(prediction) = self.predictor.predict_stock(symbol, name, horizon).await else {
            bail!("could not build a prediction for {}", symbol);
        };

        println!(
            "{}",
            report_table::heading(&format!("{} ({})", prediction.name, prediction.symbol), self.now())
        );
        println!("{}", report_table::prediction_table(&prediction));

        if send {
            self.notifier.send_embeds(vec![notifier::prediction_embed(&prediction)]).await;
        }
        Ok(prediction)
    }
}
