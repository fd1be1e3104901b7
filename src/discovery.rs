//! Movers outside the watchlist: a fixed Taiwan universe and the US
//! "most active" / "day gainers" screeners.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::DiscoveryConfig;
use crate::data_fetcher::DataFetcher;
use crate::filter_utils::MomentumFilter;
use crate::sector_scanner::{SectorScanner, StockAnalysis, by_strength_desc};
use crate::watchlist::{MarketId, Watchlist};

pub const DISCOVERY_LABEL: &str = "Discovery";
const US_SCREENERS: [&str; 2] = ["most_actives", "day_gainers"];
const SCREENER_COUNT: usize = 25;

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Discoveries {
    pub tw: Vec<StockAnalysis>,
    pub us: Vec<StockAnalysis>,
}

impl Discoveries {
    pub fn is_empty(&self) -> bool {
        self.tw.is_empty() && self.us.is_empty()
    }

    pub fn get(&self, market: MarketId) -> &[StockAnalysis] {
        match market {
            MarketId::Tw => &self.tw,
            MarketId::Us => &self.us,
        }
    }
}

/// Universe members not already on the watchlist, in universe order.
pub fn tw_candidates(universe: &[String], watchlist: &BTreeSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    universe
        .iter()
        .filter(|s| !watchlist.contains(*s) && seen.insert(s.as_str()))
        .cloned()
        .collect()
}

/// Screener results merged in order, deduplicated, minus the watchlist,
/// capped at `limit`.
pub fn us_candidates(screens: &[Vec<String>], watchlist: &BTreeSet<String>, limit: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    screens
        .iter()
        .flatten()
        .filter(|s| !s.is_empty() && !watchlist.contains(*s) && seen.insert(s.as_str()))
        .take(limit)
        .cloned()
        .collect()
}

/// Positive-strength results, strongest first, at most `limit`.
pub fn rank_candidates(mut results: Vec<StockAnalysis>, limit: usize) -> Vec<StockAnalysis> {
    results.retain(|s| s.strength_score > 0.0);
    results.sort_by(by_strength_desc);
    results.truncate(limit);
    results
}

pub struct StockDiscovery {
    fetcher: Arc<DataFetcher>,
    scanner: Arc<SectorScanner>,
    config: DiscoveryConfig,
}

impl StockDiscovery {
    pub fn new(fetcher: Arc<DataFetcher>, scanner: Arc<SectorScanner>, config: DiscoveryConfig) -> Self {
        Self {
            fetcher,
            scanner,
            config,
        }
    }

    /// One symbol at a time with `fetch_delay_ms` between requests to stay
    /// under the provider's rate limit.
    async fn analyze_candidates(&self, symbols: &[String], limit: usize) -> Vec<StockAnalysis> {
        let delay = Duration::from_millis(self.config.fetch_delay_ms);
        let mut results = Vec::new();

        for (i, symbol) in symbols.iter().enumerate() {
            if let Some(analysis) = self.scanner.analyze_stock(symbol, DISCOVERY_LABEL).await {
                results.push(analysis);
            }
            if i + 1 < symbols.len() && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        rank_candidates(results, limit)
    }

    pub async fn discover_tw_movers(&self, watchlist: &Watchlist) -> Vec<StockAnalysis> {
        let candidates = tw_candidates(&self.config.tw_universe, &watchlist.tw.symbols());
        if candidates.is_empty() {
            warn!("no Taiwan discovery candidates outside the watchlist");
            return Vec::new();
        }
        info!(candidates = candidates.len(), "discovering Taiwan movers");

        let ranked = self.analyze_candidates(&candidates, self.config.top_n * 2).await;
        let filter = MomentumFilter {
            min_volume_ratio: self.config.min_volume_ratio,
            fallback_volume_ratio: self.config.fallback_volume_ratio,
            min_results: self.config.min_results,
        };

        let mut movers = filter.apply(&ranked);
        movers.truncate(self.config.top_n);
        movers
    }

    pub async fn discover_us_movers(&self, watchlist: &Watchlist) -> Vec<StockAnalysis> {
        let mut screens = Vec::with_capacity(US_SCREENERS.len());
        for screener in US_SCREENERS {
            match self.fetcher.screener(screener, SCREENER_COUNT).await {
                Ok(symbols) => screens.push(symbols),
                Err(e) => warn!(screener, error = %e, "screener failed"),
            }
        }

        let candidates = us_candidates(&screens, &watchlist.us.symbols(), self.config.top_n * 2);
        if candidates.is_empty() {
            warn!("no US discovery candidates");
            return Vec::new();
        }
        info!(candidates = candidates.len(), "discovering US movers");

        self.analyze_candidates(&candidates, self.config.top_n).await
    }

    /// `None` covers both markets.
    pub async fn discover(&self, market: Option<MarketId>, watchlist: &Watchlist) -> Discoveries {
        let mut discoveries = Discoveries::default();
        if market.is_none_or(|m| m == MarketId::Tw) {
            discoveries.tw = self.discover_tw_movers(watchlist).await;
        }
        if market.is_none_or(|m| m == MarketId::Us) {
            discoveries.us = self.discover_us_movers(watchlist).await;
        }
        discoveries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector_scanner::tests::stock;

    fn set(symbols: &[&str]) -> BTreeSet<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    fn strings(symbols: &[&str]) -> Vec<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn tw_candidates_skip_watchlist() {
        let universe = strings(&["2344.TW", "2330.TW", "3034.TW", "2344.TW"]);
        let candidates = tw_candidates(&universe, &set(&["2330.TW"]));
        assert_eq!(candidates, strings(&["2344.TW", "3034.TW"]));
    }

    #[test]
    fn us_candidates_merge_in_order_and_cap() {
        let screens = vec![
            strings(&["NVDA", "PLTR", "SOFI", ""]),
            strings(&["SOFI", "RIVN", "AAPL", "LCID"]),
        ];
        let watchlist = set(&["NVDA", "AAPL"]);
        assert_eq!(us_candidates(&screens, &watchlist, 10), strings(&["PLTR", "SOFI", "RIVN", "LCID"]));
        assert_eq!(us_candidates(&screens, &watchlist, 2), strings(&["PLTR", "SOFI"]));
        assert!(us_candidates(&[], &watchlist, 10).is_empty());
    }

    #[test]
    fn ranking_drops_zero_strength() {
        let results = vec![stock("A", 40.0, false), stock("B", 0.0, false), stock("C", 75.0, true), stock("D", 55.0, false)];
        let ranked: Vec<String> = rank_candidates(results, 2).into_iter().map(|s| s.symbol).collect();
        assert_eq!(ranked, vec!["C", "D"]);
    }

    #[test]
    fn discoveries_by_market() {
        let discoveries = Discoveries {
            tw: vec![stock("2344.TW", 50.0, false)],
            us: Vec::new(),
        };
        assert!(!discoveries.is_empty());
        assert_eq!(discoveries.get(MarketId::Tw).len(), 1);
        assert!(discoveries.get(MarketId::Us).is_empty());
        assert!(Discoveries::default().is_empty());
    }
}
