//! Per-stock strength scoring and buy signals, rolled up into sector rankings.

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::candles::PriceHistory;
use crate::config::TechnicalParams;
use crate::data_fetcher::DataFetcher;
use crate::indicators;
use crate::market_analyzer::{TrendDirection, TrendInputs, determine_trend};
use crate::watchlist::SectorConfig;

const TOP_STOCKS_PER_SECTOR: usize = 5;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StockAnalysis {
    pub symbol: String,
    pub name: String,
    pub sector: String,
    pub current_price: f64,
    pub price_change_pct: f64,
    pub volume_ratio: f64,
    pub rsi: f64,
    pub trend: TrendDirection,
    pub trend_score: i32,
    /// 0 ..= 100
    pub strength_score: f64,
    pub buy_signal: bool,
    pub note: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SectorAnalysis {
    pub name: String,
    pub avg_change_pct: f64,
    pub strength_score: f64,
    pub trend: TrendDirection,
    pub top_stocks: Vec<StockAnalysis>,
    pub stock_count: usize,
    pub bullish_count: usize,
}

pub(crate) fn by_strength_desc(a: &StockAnalysis, b: &StockAnalysis) -> Ordering {
    b.strength_score
        .partial_cmp(&a.strength_score)
        .unwrap_or(Ordering::Equal)
}

pub fn strength_score(
    price_change_pct: f64,
    volume_ratio: f64,
    rsi: f64,
    trend_score: i32,
    current_price: f64,
    sma_medium: f64,
) -> f64 {
    let mut score = 50.0;

    score += (price_change_pct * 4.0).clamp(-20.0, 20.0);

    if volume_ratio > 1.0 {
        score += ((volume_ratio - 1.0) * 10.0).min(15.0);
    }

    score += if (40.0..=70.0).contains(&rsi) {
        10.0
    } else if rsi > 70.0 {
        5.0
    } else {
        -5.0
    };

    score += trend_score as f64 * 0.15;

    score += if current_price > sma_medium { 10.0 } else { -5.0 };

    score.clamp(0.0, 100.0)
}

/// At least three of five entry conditions must hold.
pub fn buy_signal(
    current_price: f64,
    sma_short: f64,
    sma_medium: f64,
    rsi: f64,
    macd_histogram: f64,
    volume_ratio: f64,
    price_change_pct: f64,
) -> bool {
    let checks = [
        current_price > sma_short && sma_short > sma_medium,
        (40.0..=70.0).contains(&rsi),
        macd_histogram > 0.0,
        volume_ratio > 1.2,
        // avoid chasing
        (1.0..=7.0).contains(&price_change_pct),
    ];
    checks.iter().filter(|&&hit| hit).count() >= 3
}

pub fn stock_note(
    price_change_pct: f64,
    volume_ratio: f64,
    rsi: f64,
    trend: TrendDirection,
    buy_signal: bool,
) -> String {
    let mut notes = Vec::new();

    if buy_signal {
        notes.push("✅ Buy setup".to_string());
    }

    if price_change_pct > 3.0 {
        notes.push(format!("🔥 Strong rally {:.1}%", price_change_pct));
    } else if price_change_pct > 0.0 {
        notes.push("📈 Mild gain".to_string());
    }

    if volume_ratio > 2.0 {
        notes.push(format!("📊 Volume surge {:.1}x", volume_ratio));
    } else if volume_ratio > 1.5 {
        notes.push("📊 Volume up".to_string());
    }

    if rsi > 70.0 {
        notes.push("⚠️ RSI overheated".to_string());
    } else if rsi < 30.0 {
        notes.push("💡 RSI oversold".to_string());
    }

    if notes.is_empty() {
        trend.label().to_string()
    } else {
        notes.join(" | ")
    }
}

pub fn analyze_stock_history(history: &PriceHistory, sector: &str, params: &TechnicalParams) -> Option<StockAnalysis> {
    let closes = history.closes();
    if closes.len() < params.sma_medium.max(2) {
        return None;
    }

    let current_price = closes[closes.len() - 1];
    let prev_price = closes[closes.len() - 2];
    let price_change_pct = if prev_price != 0.0 {
        (current_price - prev_price) / prev_price * 100.0
    } else {
        0.0
    };

    // Younger listings get a shorter long average.
    let long_window = params.sma_long.min(closes.len() - 1);

    let sma_short = indicators::sma(&closes, params.sma_short)?;
    let sma_medium = indicators::sma(&closes, params.sma_medium)?;
    let sma_long = indicators::sma(&closes, long_window)?;
    let rsi = indicators::rsi(&closes, params.rsi_period)?;
    let macd = indicators::macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal)?;
    let volume_ratio = indicators::volume_ratio(&history.candles, params.volume_ma);

    let (trend, trend_score) = determine_trend(
        &TrendInputs {
            price: current_price,
            sma_short,
            sma_medium,
            sma_long,
            rsi,
            macd_histogram: macd.histogram,
            price_change_pct,
        },
        params,
    );

    let strength = strength_score(price_change_pct, volume_ratio, rsi, trend_score, current_price, sma_medium);
    let signal = buy_signal(
        current_price,
        sma_short,
        sma_medium,
        rsi,
        macd.histogram,
        volume_ratio,
        price_change_pct,
    );
    let note = stock_note(price_change_pct, volume_ratio, rsi, trend, signal);

    Some(StockAnalysis {
        symbol: history.symbol.clone(),
        name: history.name.clone(),
        sector: sector.to_string(),
        current_price,
        price_change_pct,
        volume_ratio,
        rsi,
        trend,
        trend_score,
        strength_score: strength,
        buy_signal: signal,
        note,
    })
}

/// Sector statistics and its five strongest members.
pub fn summarize_sector(name: &str, mut stocks: Vec<StockAnalysis>) -> SectorAnalysis {
    if stocks.is_empty() {
        return SectorAnalysis {
            name: name.to_string(),
            avg_change_pct: 0.0,
            strength_score: 0.0,
            trend: TrendDirection::Neutral,
            top_stocks: Vec::new(),
            stock_count: 0,
            bullish_count: 0,
        };
    }

    let count = stocks.len() as f64;
    let avg_change_pct = stocks.iter().map(|s| s.price_change_pct).sum::<f64>() / count;
    let strength = stocks.iter().map(|s| s.strength_score).sum::<f64>() / count;
    let bullish_count = stocks.iter().filter(|s| s.trend_score > 0).count();

    let trend = if strength >= 70.0 {
        TrendDirection::StrongBullish
    } else if strength >= 55.0 {
        TrendDirection::Bullish
    } else if strength <= 30.0 {
        TrendDirection::StrongBearish
    } else if strength <= 45.0 {
        TrendDirection::Bearish
    } else {
        TrendDirection::Neutral
    };

    let stock_count = stocks.len();
    stocks.sort_by(by_strength_desc);
    stocks.truncate(TOP_STOCKS_PER_SECTOR);

    SectorAnalysis {
        name: name.to_string(),
        avg_change_pct,
        strength_score: strength,
        trend,
        top_stocks: stocks,
        stock_count,
        bullish_count,
    }
}

/// Strongest stocks across sectors, one entry per symbol.
pub fn top_stocks(sectors: &[SectorAnalysis], top_n: usize) -> Vec<StockAnalysis> {
    let mut all: Vec<&StockAnalysis> = sectors.iter().flat_map(|s| s.top_stocks.iter()).collect();
    all.sort_by(|a, b| by_strength_desc(a, b));

    let mut seen = HashSet::new();
    all.into_iter()
        .filter(|s| seen.insert(s.symbol.as_str()))
        .take(top_n)
        .cloned()
        .collect()
}

/// Buy setups among each sector's top stocks, strongest first.
pub fn buy_signals(sectors: &[SectorAnalysis]) -> Vec<StockAnalysis> {
    let mut stocks: Vec<StockAnalysis> = sectors
        .iter()
        .flat_map(|s| s.top_stocks.iter())
        .filter(|s| s.buy_signal)
        .cloned()
        .collect();
    stocks.sort_by(by_strength_desc);
    stocks
}

pub struct SectorScanner {
    fetcher: Arc<DataFetcher>,
    params: TechnicalParams,
    period: String,
}

impl SectorScanner {
    pub fn new(fetcher: Arc<DataFetcher>, params: TechnicalParams, period: String) -> Self {
        Self { fetcher, params, period }
    }

    pub async fn analyze_stock(&self, symbol: &str, sector: &str) -> Option<StockAnalysis> {
        let history = match self.fetcher.get_history(symbol, &self.period).await {
            Ok(history) => history,
            Err(e) => {
                warn!(symbol, error = %e, "stock data unavailable");
                return None;
            }
        };

        let analysis = analyze_stock_history(&history, sector, &self.params);
        if analysis.is_none() {
            debug!(symbol, bars = history.len(), "not enough data to analyze stock");
        }
        analysis
    }

    /// Analyzes a sector's symbols with a bounded number in flight.
    pub async fn scan_sector(&self, sector: &SectorConfig) -> SectorAnalysis {
        let stocks: Vec<StockAnalysis> = futures::stream::iter(&sector.symbols)
            .map(|symbol| self.analyze_stock(symbol, &sector.name))
            .buffer_unordered(self.fetcher.max_workers())
            .filter_map(|result| async move { result })
            .collect()
            .await;

        summarize_sector(&sector.name, stocks)
    }

    /// Every sector, strongest first.
    pub async fn scan_all_sectors(&self, sectors: &[SectorConfig]) -> Vec<SectorAnalysis> {
        let mut results = Vec::with_capacity(sectors.len());
        for sector in sectors {
            info!(sector = %sector.name, "scanning sector");
            results.push(self.scan_sector(sector).await);
        }

        results.sort_by(|a, b| {
            b.strength_score
                .partial_cmp(&a.strength_score)
                .unwrap_or(Ordering::Equal)
        });
        results
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::candles::tests::history_from_closes;

    pub(crate) fn stock(symbol: &str, strength: f64, buy: bool) -> StockAnalysis {
        StockAnalysis {
            symbol: symbol.into(),
            name: format!("{} Inc.", symbol),
            sector: "Test".into(),
            current_price: 100.0,
            price_change_pct: 1.0,
            volume_ratio: 1.0,
            rsi: 55.0,
            trend: TrendDirection::Neutral,
            trend_score: 10,
            strength_score: strength,
            buy_signal: buy,
            note: String::new(),
        }
    }

    #[test]
    fn strength_score_components() {
        // 50 + 8 + 10 + 10 + 6 + 10
        let score = strength_score(2.0, 2.0, 55.0, 40, 105.0, 100.0);
        assert!((score - 94.0).abs() < 1e-9);

        // volume bonus caps at 15, rsi > 70 gives 5, below sma gives -5
        let score = strength_score(0.0, 4.0, 75.0, 0, 95.0, 100.0);
        assert!((score - 65.0).abs() < 1e-9);

        assert_eq!(strength_score(10.0, 5.0, 60.0, 100, 110.0, 100.0), 100.0);
        assert_eq!(strength_score(-10.0, 0.5, 20.0, -100, 90.0, 100.0), 5.0);
    }

    #[test]
    fn buy_signal_needs_three_checks() {
        // alignment, rsi, macd
        assert!(buy_signal(110.0, 105.0, 100.0, 55.0, 0.2, 1.0, 0.0));
        // only rsi and macd
        assert!(!buy_signal(99.0, 105.0, 100.0, 55.0, 0.2, 1.0, 0.0));
        // volume and change band
        assert!(buy_signal(99.0, 105.0, 100.0, 80.0, 0.2, 1.3, 7.0));
        assert!(!buy_signal(99.0, 105.0, 100.0, 80.0, 0.2, 1.3, 7.5));
    }

    #[test]
    fn note_lists_observations() {
        let note = stock_note(4.3, 2.5, 72.0, TrendDirection::Bullish, true);
        assert_eq!(note, "✅ Buy setup | 🔥 Strong rally 4.3% | 📊 Volume surge 2.5x | ⚠️ RSI overheated");

        assert_eq!(stock_note(0.5, 1.6, 25.0, TrendDirection::Bearish, false), "📈 Mild gain | 📊 Volume up | 💡 RSI oversold");
        assert_eq!(stock_note(-1.0, 1.0, 50.0, TrendDirection::Bearish, false), "Bearish");
    }

    #[test]
    fn summarize_sector_ranks_and_counts() {
        let mut weak = stock("C", 20.0, false);
        weak.trend_score = -5;
        weak.price_change_pct = -2.0;
        let stocks = vec![
            stock("A", 80.0, true),
            weak,
            stock("B", 60.0, false),
            stock("D", 70.0, false),
            stock("E", 65.0, false),
            stock("F", 55.0, false),
        ];

        let sector = summarize_sector("Tech", stocks);
        assert_eq!(sector.stock_count, 6);
        assert_eq!(sector.bullish_count, 5);
        assert!((sector.strength_score - 350.0 / 6.0).abs() < 1e-9);
        assert_eq!(sector.trend, TrendDirection::Bullish);
        let ranked: Vec<&str> = sector.top_stocks.iter().map(|s| s.symbol.as_str()).collect();
        assert_eq!(ranked, vec!["A", "D", "E", "B", "F"]);
    }

    #[test]
    fn empty_sector_is_neutral() {
        let sector = summarize_sector("Empty", Vec::new());
        assert_eq!(sector.strength_score, 0.0);
        assert_eq!(sector.trend, TrendDirection::Neutral);
        assert!(sector.top_stocks.is_empty());
    }

    #[test]
    fn top_stocks_dedupes_symbols() {
        let a = summarize_sector("Semis", vec![stock("NVDA", 90.0, true), stock("AMD", 60.0, false)]);
        let b = summarize_sector("AI", vec![stock("NVDA", 90.0, true), stock("PLTR", 75.0, true)]);
        let sectors = vec![a, b];

        let top: Vec<String> = top_stocks(&sectors, 10).into_iter().map(|s| s.symbol).collect();
        assert_eq!(top, vec!["NVDA", "PLTR", "AMD"]);
        assert_eq!(top_stocks(&sectors, 1).len(), 1);

        let buys: Vec<String> = buy_signals(&sectors).into_iter().map(|s| s.symbol).collect();
        assert_eq!(buys, vec!["NVDA", "NVDA", "PLTR"]);
    }

    #[test]
    fn analyzes_short_history_with_reduced_long_window() {
        let params = TechnicalParams::default();
        assert!(analyze_stock_history(&history_from_closes(&[10.0; 19]), "X", &params).is_none());

        let closes: Vec<f64> = (0..30).map(|i| 50.0 + i as f64 * 0.5).collect();
        let analysis = analyze_stock_history(&history_from_closes(&closes), "Growth", &params).unwrap();
        assert_eq!(analysis.sector, "Growth");
        assert_eq!(analysis.name, "Test Corp");
        assert!(analysis.trend_score > 0);
        assert!(analysis.strength_score > 50.0);
        assert!((0.0..=100.0).contains(&analysis.strength_score));
    }
}
