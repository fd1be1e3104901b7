//! Index-level trend analysis: moving-average alignment, RSI, MACD and the
//! day's change folded into a single trend score.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::candles::PriceHistory;
use crate::config::TechnicalParams;
use crate::data_fetcher::DataFetcher;
use crate::indicators;
use crate::watchlist::MarketConfig;

const SUPPORT_LOOKBACK: usize = 20;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendDirection {
    StrongBullish,
    Bullish,
    Neutral,
    Bearish,
    StrongBearish,
}

impl TrendDirection {
    pub fn label(self) -> &'static str {
        match self {
            TrendDirection::StrongBullish => "Strong bullish",
            TrendDirection::Bullish => "Bullish",
            TrendDirection::Neutral => "Consolidating",
            TrendDirection::Bearish => "Bearish",
            TrendDirection::StrongBearish => "Strong bearish",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            TrendDirection::StrongBullish => "🚀",
            TrendDirection::Bullish => "📈",
            TrendDirection::Neutral => "➡️",
            TrendDirection::Bearish => "📉",
            TrendDirection::StrongBearish => "💥",
        }
    }

    pub fn is_bullish(self) -> bool {
        matches!(self, TrendDirection::StrongBullish | TrendDirection::Bullish)
    }

    pub fn is_bearish(self) -> bool {
        matches!(self, TrendDirection::StrongBearish | TrendDirection::Bearish)
    }

    fn from_score(score: i32) -> Self {
        match score {
            s if s >= 50 => TrendDirection::StrongBullish,
            s if s >= 20 => TrendDirection::Bullish,
            s if s <= -50 => TrendDirection::StrongBearish,
            s if s <= -20 => TrendDirection::Bearish,
            _ => TrendDirection::Neutral,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarketAnalysis {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub price_change: f64,
    pub price_change_pct: f64,
    pub trend: TrendDirection,
    /// -100 ..= 100
    pub trend_score: i32,
    pub support_level: f64,
    pub resistance_level: f64,
    pub sma_short: f64,
    pub sma_medium: f64,
    pub sma_long: f64,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub volume_ratio: f64,
    pub summary: String,
}

/// Inputs of the trend score, all as of the last bar.
#[derive(Debug, Clone, Copy)]
pub struct TrendInputs {
    pub price: f64,
    pub sma_short: f64,
    pub sma_medium: f64,
    pub sma_long: f64,
    pub rsi: f64,
    pub macd_histogram: f64,
    pub price_change_pct: f64,
}

pub fn determine_trend(inputs: &TrendInputs, params: &TechnicalParams) -> (TrendDirection, i32) {
    let TrendInputs {
        price,
        sma_short,
        sma_medium,
        sma_long,
        rsi,
        macd_histogram,
        price_change_pct,
    } = *inputs;
    let mut score: i32 = 0;

    // moving-average alignment, up to ±30
    if price > sma_short && sma_short > sma_medium && sma_medium > sma_long {
        score += 30;
    } else if price < sma_short && sma_short < sma_medium && sma_medium < sma_long {
        score -= 30;
    } else if price > sma_medium {
        score += 15;
    } else if price < sma_medium {
        score -= 15;
    }

    // RSI; overbought still reads as strength
    if rsi > params.rsi_overbought {
        score += 15;
    } else if rsi > 50.0 {
        score += 10;
    } else if rsi < params.rsi_oversold {
        score -= 15;
    } else if rsi < 50.0 {
        score -= 10;
    }

    // MACD histogram, up to ±25
    let macd_points = (macd_histogram * 100.0) as i32;
    score += macd_points.clamp(-25, 25);

    // day's change, up to ±20
    score += ((price_change_pct * 5.0) as i32).clamp(-20, 20);

    let score = score.clamp(-100, 100);
    (TrendDirection::from_score(score), score)
}

pub fn generate_summary(
    trend: TrendDirection,
    score: i32,
    rsi: f64,
    macd_histogram: f64,
    volume_ratio: f64,
    params: &TechnicalParams,
) -> String {
    let mut parts = vec![format!("Trend: {} (score {})", trend.label(), score)];

    parts.push(
        if rsi > params.rsi_overbought {
            "RSI overbought, pullback risk"
        } else if rsi < params.rsi_oversold {
            "RSI oversold, rebound possible"
        } else if rsi > 50.0 {
            "RSI leaning bullish"
        } else {
            "RSI leaning bearish"
        }
        .to_string(),
    );

    parts.push(
        if macd_histogram > 0.0 {
            "MACD histogram positive, momentum up"
        } else {
            "MACD histogram negative, momentum down"
        }
        .to_string(),
    );

    if volume_ratio > 1.5 {
        parts.push(format!("Volume expanded {:.1}x", volume_ratio));
    } else if volume_ratio < 0.7 {
        parts.push("Volume contracting".to_string());
    }

    parts.join(" | ")
}

/// Full index analysis from a price history; needs `sma_long` bars.
pub fn analyze_history(history: &PriceHistory, name: &str, params: &TechnicalParams) -> Option<MarketAnalysis> {
    let closes = history.closes();
    if closes.len() < params.sma_long.max(2) {
        return None;
    }

    let current_price = closes[closes.len() - 1];
    let prev_price = closes[closes.len() - 2];
    let price_change = current_price - prev_price;
    let price_change_pct = if prev_price != 0.0 {
        price_change / prev_price * 100.0
    } else {
        0.0
    };

    let sma_short = indicators::sma(&closes, params.sma_short)?;
    let sma_medium = indicators::sma(&closes, params.sma_medium)?;
    let sma_long = indicators::sma(&closes, params.sma_long)?;
    let rsi = indicators::rsi(&closes, params.rsi_period)?;
    let macd = indicators::macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal)?;
    let (support_level, resistance_level) = indicators::support_resistance(&history.candles, SUPPORT_LOOKBACK)?;
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
    let summary = generate_summary(trend, trend_score, rsi, macd.histogram, volume_ratio, params);

    Some(MarketAnalysis {
        symbol: history.symbol.clone(),
        name: name.to_string(),
        current_price,
        price_change,
        price_change_pct,
        trend,
        trend_score,
        support_level,
        resistance_level,
        sma_short,
        sma_medium,
        sma_long,
        rsi,
        macd: macd.macd,
        macd_signal: macd.signal,
        macd_histogram: macd.histogram,
        volume_ratio,
        summary,
    })
}

pub struct MarketAnalyzer {
    fetcher: Arc<DataFetcher>,
    params: TechnicalParams,
    period: String,
}

impl MarketAnalyzer {
    pub fn new(fetcher: Arc<DataFetcher>, params: TechnicalParams, period: String) -> Self {
        Self { fetcher, params, period }
    }

    /// Every configured index of `market`, in configuration order.
    pub async fn analyze_indices(&self, market: &MarketConfig) -> Vec<MarketAnalysis> {
        let symbols: Vec<String> = market.indices.iter().map(|i| i.symbol.clone()).collect();
        let histories = self.fetcher.get_multiple(&symbols, &self.period).await;

        market
            .indices
            .iter()
            .filter_map(|index| {
                let history = histories.get(&index.symbol)?;
                let analysis = analyze_history(history, &index.name, &self.params);
                if analysis.is_none() {
                    warn!(symbol = %index.symbol, bars = history.len(), "not enough data to analyze index");
                }
                analysis
            })
            .collect()
    }
}
