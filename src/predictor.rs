//! Short-horizon direction forecasts, price targets and market outlooks.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::candles::{Candle, PriceHistory};
use crate::config::TechnicalParams;
use crate::data_fetcher::DataFetcher;
use crate::indicators::{self, FibonacciLevels, PivotPoints};
use crate::market_analyzer::MarketAnalysis;
use crate::sector_scanner::SectorAnalysis;

const PATTERN_LOOKBACK: usize = 20;
const FIBONACCI_LOOKBACK: usize = 60;
const VOLATILITY_PERIOD: usize = 20;
const MAX_KEY_FACTORS: usize = 5;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredictionDirection {
    StrongUp,
    Up,
    Neutral,
    Down,
    StrongDown,
}

impl PredictionDirection {
    pub fn label(self) -> &'static str {
        match self {
            PredictionDirection::StrongUp => "Strong rise",
            PredictionDirection::Up => "Leaning up",
            PredictionDirection::Neutral => "Range-bound",
            PredictionDirection::Down => "Leaning down",
            PredictionDirection::StrongDown => "Strong decline",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            PredictionDirection::StrongUp => "🚀",
            PredictionDirection::Up => "📈",
            PredictionDirection::Neutral => "➡️",
            PredictionDirection::Down => "📉",
            PredictionDirection::StrongDown => "💥",
        }
    }

    pub fn is_up(self) -> bool {
        matches!(self, PredictionDirection::StrongUp | PredictionDirection::Up)
    }

    pub fn is_down(self) -> bool {
        matches!(self, PredictionDirection::StrongDown | PredictionDirection::Down)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn label(self) -> &'static str {
        match self {
            Confidence::High => "High",
            Confidence::Medium => "Medium",
            Confidence::Low => "Low",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PricePrediction {
    pub symbol: String,
    pub name: String,
    pub current_price: f64,
    pub direction: PredictionDirection,
    pub confidence: Confidence,
    pub target_high: f64,
    pub target_low: f64,
    pub support_levels: Vec<f64>,
    pub resistance_levels: Vec<f64>,
    pub key_factors: Vec<String>,
    pub risk_warning: String,
    pub time_horizon: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MarketOutlook {
    pub market_name: String,
    pub direction: PredictionDirection,
    pub confidence: Confidence,
    pub observations: Vec<String>,
    pub bullish_factors: Vec<String>,
    pub bearish_factors: Vec<String>,
    pub strategy: String,
    pub risk_level: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternSignal {
    pub bullish: bool,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternAnalysis {
    pub patterns: Vec<String>,
    pub signals: Vec<PatternSignal>,
}

impl PatternAnalysis {
    fn push(&mut self, pattern: &str, bullish: bool, description: String) {
        self.patterns.push(pattern.to_string());
        self.signals.push(PatternSignal { bullish, description });
    }
}

/// Moving-average crosses on the last bar, proximity to the recent range,
/// and runs of up or down days.
pub fn analyze_price_pattern(candles: &[Candle], params: &TechnicalParams) -> PatternAnalysis {
    let mut analysis = PatternAnalysis::default();
    if candles.len() < 2 {
        return analysis;
    }
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let short = indicators::sma_series(&closes, params.sma_short);
    let medium = indicators::sma_series(&closes, params.sma_medium);
    let n = closes.len();
    let spread = |i: usize| Some(short[i]? - medium[i]?);

    if let (Some(prev), Some(curr)) = (spread(n - 2), spread(n - 1)) {
        if prev < 0.0 && curr > 0.0 {
            analysis.push("Golden cross", true, "Short MA crossed above medium MA, near-term bullish".into());
        } else if prev > 0.0 && curr < 0.0 {
            analysis.push("Death cross", false, "Short MA crossed below medium MA, near-term bearish".into());
        }
    }

    if let Some((recent_low, recent_high)) = indicators::support_resistance(candles, PATTERN_LOOKBACK) {
        let price = closes[n - 1];
        if price >= recent_high * 0.98 {
            analysis.push("Breakout", true, "Price breaking out to recent highs".into());
        } else if price <= recent_low * 1.02 {
            analysis.push("Breakdown", false, "Price breaking down to recent lows".into());
        }
    }

    let returns = indicators::pct_changes(&closes);
    let last5 = &returns[returns.len().saturating_sub(5)..];
    let up_days = last5.iter().filter(|r| **r > 0.0).count();
    let down_days = last5.iter().filter(|r| **r < 0.0).count();
    if up_days >= 4 {
        analysis.push("Winning streak", true, format!("{} of the last 5 sessions closed higher", up_days));
    } else if down_days >= 4 {
        analysis.push("Losing streak", false, format!("{} of the last 5 sessions closed lower", down_days));
    }

    analysis
}

pub struct PredictionInputs<'a> {
    pub price: f64,
    pub sma_medium: f64,
    pub sma_long: f64,
    pub rsi: f64,
    pub macd_histogram: f64,
    pub patterns: &'a PatternAnalysis,
    pub volatility: f64,
}

pub fn evaluate_prediction(
    inputs: &PredictionInputs<'_>,
    params: &TechnicalParams,
) -> (PredictionDirection, Confidence, Vec<String>) {
    let mut score: f64 = 0.0;
    let mut factors = Vec::new();
    let (price, medium, long, rsi) = (inputs.price, inputs.sma_medium, inputs.sma_long, inputs.rsi);

    if price > medium && medium > long {
        score += 2.0;
        factors.push("Price above rising averages, bullish alignment".to_string());
    } else if price < medium && medium < long {
        score -= 2.0;
        factors.push("Price below falling averages, bearish alignment".to_string());
    } else if price > medium {
        score += 1.0;
        factors.push(format!("Price above the {}-day average", params.sma_medium));
    } else {
        score -= 1.0;
        factors.push(format!("Price below the {}-day average", params.sma_medium));
    }

    if rsi > params.rsi_overbought {
        score -= 1.0;
        factors.push(format!("RSI({:.0}) overbought, pullback likely", rsi));
    } else if rsi < params.rsi_oversold {
        score += 1.0;
        factors.push(format!("RSI({:.0}) oversold, rebound likely", rsi));
    } else if rsi > 50.0 {
        score += 0.5;
        factors.push(format!("RSI({:.0}) leaning bullish", rsi));
    }

    if inputs.macd_histogram > 0.0 {
        score += 1.0;
        factors.push("MACD momentum rising".to_string());
    } else {
        score -= 1.0;
        factors.push("MACD momentum falling".to_string());
    }

    for signal in &inputs.patterns.signals {
        score += if signal.bullish { 1.0 } else { -1.0 };
        factors.push(signal.description.clone());
    }

    let direction = if score >= 3.0 {
        PredictionDirection::StrongUp
    } else if score >= 1.0 {
        PredictionDirection::Up
    } else if score <= -3.0 {
        PredictionDirection::StrongDown
    } else if score <= -1.0 {
        PredictionDirection::Down
    } else {
        PredictionDirection::Neutral
    };

    let confidence = if score.abs() >= 3.0 && inputs.volatility < 30.0 {
        Confidence::High
    } else if score.abs() >= 2.0 {
        Confidence::Medium
    } else {
        Confidence::Low
    };

    factors.truncate(MAX_KEY_FACTORS);
    (direction, confidence, factors)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// One-week target band from annualized volatility, capped by pivots on the
/// side of the expected move.
pub fn target_prices(price: f64, direction: PredictionDirection, volatility: f64, pivots: &PivotPoints) -> (f64, f64) {
    let weekly_volatility = volatility / 52f64.sqrt();
    let expected_move = price * weekly_volatility / 100.0;

    let (high, low) = if direction.is_up() {
        (
            (price + expected_move * 1.5).min(pivots.r2),
            (price - expected_move * 0.5).max(pivots.s1),
        )
    } else if direction.is_down() {
        (
            (price + expected_move * 0.5).min(pivots.r1),
            (price - expected_move * 1.5).max(pivots.s2),
        )
    } else {
        (price + expected_move, price - expected_move)
    };

    (round2(high), round2(low))
}

/// Three lowest supports and three highest resistances among pivots and the
/// 38.2% / 50% Fibonacci levels.
pub fn key_levels(pivots: &PivotPoints, fib: &FibonacciLevels) -> (Vec<f64>, Vec<f64>) {
    let mut supports = vec![pivots.s1, pivots.s2, fib.level_382, fib.level_500];
    supports.sort_by(|a, b| a.total_cmp(b));
    supports.truncate(3);

    let mut resistances = vec![pivots.r1, pivots.r2, fib.level_382, fib.level_500];
    resistances.sort_by(|a, b| b.total_cmp(a));
    resistances.truncate(3);

    (supports, resistances)
}

pub fn risk_warning(rsi: f64, volatility: f64, direction: PredictionDirection) -> String {
    let mut warnings = Vec::new();

    if volatility > 40.0 {
        warnings.push("High volatility");
    } else if volatility > 25.0 {
        warnings.push("Elevated volatility");
    }

    if rsi > 75.0 {
        warnings.push("Severely overbought, chasing is risky");
    } else if rsi < 25.0 {
        warnings.push("Severely oversold, may keep falling");
    }

    if direction == PredictionDirection::Neutral {
        warnings.push("No clear direction, wait and see");
    }

    if warnings.is_empty() {
        "Moderate risk".to_string()
    } else {
        format!("⚠️ {}", warnings.join(", "))
    }
}

pub fn predict_history(
    history: &PriceHistory,
    name: &str,
    horizon: &str,
    params: &TechnicalParams,
) -> Option<PricePrediction> {
    let closes = history.closes();
    if closes.len() < params.sma_long.max(FIBONACCI_LOOKBACK) {
        return None;
    }
    let current_price = closes[closes.len() - 1];

    let sma_medium = indicators::sma(&closes, params.sma_medium)?;
    let sma_long = indicators::sma(&closes, params.sma_long)?;
    let rsi = indicators::rsi(&closes, params.rsi_period)?;
    let macd = indicators::macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal)?;

    let pivots = indicators::pivot_points(history.last()?);
    let fib = indicators::fibonacci_levels(&history.candles, FIBONACCI_LOOKBACK)?;
    let patterns = analyze_price_pattern(&history.candles, params);
    let volatility = indicators::volatility(&closes, VOLATILITY_PERIOD)?;

    let (direction, confidence, key_factors) = evaluate_prediction(
        &PredictionInputs {
            price: current_price,
            sma_medium,
            sma_long,
            rsi,
            macd_histogram: macd.histogram,
            patterns: &patterns,
            volatility,
        },
        params,
    );

    let (target_high, target_low) = target_prices(current_price, direction, volatility, &pivots);
    let (support_levels, resistance_levels) = key_levels(&pivots, &fib);

    Some(PricePrediction {
        symbol: history.symbol.clone(),
        name: name.to_string(),
        current_price,
        direction,
        confidence,
        target_high,
        target_low,
        support_levels,
        resistance_levels,
        key_factors,
        risk_warning: risk_warning(rsi, volatility, direction),
        time_horizon: horizon.to_string(),
    })
}

/// Market direction from the index trend and the breadth of sector strength.
pub fn market_outlook(market_name: &str, index: Option<&MarketAnalysis>, sectors: &[SectorAnalysis]) -> MarketOutlook {
    let mut bullish_factors = Vec::new();
    let mut bearish_factors = Vec::new();
    let mut observations = Vec::new();

    if let Some(index) = index {
        if index.trend.is_bullish() {
            bullish_factors.push(format!("{} shows a {} trend", index.name, index.trend.label().to_lowercase()));
        } else if index.trend.is_bearish() {
            bearish_factors.push(format!("{} shows a {} trend", index.name, index.trend.label().to_lowercase()));
        }

        if index.rsi > 70.0 {
            bearish_factors.push("Index RSI overheated".to_string());
        } else if index.rsi < 30.0 {
            bullish_factors.push("Index RSI oversold".to_string());
        }

        observations.push(format!(
            "Index closed at {:.2}, change {:+.2}%",
            index.current_price, index.price_change_pct
        ));
    }

    if !sectors.is_empty() {
        let strong: Vec<&SectorAnalysis> = sectors.iter().filter(|s| s.strength_score >= 60.0).collect();
        let weak = sectors.iter().filter(|s| s.strength_score <= 40.0).count();
        let half = sectors.len() as f64 / 2.0;

        if strong.len() as f64 > half {
            bullish_factors.push(format!("{} sectors showing strength", strong.len()));
        }
        if weak as f64 > half {
            bearish_factors.push(format!("{} sectors showing weakness", weak));
        }

        if !strong.is_empty() {
            let names: Vec<&str> = strong.iter().take(3).map(|s| s.name.as_str()).collect();
            observations.push(format!("Strong sectors: {}", names.join(", ")));
        }
    }

    let bullish = bullish_factors.len() as i64;
    let bearish = bearish_factors.len() as i64;

    let (direction, confidence, strategy, risk) = if bullish >= bearish + 2 {
        (PredictionDirection::StrongUp, Confidence::High, "Build positions, add to leading sectors", "Low")
    } else if bullish > bearish {
        (PredictionDirection::Up, Confidence::Medium, "Stay long-biased, buy dips", "Medium-low")
    } else if bearish >= bullish + 2 {
        (PredictionDirection::StrongDown, Confidence::High, "Play defense, reduce exposure or stay in cash", "High")
    } else if bearish > bullish {
        (PredictionDirection::Down, Confidence::Medium, "Trade cautiously, keep position sizes in check", "Medium-high")
    } else {
        (PredictionDirection::Neutral, Confidence::Low, "Range trade, sell highs and buy lows", "Medium")
    };

    MarketOutlook {
        market_name: market_name.to_string(),
        direction,
        confidence,
        observations,
        bullish_factors,
        bearish_factors,
        strategy: strategy.to_string(),
        risk_level: risk.to_string(),
    }
}

pub struct TrendPredictor {
    fetcher: Arc<DataFetcher>,
    params: TechnicalParams,
    period: String,
}

impl TrendPredictor {
    pub fn new(fetcher: Arc<DataFetcher>, params: TechnicalParams, period: String) -> Self {
        Self { fetcher, params, period }
    }

    /// Forecast for one symbol; `name` falls back to the provider's name.
    pub async fn predict_stock(&self, symbol: &str, name: Option<&str>, horizon: &str) -> Option<PricePrediction> {
        let history = match self.fetcher.get_history(symbol, &self.period).await {
            Ok(history) => history,
            Err(e) => {
                warn!(symbol, error = %e, "prediction data unavailable");
                return None;
            }
        };

        let name = name.unwrap_or(&history.name);
        let prediction = predict_history(&history, name, horizon, &self.params);
        if prediction.is_none() {
            warn!(symbol, bars = history.len(), "not enough data to predict");
        }
        prediction
    }
}
