//! Technical indicators over closing prices and candles. Every function reads
//! the most recent window and returns the value as of the last bar.

use serde::{Deserialize, Serialize};
use ta::Next;
use ta::indicators::{MovingAverageConvergenceDivergence, SimpleMovingAverage, StandardDeviation};

use crate::candles::Candle;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Simple moving average of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let mut indicator = SimpleMovingAverage::new(period).ok()?;
    let mut last = None;
    for &value in &values[values.len() - period..] {
        last = Some(indicator.next(value));
    }
    last
}

/// SMA at every bar; `None` until the window is full.
pub fn sma_series(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let Some(mut indicator) = SimpleMovingAverage::new(period).ok() else {
        return vec![None; values.len()];
    };
    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let avg = indicator.next(value);
            (i + 1 >= period).then_some(avg)
        })
        .collect()
}

/// RSI from plain rolling means of gains and losses over the last `period`
/// price changes.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period + 1 {
        return None;
    }

    let window = &closes[closes.len() - period - 1..];
    let deltas: Vec<f64> = window.windows(2).map(|w| w[1] - w[0]).collect();
    let gains: Vec<f64> = deltas.iter().map(|d| d.max(0.0)).collect();
    let losses: Vec<f64> = deltas.iter().map(|d| (-d).max(0.0)).collect();

    let avg_gain = sma(&gains, period)?;
    let avg_loss = sma(&losses, period)?;

    if avg_loss == 0.0 {
        // Flat series carry no direction.
        return Some(if avg_gain == 0.0 { 50.0 } else { 100.0 });
    }

    let rs = avg_gain / avg_loss;
    Some(100.0 - 100.0 / (1.0 + rs))
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if closes.is_empty() {
        return None;
    }
    let mut indicator = MovingAverageConvergenceDivergence::new(fast, slow, signal).ok()?;
    let mut last = None;
    for &close in closes {
        let out = indicator.next(close);
        last = Some(Macd {
            macd: out.macd,
            signal: out.signal,
            histogram: out.histogram,
        });
    }
    last
}

/// Lowest low and highest high of the last `lookback` candles.
pub fn support_resistance(candles: &[Candle], lookback: usize) -> Option<(f64, f64)> {
    let recent = tail(candles, lookback);
    if recent.is_empty() {
        return None;
    }
    let support = recent.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let resistance = recent.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    Some((support, resistance))
}

/// Last volume relative to the mean volume of the last `period` bars.
pub fn volume_ratio(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period {
        return 1.0;
    }
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let avg = sma(&volumes, period).unwrap_or(0.0);
    let current = volumes[volumes.len() - 1];
    if avg > 0.0 { current / avg } else { 1.0 }
}

/// Bar-over-bar fractional returns.
pub fn pct_changes(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// Annualized volatility in percent: sample standard deviation of the last
/// `period` returns scaled by sqrt(252).
pub fn volatility(closes: &[f64], period: usize) -> Option<f64> {
    let returns = pct_changes(closes);
    let window = tail(&returns, period);
    let n = window.len();
    if n < 2 {
        return None;
    }

    let mut indicator = StandardDeviation::new(n).ok()?;
    let mut population = 0.0;
    for &r in window {
        population = indicator.next(r);
    }
    let sample = population * (n as f64 / (n as f64 - 1.0)).sqrt();
    Some(sample * TRADING_DAYS_PER_YEAR.sqrt() * 100.0)
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct PivotPoints {
    pub pivot: f64,
    pub r1: f64,
    pub r2: f64,
    pub r3: f64,
    pub s1: f64,
    pub s2: f64,
    pub s3: f64,
}

/// Classic floor pivots from a single bar.
pub fn pivot_points(bar: &Candle) -> PivotPoints {
    let (high, low, close) = (bar.high, bar.low, bar.close);
    let pivot = (high + low + close) / 3.0;
    PivotPoints {
        pivot,
        r1: 2.0 * pivot - low,
        r2: pivot + (high - low),
        r3: high + 2.0 * (pivot - low),
        s1: 2.0 * pivot - high,
        s2: pivot - (high - low),
        s3: low - 2.0 * (high - pivot),
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FibonacciLevels {
    pub uptrend: bool,
    pub level_0: f64,
    pub level_236: f64,
    pub level_382: f64,
    pub level_500: f64,
    pub level_618: f64,
    pub level_786: f64,
    pub level_100: f64,
    /// Extensions above the high, only drawn in an uptrend.
    pub ext_1272: Option<f64>,
    pub ext_1618: Option<f64>,
}

/// Retracements from the high in an uptrend, rebounds from the low otherwise.
/// The trend compares the last close with the close `lookback` bars back.
pub fn fibonacci_levels(candles: &[Candle], lookback: usize) -> Option<FibonacciLevels> {
    if lookback == 0 || candles.len() < lookback {
        return None;
    }
    let (low, high) = support_resistance(candles, lookback)?;
    let diff = high - low;

    let last_close = candles[candles.len() - 1].close;
    let anchor_close = candles[candles.len() - lookback].close;
    let uptrend = last_close > anchor_close;

    let levels = if uptrend {
        let at = |ratio: f64| high - diff * ratio;
        FibonacciLevels {
            uptrend,
            level_0: high,
            level_236: at(0.236),
            level_382: at(0.382),
            level_500: at(0.5),
            level_618: at(0.618),
            level_786: at(0.786),
            level_100: low,
            ext_1272: Some(high + diff * 0.272),
            ext_1618: Some(high + diff * 0.618),
        }
    } else {
        let at = |ratio: f64| low + diff * ratio;
        FibonacciLevels {
            uptrend,
            level_0: low,
            level_236: at(0.236),
            level_382: at(0.382),
            level_500: at(0.5),
            level_618: at(0.618),
            level_786: at(0.786),
            level_100: high,
            ext_1272: None,
            ext_1618: None,
        }
    };
    Some(levels)
}

fn tail<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn bar(high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle {
            timestamp: 0,
            open: close,
            high,
            low,
            close,
            volume,
        }
    }

    #[test]
    fn sma_uses_last_window() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert!(approx(sma(&values, 2).unwrap(), 4.5));
        assert!(approx(sma(&values, 5).unwrap(), 3.0));
        assert_eq!(sma(&values, 6), None);

        let series = sma_series(&values, 3);
        assert_eq!(series[1], None);
        assert!(approx(series[2].unwrap(), 2.0));
        assert!(approx(series[4].unwrap(), 4.0));
    }

    #[test]
    fn rsi_extremes_and_flat() {
        let rising: Vec<f64> = (1..=20).map(|i| i as f64).collect();
        assert!(approx(rsi(&rising, 14).unwrap(), 100.0));

        let falling: Vec<f64> = rising.iter().rev().copied().collect();
        assert!(approx(rsi(&falling, 14).unwrap(), 0.0));

        assert!(approx(rsi(&[5.0; 20], 14).unwrap(), 50.0));
        assert_eq!(rsi(&rising[..14], 14), None);
    }

    #[test]
    fn rsi_balanced_moves_is_fifty() {
        let closes: Vec<f64> = (0..15).map(|i| if i % 2 == 0 { 10.0 } else { 11.0 }).collect();
        assert!(approx(rsi(&closes, 14).unwrap(), 50.0));
    }

    #[test]
    fn macd_of_constant_series_is_zero() {
        let out = macd(&[42.0; 40], 12, 26, 9).unwrap();
        assert!(approx(out.macd, 0.0));
        assert!(approx(out.histogram, 0.0));
        assert_eq!(macd(&[], 12, 26, 9), None);
    }

    #[test]
    fn macd_turns_positive_in_uptrend() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + i as f64).collect();
        let out = macd(&closes, 12, 26, 9).unwrap();
        assert!(out.macd > 0.0);
        assert!(approx(out.histogram, out.macd - out.signal));
    }

    #[test]
    fn support_and_resistance_over_lookback() {
        let candles = vec![bar(50.0, 1.0, 10.0, 0.0), bar(12.0, 8.0, 10.0, 0.0), bar(14.0, 9.0, 13.0, 0.0)];
        assert_eq!(support_resistance(&candles, 2), Some((8.0, 14.0)));
        assert_eq!(support_resistance(&candles, 10), Some((1.0, 50.0)));
        assert_eq!(support_resistance(&[], 5), None);
    }

    #[test]
    fn volume_ratio_against_average() {
        let mut candles: Vec<Candle> = (0..19).map(|_| bar(1.0, 1.0, 1.0, 100.0)).collect();
        assert!(approx(volume_ratio(&candles, 20), 1.0));

        candles.push(bar(1.0, 1.0, 1.0, 290.0));
        // mean of 19x100 + 290 = 109.5
        assert!(approx(volume_ratio(&candles, 20), 290.0 / 109.5));

        let silent: Vec<Candle> = (0..20).map(|_| bar(1.0, 1.0, 1.0, 0.0)).collect();
        assert!(approx(volume_ratio(&silent, 20), 1.0));
    }

    #[test]
    fn volatility_uses_sample_deviation() {
        assert!(approx(volatility(&[10.0; 30], 20).unwrap(), 0.0));

        // returns +10% and -10% alternate: sample std of [0.1, -0.1] = 0.1414..
        let closes = [100.0, 110.0, 99.0];
        let expected = (0.02f64).sqrt() * 252f64.sqrt() * 100.0;
        assert!((volatility(&closes, 20).unwrap() - expected).abs() < 1e-6);
        assert_eq!(volatility(&[1.0, 2.0], 20), None);
    }

    #[test]
    fn pivot_points_formulas() {
        let p = pivot_points(&bar(110.0, 90.0, 100.0, 0.0));
        assert!(approx(p.pivot, 100.0));
        assert!(approx(p.r1, 110.0));
        assert!(approx(p.r2, 120.0));
        assert!(approx(p.r3, 130.0));
        assert!(approx(p.s1, 90.0));
        assert!(approx(p.s2, 80.0));
        assert!(approx(p.s3, 70.0));
    }

    #[test]
    fn fibonacci_direction_follows_trend() {
        let up: Vec<Candle> = (0..60).map(|i| bar(101.0 + i as f64, 99.0 + i as f64, 100.0 + i as f64, 0.0)).collect();
        let fib = fibonacci_levels(&up, 60).unwrap();
        assert!(fib.uptrend);
        assert!(approx(fib.level_0, 160.0));
        assert!(approx(fib.level_100, 99.0));
        assert!(approx(fib.level_500, 160.0 - 61.0 * 0.5));
        assert!(approx(fib.ext_1618.unwrap(), 160.0 + 61.0 * 0.618));

        let down: Vec<Candle> = up.iter().rev().copied().collect();
        let fib = fibonacci_levels(&down, 60).unwrap();
        assert!(!fib.uptrend);
        assert!(approx(fib.level_0, 99.0));
        assert!(approx(fib.level_382, 99.0 + 61.0 * 0.382));
        assert_eq!(fib.ext_1272, None);

        assert_eq!(fibonacci_levels(&up[..59], 60), None);
    }
}
