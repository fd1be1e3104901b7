use serde::{Deserialize, Serialize};

use crate::data_fetcher::FetchError;

/// One daily OHLCV bar.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Candle {
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PriceHistory {
    pub symbol: String,
    pub name: String,
    pub currency: Option<String>,
    pub candles: Vec<Candle>,
}

impl PriceHistory {
    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }
}

// --- Chart API payload ---

#[derive(Deserialize, Debug)]
struct ChartResponse {
    chart: ChartBody,
}

#[derive(Deserialize, Debug)]
struct ChartBody {
    result: Option<Vec<ChartData>>,
    error: Option<ProviderError>,
}

#[derive(Deserialize, Debug)]
pub(crate) struct ProviderError {
    pub code: String,
    pub description: String,
}

#[derive(Deserialize, Debug)]
struct ChartData {
    meta: ChartMeta,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Deserialize, Debug)]
struct ChartMeta {
    symbol: String,
    currency: Option<String>,
    #[serde(rename = "longName")]
    long_name: Option<String>,
    #[serde(rename = "shortName")]
    short_name: Option<String>,
}

#[derive(Deserialize, Debug)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct ChartQuote {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Decodes a chart response body. Bars missing any price are dropped, a
/// missing volume reads as zero (indices often omit it).
pub fn parse_chart(requested: &str, body: &[u8]) -> Result<PriceHistory, FetchError> {
    let response: ChartResponse = serde_json::from_slice(body)?;

    if let Some(err) = response.chart.error {
        return Err(FetchError::Provider {
            code: err.code,
            description: err.description,
        });
    }

    let data = response
        .chart
        .result
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| FetchError::Empty(requested.to_string()))?;

    let quote = data.indicators.quote.into_iter().next().unwrap_or_default();
    let at = |series: &[Option<f64>], i: usize| series.get(i).copied().flatten();

    let candles: Vec<Candle> = data
        .timestamp
        .iter()
        .enumerate()
        .filter_map(|(i, &timestamp)| {
            Some(Candle {
                timestamp,
                open: at(&quote.open, i)?,
                high: at(&quote.high, i)?,
                low: at(&quote.low, i)?,
                close: at(&quote.close, i)?,
                volume: at(&quote.volume, i).unwrap_or(0.0),
            })
        })
        .collect();

    if candles.is_empty() {
        return Err(FetchError::Empty(requested.to_string()));
    }

    let name = data
        .meta
        .long_name
        .or(data.meta.short_name)
        .unwrap_or_else(|| data.meta.symbol.clone());

    Ok(PriceHistory {
        symbol: data.meta.symbol,
        name,
        currency: data.meta.currency,
        candles,
    })
}

// --- Screener API payload ---

#[derive(Deserialize, Debug)]
struct ScreenerResponse {
    finance: ScreenerBody,
}

#[derive(Deserialize, Debug)]
struct ScreenerBody {
    result: Option<Vec<ScreenerResult>>,
    error: Option<ProviderError>,
}

#[derive(Deserialize, Debug)]
struct ScreenerResult {
    #[serde(default)]
    quotes: Vec<ScreenerQuote>,
}

#[derive(Deserialize, Debug)]
struct ScreenerQuote {
    symbol: Option<String>,
}

pub fn parse_screener(body: &[u8]) -> Result<Vec<String>, FetchError> {
    let response: ScreenerResponse = serde_json::from_slice(body)?;

    if let Some(err) = response.finance.error {
        return Err(FetchError::Provider {
            code: err.code,
            description: err.description,
        });
    }

    Ok(response
        .finance
        .result
        .unwrap_or_default()
        .into_iter()
        .flat_map(|r| r.quotes)
        .filter_map(|q| q.symbol)
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a history from closes; high/low hug the close and volume is flat.
    pub(crate) fn history_from_closes(closes: &[f64]) -> PriceHistory {
        let candles = closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                timestamp: 1_700_000_000 + i as i64 * 86_400,
                open: close,
                high: close * 1.01,
                low: close * 0.99,
                close,
                volume: 1_000.0,
            })
            .collect();
        PriceHistory {
            symbol: "TEST".into(),
            name: "Test Corp".into(),
            currency: Some("USD".into()),
            candles,
        }
    }

    #[test]
    fn parses_chart_and_skips_incomplete_bars() {
        let body = br#"{"chart":{"result":[{
            "meta":{"symbol":"AAPL","currency":"USD","shortName":"Apple Inc."},
            "timestamp":[1,2,3],
            "indicators":{"quote":[{
                "open":[1.0,null,3.0],
                "high":[1.5,2.5,3.5],
                "low":[0.5,1.5,2.5],
                "close":[1.2,2.2,3.2],
                "volume":[100,200,null]
            }]}
        }],"error":null}}"#;

        let history = parse_chart("AAPL", body).unwrap();
        assert_eq!(history.name, "Apple Inc.");
        assert_eq!(history.len(), 2);
        assert_eq!(history.candles[1].timestamp, 3);
        assert_eq!(history.candles[1].volume, 0.0);
        assert_eq!(history.closes(), vec![1.2, 3.2]);
    }

    #[test]
    fn chart_error_maps_to_provider_error() {
        let body = br#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        match parse_chart("ZZZZ", body) {
            Err(FetchError::Provider { code, .. }) => assert_eq!(code, "Not Found"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn chart_without_bars_is_empty() {
        let body = br#"{"chart":{"result":[{"meta":{"symbol":"X"},"indicators":{"quote":[{}]}}],"error":null}}"#;
        assert!(matches!(parse_chart("X", body), Err(FetchError::Empty(_))));
    }

    #[test]
    fn parses_screener_symbols() {
        let body = br#"{"finance":{"result":[{"quotes":[{"symbol":"TSLA"},{"symbol":""},{"other":1},{"symbol":"F"}]}],"error":null}}"#;
        assert_eq!(parse_screener(body).unwrap(), vec!["TSLA", "F"]);
    }
}
