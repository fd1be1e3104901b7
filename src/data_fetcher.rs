//! Market data retrieval from the Yahoo Finance chart and screener APIs.

use futures::StreamExt;
use reqwest::{Client, StatusCode, header};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::candles::{self, PriceHistory};
use crate::config::FetchConfig;

const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {status} for {url}")]
    Status { status: StatusCode, url: String },
    #[error("rate limited by provider, retry after {0:?}")]
    RateLimited(Duration),
    #[error("provider error {code}: {description}")]
    Provider { code: String, description: String },
    #[error("no data returned for {0}")]
    Empty(String),
    #[error("malformed response: {0}")]
    Decode(#[from] serde_json::Error),
}

pub struct DataFetcher {
    client: Client,
    base_url: String,
    interval: String,
    max_workers: usize,
    cache: TtlCache<Arc<PriceHistory>>,
}

impl DataFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .pool_max_idle_per_host(config.max_workers.max(1))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            interval: config.interval.clone(),
            max_workers: config.max_workers.max(1),
            cache: TtlCache::new(Duration::from_secs(config.cache_minutes * 60)),
        })
    }

    /// GETs `url`, waiting out one 429 before giving up.
    async fn get_bytes(&self, url: &str, query: &[(&str, String)]) -> Result<Vec<u8>, FetchError> {
        let mut retried = false;
        loop {
            let response = self.client.get(url).query(query).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(response.headers());
                if retried {
                    return Err(FetchError::RateLimited(wait));
                }
                warn!(url, ?wait, "rate limited, backing off");
                tokio::time::sleep(wait).await;
                retried = true;
                continue;
            }

            // The chart API reports unknown symbols as 404 with a JSON error body.
            if !status.is_success() && status != StatusCode::NOT_FOUND {
                return Err(FetchError::Status {
                    status,
                    url: url.to_string(),
                });
            }

            return Ok(response.bytes().await?.to_vec());
        }
    }

    /// Daily history for `symbol` over `period` (e.g. "3mo"), served from the
    /// cache when a fresh copy exists.
    pub async fn get_history(&self, symbol: &str, period: &str) -> Result<Arc<PriceHistory>, FetchError> {
        let cache_key = format!("{}_{}_{}", symbol, period, self.interval);
        if let Some(hit) = self.cache.get(&cache_key) {
            debug!(symbol, "using cached history");
            return Ok(hit);
        }

        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let query = [("range", period.to_string()), ("interval", self.interval.clone())];
        let body = self.get_bytes(&url, &query).await?;

        let history = Arc::new(candles::parse_chart(symbol, &body)?);
        self.cache.insert(cache_key, Arc::clone(&history));

        info!(symbol, bars = history.len(), "fetched history");
        Ok(history)
    }

    /// Fetches several symbols with at most `max_workers` requests in flight.
    /// Failed symbols are logged and left out.
    pub async fn get_multiple(&self, symbols: &[String], period: &str) -> HashMap<String, Arc<PriceHistory>> {
        let results: Vec<_> = futures::stream::iter(symbols)
            .map(|symbol| async move { (symbol.clone(), self.get_history(symbol, period).await) })
            .buffer_unordered(self.max_workers)
            .collect()
            .await;

        let mut out = HashMap::with_capacity(results.len());
        for (symbol, result) in results {
            match result {
                Ok(history) => {
                    out.insert(symbol, history);
                }
                Err(e) => warn!(%symbol, error = %e, "could not fetch history"),
            }
        }

        info!(fetched = out.len(), requested = symbols.len(), "batch fetch complete");
        out
    }

    /// Symbols from a predefined screener such as "most_actives" or "day_gainers".
    pub async fn screener(&self, screener_id: &str, count: usize) -> Result<Vec<String>, FetchError> {
        let url = format!("{}/v1/finance/screener/predefined/saved", self.base_url);
        let query = [("scrIds", screener_id.to_string()), ("count", count.to_string())];
        let body = self.get_bytes(&url, &query).await?;
        candles::parse_screener(&body)
    }

    pub fn clear_cache(&self) {
        let dropped = self.cache.len();
        self.cache.clear();
        info!(dropped, "history cache cleared");
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }
}

fn retry_after(headers: &header::HeaderMap) -> Duration {
    let secs = headers
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
    Duration::from_secs(secs)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const CHART_BODY: &str = r#"{"chart":{"result":[{
        "meta":{"symbol":"NVDA","currency":"USD","longName":"NVIDIA Corporation"},
        "timestamp":[1,2],
        "indicators":{"quote":[{"open":[1.0,2.0],"high":[1.5,2.5],"low":[0.5,1.5],"close":[1.2,2.2],"volume":[100,200]}]}
    }],"error":null}}"#;

    /// Serves `responses` in order, repeating the last one, and counts requests.
    pub(crate) async fn serve(responses: Vec<String>) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else { return };
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let n = counter.fetch_add(1, Ordering::SeqCst);
                let response = &responses[n.min(responses.len() - 1)];
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}", addr), hits)
    }

    pub(crate) fn response(status: &str, extra_headers: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
            status,
            body.len(),
            extra_headers,
            body
        )
    }

    /// Chart document with one bar per close, volume flat.
    pub(crate) fn chart_body(symbol: &str, closes: &[f64]) -> String {
        let list = |values: Vec<String>| values.join(",");
        let timestamps = list((0..closes.len()).map(|i| (1_700_000_000 + i * 86_400).to_string()).collect());
        let scaled = |factor: f64| list(closes.iter().map(|c| format!("{:.4}", c * factor)).collect());
        let volumes = list(vec!["1000".to_string(); closes.len()]);
        format!(
            r#"{{"chart":{{"result":[{{"meta":{{"symbol":"{symbol}","currency":"USD"}},"timestamp":[{timestamps}],"indicators":{{"quote":[{{"open":[{open}],"high":[{high}],"low":[{low}],"close":[{close}],"volume":[{volumes}]}}]}}}}],"error":null}}}}"#,
            open = scaled(1.0),
            high = scaled(1.01),
            low = scaled(0.99),
            close = scaled(1.0),
        )
    }

    fn fetcher_for(base_url: String) -> DataFetcher {
        DataFetcher::new(&FetchConfig {
            base_url,
            timeout_secs: 5,
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn retries_once_after_rate_limit_then_caches() {
        let (base_url, hits) = serve(vec![
            response("429 Too Many Requests", "Retry-After: 0\r\n", "{}"),
            response("200 OK", "", CHART_BODY),
        ])
        .await;
        let fetcher = fetcher_for(base_url);

        let history = fetcher.get_history("NVDA", "3mo").await.unwrap();
        assert_eq!(history.name, "NVIDIA Corporation");
        assert_eq!(history.len(), 2);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let cached = fetcher.get_history("NVDA", "3mo").await.unwrap();
        assert!(Arc::ptr_eq(&history, &cached));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        fetcher.clear_cache();
        fetcher.get_history("NVDA", "3mo").await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn second_rate_limit_gives_up() {
        let (base_url, hits) = serve(vec![response("429 Too Many Requests", "Retry-After: 0\r\n", "{}")]).await;
        let fetcher = fetcher_for(base_url);

        let err = fetcher.get_history("NVDA", "3mo").await.unwrap_err();
        assert!(matches!(err, FetchError::RateLimited(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn server_error_is_a_status_error() {
        let (base_url, hits) = serve(vec![response("500 Internal Server Error", "", "oops")]).await;
        let fetcher = fetcher_for(base_url);

        let err = fetcher.get_history("NVDA", "3mo").await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status, .. } if status == StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let batch = fetcher.get_multiple(&["NVDA".to_string()], "3mo").await;
        assert!(batch.is_empty());
    }

    #[test]
    fn retry_after_reads_seconds_header() {
        let mut headers = header::HeaderMap::new();
        assert_eq!(retry_after(&headers), Duration::from_secs(DEFAULT_RETRY_AFTER_SECS));

        headers.insert(header::RETRY_AFTER, header::HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Duration::from_secs(12));

        headers.insert(
            header::RETRY_AFTER,
            header::HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), Duration::from_secs(DEFAULT_RETRY_AFTER_SECS));
    }

    #[test]
    fn generated_chart_parses() {
        let body = chart_body("SPY", &[1.0, 2.0, 3.0]);
        let history = candles::parse_chart("SPY", body.as_bytes()).unwrap();
        assert_eq!(history.closes(), vec![1.0, 2.0, 3.0]);
        assert_eq!(history.name, "SPY");
    }

    #[test]
    fn builds_from_default_config() {
        let fetcher = DataFetcher::new(&FetchConfig::default()).unwrap();
        assert_eq!(fetcher.max_workers(), 5);
        assert_eq!(fetcher.base_url, "https://query1.finance.yahoo.com");
    }
}
