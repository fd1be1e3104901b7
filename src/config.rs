use anyhow::{Context, Result};
use chrono::{FixedOffset, NaiveTime};
use serde::{Deserialize, Serialize};

pub const PLACEHOLDER_WEBHOOK: &str = "YOUR_DISCORD_WEBHOOK_URL_HERE";

// CONFIGURATION STRUCTS
// Stored as storage/config.json. Every section has defaults so a partially
// written file still loads.

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub webhook_url: String,
    /// Local clock used for schedules and report timestamps (Asia/Taipei).
    pub utc_offset_minutes: i32,
    pub technical: TechnicalParams,
    pub fetch: FetchConfig,
    pub discovery: DiscoveryConfig,
    pub schedule: ScheduleConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            webhook_url: PLACEHOLDER_WEBHOOK.to_string(),
            utc_offset_minutes: 8 * 60,
            technical: TechnicalParams::default(),
            fetch: FetchConfig::default(),
            discovery: DiscoveryConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60)
            .with_context(|| format!("utc_offset_minutes out of range: {}", self.utc_offset_minutes))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct TechnicalParams {
    pub sma_short: usize,
    pub sma_medium: usize,
    pub sma_long: usize,
    pub rsi_period: usize,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub volume_ma: usize,
}

impl Default for TechnicalParams {
    fn default() -> Self {
        Self {
            sma_short: 5,
            sma_medium: 20,
            sma_long: 60,
            rsi_period: 14,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            volume_ma: 20,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct FetchConfig {
    pub base_url: String,
    pub period: String,            // e.g., "3mo"
    pub prediction_period: String, // e.g., "6mo"
    pub interval: String,          // e.g., "1d"
    pub cache_minutes: u64,
    pub max_workers: usize,
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://query1.finance.yahoo.com".to_string(),
            period: "3mo".to_string(),
            prediction_period: "6mo".to_string(),
            interval: "1d".to_string(),
            cache_minutes: 15,
            max_workers: 5,
            timeout_secs: 20,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub enabled: bool,
    pub top_n: usize,
    pub fetch_delay_ms: u64,
    pub min_volume_ratio: f64,
    pub fallback_volume_ratio: f64,
    pub min_results: usize,
    /// Taiwan symbols scanned for movers; watchlist members are skipped.
    pub tw_universe: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let tw_universe = [
            // semiconductors & IC design
            "2344.TW", "3034.TW", "3443.TW", "6669.TW", "2449.TW", "3661.TW", "2458.TW",
            // contract manufacturing & components
            "2354.TW", "2356.TW", "2395.TW", "3231.TW", "6239.TW",
            // financials
            "2886.TW", "2887.TW", "2885.TW", "2892.TW", "5876.TW",
            // traditional industry & food
            "1101.TW", "1102.TW", "1216.TW", "2912.TW", "1227.TW",
            // telecom & media
            "2412.TW", "3045.TW", "4904.TW",
            // steel & cement
            "2006.TW", "2014.TW", "1110.TW",
            // textiles & plastics
            "1402.TW", "1434.TW",
            // other
            "2207.TW", "9910.TW", "2633.TW", "5871.TW", "2801.TW", "3037.TW", "2049.TW", "6581.TW",
        ];

        Self {
            enabled: true,
            top_n: 10,
            fetch_delay_ms: 300,
            min_volume_ratio: 1.5,
            fallback_volume_ratio: 1.0,
            min_results: 3,
            tw_universe: tw_universe.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct ScheduleConfig {
    pub tw_market_close: String, // "HH:MM" local time
    pub us_market_close: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tw_market_close: "14:30".to_string(),
            us_market_close: "05:30".to_string(),
        }
    }
}

pub fn parse_clock(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .with_context(|| format!("invalid HH:MM time: {:?}", value))
}

/// `--webhook` beats the environment, which beats config.json.
pub fn resolve_webhook(cli: Option<&str>, env: Option<&str>, config: &str) -> String {
    let set = |url: &&str| !url.trim().is_empty();
    cli.filter(set)
        .or(env.filter(set))
        .unwrap_or(config)
        .trim()
        .to_string()
}

pub fn webhook_is_configured(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && url != PLACEHOLDER_WEBHOOK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_fills_defaults() {
        let config: AppConfig =
            serde_json::from_str(r#"{"webhook_url":"https://example.test/hook","fetch":{"period":"6mo"}}"#).unwrap();
        assert_eq!(config.webhook_url, "https://example.test/hook");
        assert_eq!(config.fetch.period, "6mo");
        assert_eq!(config.fetch.interval, "1d");
        assert_eq!(config.technical.rsi_period, 14);
        assert_eq!(config.discovery.tw_universe.len(), 38);
    }

    #[test]
    fn default_offset_is_taipei() {
        let offset = AppConfig::default().offset().unwrap();
        assert_eq!(offset.local_minus_utc(), 8 * 3600);
    }

    #[test]
    fn parses_schedule_clock() {
        assert_eq!(parse_clock("05:30").unwrap(), NaiveTime::from_hms_opt(5, 30, 0).unwrap());
        assert!(parse_clock("25:00").is_err());
    }

    #[test]
    fn webhook_precedence() {
        assert_eq!(resolve_webhook(Some("a"), Some("b"), "c"), "a");
        assert_eq!(resolve_webhook(None, Some("b"), "c"), "b");
        assert_eq!(resolve_webhook(None, None, "c"), "c");
        assert_eq!(resolve_webhook(Some(" "), None, "c"), "c");
        assert_eq!(resolve_webhook(Some(""), Some("https://env.test/hook"), "c"), "https://env.test/hook");
        assert!(!webhook_is_configured(PLACEHOLDER_WEBHOOK));
        assert!(!webhook_is_configured(""));
        assert!(webhook_is_configured("https://discord.com/api/webhooks/1/x"));
    }
}
