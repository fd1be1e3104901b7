//! Discord webhook delivery. Message builders are pure and return embeds;
//! `DiscordNotifier` posts them.

use chrono::{DateTime, FixedOffset};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::webhook_is_configured;
use crate::market_analyzer::{MarketAnalysis, TrendDirection};
use crate::predictor::{MarketOutlook, PredictionDirection, PricePrediction};
use crate::sector_scanner::{SectorAnalysis, StockAnalysis, by_strength_desc};

pub const COLOR_BULLISH: u32 = 0x00FF00;
pub const COLOR_BEARISH: u32 = 0xFF0000;
pub const COLOR_NEUTRAL: u32 = 0xFFFF00;
pub const COLOR_INFO: u32 = 0x0099FF;

/// Discord rejects messages with more embeds than this.
pub const MAX_EMBEDS_PER_MESSAGE: usize = 10;
const MAX_FIELD_VALUE_CHARS: usize = 1024;
const RANKED_SECTORS: usize = 8;
const DETAILED_SECTORS: usize = 3;
const DETAIL_STRENGTH: f64 = 60.0;
const MAX_LISTED_STOCKS: usize = 10;

const PREDICTION_FOOTER: &str = "⚠️ Predictions are for reference only. Investing carries risk.";
const OUTLOOK_FOOTER: &str = "⚠️ Analysis is for reference only. Investing carries risk.";
const DISCLAIMER: &str = "---\n⚠️ **Disclaimer**: the analysis above is for reference only and is not investment advice.\nInvesting carries risk; evaluate it against your own risk tolerance.";

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

impl EmbedField {
    /// Empty values become "None" and long ones are cut to Discord's limit.
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        let value: String = value.into();
        let value = if value.trim().is_empty() {
            "None".to_string()
        } else if value.chars().count() > MAX_FIELD_VALUE_CHARS {
            value.chars().take(MAX_FIELD_VALUE_CHARS).collect()
        } else {
            value
        };
        Self {
            name: name.into(),
            value,
            inline,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Embed {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
}

impl Embed {
    pub fn new(title: impl Into<String>, color: u32) -> Self {
        Self {
            title: title.into(),
            description: None,
            color,
            fields: Vec::new(),
            footer: None,
        }
    }

    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField::new(name, value, inline));
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Default)]
pub struct WebhookMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

/// Splits embeds into messages Discord accepts. Text rides on the first one.
pub fn build_messages(content: Option<String>, embeds: Vec<Embed>) -> Vec<WebhookMessage> {
    if embeds.is_empty() {
        return match content {
            Some(text) if !text.is_empty() => vec![WebhookMessage {
                content: Some(text),
                embeds: Vec::new(),
            }],
            _ => Vec::new(),
        };
    }

    let mut content = content.filter(|text| !text.is_empty());
    embeds
        .chunks(MAX_EMBEDS_PER_MESSAGE)
        .map(|chunk| WebhookMessage {
            content: content.take(),
            embeds: chunk.to_vec(),
        })
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook url is not configured")]
    NotConfigured,
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
}

pub struct DiscordNotifier {
    client: Client,
    webhook_url: String,
}

impl DiscordNotifier {
    pub fn new(webhook_url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }

    pub fn is_configured(&self) -> bool {
        webhook_is_configured(&self.webhook_url)
    }

    async fn post_all(&self, messages: &[WebhookMessage]) -> Result<(), NotifyError> {
        if !self.is_configured() {
            return Err(NotifyError::NotConfigured);
        }
        for message in messages {
            self.client
                .post(&self.webhook_url)
                .json(message)
                .send()
                .await?
                .error_for_status()?;
        }
        Ok(())
    }

    /// Returns whether every batch was delivered.
    pub async fn send_message(&self, content: Option<String>, embeds: Vec<Embed>) -> bool {
        let messages = build_messages(content, embeds);
        if messages.is_empty() {
            return true;
        }

        match self.post_all(&messages).await {
            Ok(()) => {
                info!(messages = messages.len(), "webhook message sent");
                true
            }
            Err(NotifyError::NotConfigured) => {
                warn!("webhook url is not configured, skipping message");
                false
            }
            Err(e) => {
                error!(error = %e, "failed to send webhook message");
                false
            }
        }
    }

    pub async fn send_text(&self, text: impl Into<String>) -> bool {
        self.send_message(Some(text.into()), Vec::new()).await
    }

    pub async fn send_embeds(&self, embeds: Vec<Embed>) -> bool {
        self.send_message(None, embeds).await
    }

    /// Posts the full daily report in order. Every part is attempted even if
    /// an earlier one fails.
    pub async fn send_daily_report(&self, report: &DailyReport<'_>, generated_at: DateTime<FixedOffset>) -> bool {
        let mut ok = true;
        for part in daily_report_parts(report, generated_at) {
            ok &= self.send_message(part.content, part.embeds).await;
        }
        ok
    }
}

// MESSAGE BUILDERS

pub fn trend_color(trend: TrendDirection) -> u32 {
    if trend.is_bullish() {
        COLOR_BULLISH
    } else if trend.is_bearish() {
        COLOR_BEARISH
    } else {
        COLOR_NEUTRAL
    }
}

pub fn direction_color(direction: PredictionDirection) -> u32 {
    if direction.is_up() {
        COLOR_BULLISH
    } else if direction.is_down() {
        COLOR_BEARISH
    } else {
        COLOR_NEUTRAL
    }
}

/// `1234567.891` -> `1,234,567.89`
pub fn format_thousands(value: f64, decimals: usize) -> String {
    let formatted = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match formatted.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (formatted.as_str(), None),
    };

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if value < 0.0 && formatted.chars().any(|c| c != '0' && c != '.') {
        "-"
    } else {
        ""
    };
    match frac_part {
        Some(frac) => format!("{}{}.{}", sign, grouped, frac),
        None => format!("{}{}", sign, grouped),
    }
}

fn signed_thousands(value: f64) -> String {
    if value >= 0.0 {
        format!("+{}", format_thousands(value, 2))
    } else {
        format_thousands(value, 2)
    }
}

fn bullets(items: &[String]) -> String {
    items.iter().map(|item| format!("• {}", item)).collect::<Vec<_>>().join("\n")
}

fn timestamp(at: DateTime<FixedOffset>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

pub fn market_analysis_embeds(
    analyses: &[MarketAnalysis],
    market_name: &str,
    generated_at: DateTime<FixedOffset>,
) -> Vec<Embed> {
    let mut embeds = vec![
        Embed::new(format!("📊 {} Market Analysis", market_name), COLOR_INFO)
            .description(format!("Updated: {}", timestamp(generated_at))),
    ];

    for analysis in analyses {
        embeds.push(
            Embed::new(format!("{} {}", analysis.trend.emoji(), analysis.name), trend_color(analysis.trend))
                .field("Close", format_thousands(analysis.current_price, 2), true)
                .field(
                    "Change",
                    format!("{} ({:+.2}%)", signed_thousands(analysis.price_change), analysis.price_change_pct),
                    true,
                )
                .field("Trend", format!("{} (score {})", analysis.trend.label(), analysis.trend_score), true)
                .field(
                    "Indicators",
                    format!(
                        "RSI: {:.1}\nMACD hist: {:+.2}\nVolume: {:.1}x",
                        analysis.rsi, analysis.macd_histogram, analysis.volume_ratio
                    ),
                    true,
                )
                .field(
                    "Moving averages",
                    format!(
                        "Short: {}\nMedium: {}\nLong: {}",
                        format_thousands(analysis.sma_short, 2),
                        format_thousands(analysis.sma_medium, 2),
                        format_thousands(analysis.sma_long, 2)
                    ),
                    true,
                )
                .field(
                    "Support / Resistance",
                    format!(
                        "Support: {}\nResistance: {}",
                        format_thousands(analysis.support_level, 2),
                        format_thousands(analysis.resistance_level, 2)
                    ),
                    true,
                )
                .field("📝 Summary", analysis.summary.clone(), false),
        );
    }
    embeds
}

pub fn sector_ranking_embeds(
    sectors: &[SectorAnalysis],
    market_name: &str,
    generated_at: DateTime<FixedOffset>,
) -> Vec<Embed> {
    let mut embeds = vec![
        Embed::new(format!("🏭 {} Sector Strength", market_name), COLOR_INFO).description(format!(
            "Updated: {}\nRanked by strength score, higher is stronger",
            timestamp(generated_at)
        )),
    ];

    let lines: Vec<String> = sectors
        .iter()
        .take(RANKED_SECTORS)
        .enumerate()
        .map(|(i, sector)| {
            format!(
                "{}. {} **{}** | Strength: {:.0} | Change: {:+.2}%",
                i + 1,
                sector.trend.emoji(),
                sector.name,
                sector.strength_score,
                sector.avg_change_pct
            )
        })
        .collect();
    embeds.push(Embed::new("📊 Sector Ranking", COLOR_INFO).description(lines.join("\n")));

    for sector in sectors
        .iter()
        .filter(|s| s.strength_score >= DETAIL_STRENGTH)
        .take(DETAILED_SECTORS)
    {
        let stocks: Vec<String> = sector
            .top_stocks
            .iter()
            .take(3)
            .map(|stock| {
                format!(
                    "• **{}** {}\n  Change: {:+.2}% | Strength: {:.0}\n  {}",
                    stock.symbol, stock.name, stock.price_change_pct, stock.strength_score, stock.note
                )
            })
            .collect();

        embeds.push(
            Embed::new(format!("🔥 Strong sector: {}", sector.name), COLOR_BULLISH)
                .description(stocks.join("\n"))
                .field(
                    "Sector stats",
                    format!(
                        "Avg change: {:+.2}% | Bullish: {}/{}",
                        sector.avg_change_pct, sector.bullish_count, sector.stock_count
                    ),
                    false,
                ),
        );
    }
    embeds
}

pub fn stock_recommendation_embeds(
    stocks: &[StockAnalysis],
    title: &str,
    generated_at: DateTime<FixedOffset>,
) -> Vec<Embed> {
    let mut embeds = vec![Embed::new(format!("💎 {}", title), COLOR_INFO).description(format!(
        "Updated: {}\nStocks that passed the strength screen",
        timestamp(generated_at)
    ))];

    for stock in stocks.iter().take(MAX_LISTED_STOCKS) {
        let (icon, color) = if stock.buy_signal {
            ("🔥", COLOR_BULLISH)
        } else {
            ("📈", COLOR_INFO)
        };
        let signal = if stock.buy_signal { "✅ Buy signal " } else { "" };

        embeds.push(
            Embed::new(format!("{} {} - {}", icon, stock.symbol, stock.name), color)
                .field("Price", format_thousands(stock.current_price, 2), true)
                .field("Change", format!("{:+.2}%", stock.price_change_pct), true)
                .field("Strength", format!("{:.0}/100", stock.strength_score), true)
                .field("RSI", format!("{:.1}", stock.rsi), true)
                .field("Volume", format!("{:.1}x", stock.volume_ratio), true)
                .field("Sector", stock.sector.clone(), true)
                .field("Analysis", format!("{}{}", signal, stock.note), false),
        );
    }
    embeds
}

pub fn prediction_embed(prediction: &PricePrediction) -> Embed {
    let levels = |values: &[f64]| {
        values
            .iter()
            .take(3)
            .map(|v| format_thousands(*v, 2))
            .collect::<Vec<_>>()
            .join(" / ")
    };

    Embed::new(
        format!(
            "{} {} - {} Outlook",
            prediction.direction.emoji(),
            prediction.symbol,
            prediction.name
        ),
        direction_color(prediction.direction),
    )
    .field("Price", format_thousands(prediction.current_price, 2), true)
    .field("Direction", prediction.direction.label(), true)
    .field("Confidence", prediction.confidence.label(), true)
    .field(
        "Target range",
        format!(
            "{} ~ {}",
            format_thousands(prediction.target_low, 2),
            format_thousands(prediction.target_high, 2)
        ),
        true,
    )
    .field("Horizon", prediction.time_horizon.clone(), true)
    .field("Risk", prediction.risk_warning.clone(), true)
    .field("Key factors", bullets(&prediction.key_factors), false)
    .field("Support", levels(&prediction.support_levels), true)
    .field("Resistance", levels(&prediction.resistance_levels), true)
    .footer(PREDICTION_FOOTER)
}

pub fn outlook_embed(outlook: &MarketOutlook, generated_at: DateTime<FixedOffset>) -> Embed {
    Embed::new(
        format!("{} {} Market Outlook", outlook.direction.emoji(), outlook.market_name),
        direction_color(outlook.direction),
    )
    .description(format!("Updated: {}", timestamp(generated_at)))
    .field("Direction", outlook.direction.label(), true)
    .field("Confidence", outlook.confidence.label(), true)
    .field("Risk level", outlook.risk_level.clone(), true)
    .field("📊 Observations", bullets(&outlook.observations), false)
    .field("📈 Bullish factors", bullets(&outlook.bullish_factors), true)
    .field("📉 Bearish factors", bullets(&outlook.bearish_factors), true)
    .field("💡 Strategy", outlook.strategy.clone(), false)
    .footer(OUTLOOK_FOOTER)
}

/// Radar embeds for discovered movers across markets, strongest first.
/// Empty when nothing was discovered.
pub fn discovery_embeds(movers: &[&[StockAnalysis]], generated_at: DateTime<FixedOffset>) -> Vec<Embed> {
    let mut all: Vec<&StockAnalysis> = movers.iter().flat_map(|m| m.iter()).collect();
    if all.is_empty() {
        return Vec::new();
    }
    all.sort_by(|a, b| by_strength_desc(a, b));

    let mut embeds = vec![
        Embed::new("📡 Market Radar: today's volume and momentum leaders", COLOR_INFO).description(format!(
            "Updated: {}\nStocks outside the watchlist with expanding volume and leading momentum",
            timestamp(generated_at)
        )),
    ];

    for stock in all.into_iter().take(MAX_LISTED_STOCKS) {
        let color = if stock.buy_signal { COLOR_BULLISH } else { COLOR_INFO };
        embeds.push(
            Embed::new(format!("📡 {} - {}", stock.symbol, stock.name), color)
                .field("Price", format_thousands(stock.current_price, 2), true)
                .field("Change", format!("{:+.2}%", stock.price_change_pct), true)
                .field("Strength", format!("{:.0}/100", stock.strength_score), true)
                .field("Volume", format!("{:.1}x", stock.volume_ratio), true)
                .field("RSI", format!("{:.1}", stock.rsi), true)
                .field("Analysis", stock.note.clone(), false),
        );
    }
    embeds
}

pub struct MarketSection<'a> {
    pub name: &'a str,
    pub indices: &'a [MarketAnalysis],
    pub sectors: &'a [SectorAnalysis],
    pub outlook: Option<&'a MarketOutlook>,
}

pub struct DailyReport<'a> {
    pub markets: Vec<MarketSection<'a>>,
    pub top_stocks: &'a [StockAnalysis],
}

/// One message (possibly several batches) per report section.
pub fn daily_report_parts(report: &DailyReport<'_>, generated_at: DateTime<FixedOffset>) -> Vec<WebhookMessage> {
    let text = |content: String| WebhookMessage {
        content: Some(content),
        embeds: Vec::new(),
    };
    let embeds = |embeds: Vec<Embed>| WebhookMessage { content: None, embeds };

    let mut parts = vec![text(format!(
        "# 📈 {} Daily Market Report\n---",
        generated_at.format("%Y-%m-%d")
    ))];

    for market in report.markets.iter().filter(|m| !m.indices.is_empty()) {
        parts.push(embeds(market_analysis_embeds(market.indices, market.name, generated_at)));
    }
    for market in report.markets.iter().filter(|m| !m.sectors.is_empty()) {
        parts.push(embeds(sector_ranking_embeds(market.sectors, market.name, generated_at)));
    }
    for outlook in report.markets.iter().filter_map(|m| m.outlook) {
        parts.push(embeds(vec![outlook_embed(outlook, generated_at)]));
    }
    if !report.top_stocks.is_empty() {
        parts.push(embeds(stock_recommendation_embeds(
            report.top_stocks,
            "Today's Strongest Stocks",
            generated_at,
        )));
    }

    parts.push(text(DISCLAIMER.to_string()));
    parts
}
