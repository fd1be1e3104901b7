use chrono::{DateTime, FixedOffset};
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};

use crate::market_analyzer::MarketAnalysis;
use crate::notifier::format_thousands;
use crate::predictor::{MarketOutlook, PricePrediction};
use crate::sector_scanner::{SectorAnalysis, StockAnalysis};

/// Brightness in 0.4 ..= 1.0 relative to the strongest row.
fn get_visibility_ratio(current: f64, top: f64) -> f64 {
    let top = if top == 0.0 { 1.0 } else { top };
    (0.4 + 0.6 * (current / top)).clamp(0.4, 1.0)
}

fn shade(ratio: f64, r: f64, g: f64, b: f64) -> Color {
    Color::Rgb {
        r: (r * ratio) as u8,
        g: (g * ratio) as u8,
        b: (b * ratio) as u8,
    }
}

fn change_color(pct: f64) -> Color {
    if pct > 0.0 {
        Color::Green
    } else if pct < 0.0 {
        Color::Red
    } else {
        Color::Yellow
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn right(text: String) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

pub fn indices_table(indices: &[MarketAnalysis]) -> Table {
    let mut table = new_table(&["Index", "Close", "Change", "Trend", "RSI", "MACD hist", "Volume"]);
    for index in indices {
        table.add_row(vec![
            Cell::new(&index.name).fg(Color::Cyan),
            right(format_thousands(index.current_price, 2)),
            right(format!("{:+.2}%", index.price_change_pct)).fg(change_color(index.price_change_pct)),
            Cell::new(format!("{} {} ({})", index.trend.emoji(), index.trend.label(), index.trend_score)),
            right(format!("{:.1}", index.rsi)),
            right(format!("{:+.2}", index.macd_histogram)),
            right(format!("{:.1}x", index.volume_ratio)),
        ]);
    }
    table
}

pub fn sector_table(sectors: &[SectorAnalysis]) -> Table {
    let mut table = new_table(&["Rank", "Sector", "Strength", "Avg change", "Bullish", "Leader"]);
    let top = sectors.first().map(|s| s.strength_score).unwrap_or(1.0);

    for (i, sector) in sectors.iter().enumerate() {
        let ratio = get_visibility_ratio(sector.strength_score, top);
        let leader = sector
            .top_stocks
            .first()
            .map(|s| s.symbol.clone())
            .unwrap_or_else(|| "N/A".to_string());

        table.add_row(vec![
            Cell::new(i + 1).fg(Color::DarkGrey),
            Cell::new(format!("{} {}", sector.trend.emoji(), sector.name)).fg(shade(ratio, 0.0, 255.0, 255.0)),
            right(format!("{:.0}", sector.strength_score)).fg(shade(ratio, 0.0, 255.0, 0.0)),
            right(format!("{:+.2}%", sector.avg_change_pct)).fg(change_color(sector.avg_change_pct)),
            right(format!("{}/{}", sector.bullish_count, sector.stock_count)),
            Cell::new(leader).fg(shade(ratio, 150.0, 150.0, 150.0)),
        ]);
    }
    table
}

pub fn stock_table(stocks: &[StockAnalysis]) -> Table {
    let mut table = new_table(&["Symbol", "Name", "Sector", "Price", "Change", "Strength", "RSI", "Volume", "Note"]);
    let top = stocks.first().map(|s| s.strength_score).unwrap_or(1.0);

    for stock in stocks {
        let ratio = get_visibility_ratio(stock.strength_score, top);
        let symbol = if stock.buy_signal {
            format!("✅ {}", stock.symbol)
        } else {
            stock.symbol.clone()
        };

        table.add_row(vec![
            Cell::new(symbol).fg(shade(ratio, 0.0, 255.0, 255.0)),
            Cell::new(&stock.name),
            Cell::new(&stock.sector).fg(Color::DarkGrey),
            right(format_thousands(stock.current_price, 2)),
            right(format!("{:+.2}%", stock.price_change_pct)).fg(change_color(stock.price_change_pct)),
            right(format!("{:.0}", stock.strength_score)).fg(shade(ratio, 0.0, 255.0, 0.0)),
            right(format!("{:.1}", stock.rsi)),
            right(format!("{:.1}x", stock.volume_ratio)),
            Cell::new(&stock.note),
        ]);
    }
    table
}

pub fn outlook_table(outlook: &MarketOutlook) -> Table {
    let mut table = new_table(&["Item", "Value"]);
    let list = |items: &[String]| {
        if items.is_empty() {
            "None".to_string()
        } else {
            items.join("\n")
        }
    };

    table.add_row(vec![
        Cell::new("Direction"),
        Cell::new(format!("{} {}", outlook.direction.emoji(), outlook.direction.label())),
    ]);
    table.add_row(vec![Cell::new("Confidence"), Cell::new(outlook.confidence.label())]);
    table.add_row(vec![Cell::new("Risk level"), Cell::new(&outlook.risk_level)]);
    table.add_row(vec![Cell::new("Observations"), Cell::new(list(&outlook.observations))]);
    table.add_row(vec![
        Cell::new("Bullish factors"),
        Cell::new(list(&outlook.bullish_factors)).fg(Color::Green),
    ]);
    table.add_row(vec![
        Cell::new("Bearish factors"),
        Cell::new(list(&outlook.bearish_factors)).fg(Color::Red),
    ]);
    table.add_row(vec![Cell::new("Strategy"), Cell::new(&outlook.strategy).add_attribute(Attribute::Bold)]);
    table
}

pub fn prediction_table(prediction: &PricePrediction) -> Table {
    let mut table = new_table(&["Item", "Value"]);
    let levels = |values: &[f64]| {
        values
            .iter()
            .map(|v| format_thousands(*v, 2))
            .collect::<Vec<_>>()
            .join(" / ")
    };

    let rows = [
        ("Price", format_thousands(prediction.current_price, 2)),
        (
            "Direction",
            format!("{} {}", prediction.direction.emoji(), prediction.direction.label()),
        ),
        ("Confidence", prediction.confidence.label().to_string()),
        (
            "Target range",
            format!(
                "{} ~ {}",
                format_thousands(prediction.target_low, 2),
                format_thousands(prediction.target_high, 2)
            ),
        ),
        ("Support", levels(&prediction.support_levels)),
        ("Resistance", levels(&prediction.resistance_levels)),
        ("Key factors", prediction.key_factors.join("\n")),
        ("Risk", prediction.risk_warning.clone()),
        ("Horizon", prediction.time_horizon.clone()),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    table
}

pub fn heading(title: &str, generated_at: DateTime<FixedOffset>) -> String {
    format!("\n{} (data taken at {})", title, generated_at.format("%Y-%m-%d %H:%M %:z"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::market_outlook;
    use crate::sector_scanner::summarize_sector;
    use crate::sector_scanner::tests::stock;
    use chrono::TimeZone;

    #[test]
    fn visibility_ratio_is_bounded() {
        assert_eq!(get_visibility_ratio(80.0, 80.0), 1.0);
        assert!((get_visibility_ratio(40.0, 80.0) - 0.7).abs() < 1e-9);
        assert_eq!(get_visibility_ratio(-10.0, 80.0), 0.4);
        assert_eq!(get_visibility_ratio(5.0, 0.0), 1.0);
    }

    #[test]
    fn sector_table_lists_every_sector() {
        let sectors = vec![
            summarize_sector("Chips", vec![stock("2330.TW", 80.0, true)]),
            summarize_sector("Banks", Vec::new()),
        ];
        let table = sector_table(&sectors);
        assert_eq!(table.row_iter().count(), 2);
        let rendered = table.to_string();
        assert!(rendered.contains("Chips"));
        assert!(rendered.contains("2330.TW"));
        assert!(rendered.contains("N/A"));
    }

    #[test]
    fn stock_table_marks_buy_signals() {
        let rendered = stock_table(&[stock("NVDA", 90.0, true), stock("AMD", 45.0, false)]).to_string();
        assert!(rendered.contains("✅ NVDA"));
        assert!(rendered.contains("AMD"));
    }

    #[test]
    fn outlook_table_shows_strategy() {
        let rendered = outlook_table(&market_outlook("US", None, &[])).to_string();
        assert!(rendered.contains("Range trade"));
        assert!(rendered.contains("None"));
    }

    #[test]
    fn heading_includes_offset() {
        let at = FixedOffset::east_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 5, 6, 14, 30, 0)
            .unwrap();
        assert_eq!(heading("Taiwan", at), "\nTaiwan (data taken at 2024-05-06 14:30 +08:00)");
    }
}
