//! Tracked markets, their indices and the sector watchlists (storage/stocks.json).

use anyhow::{Result, bail};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::LazyLock;

static SYMBOL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Z0-9^][A-Z0-9.=^-]*$").expect("static regex"));

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MarketId {
    Tw,
    Us,
}

impl MarketId {
    pub fn key(self) -> &'static str {
        match self {
            MarketId::Tw => "tw",
            MarketId::Us => "us",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IndexConfig {
    pub symbol: String,
    pub name: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SectorConfig {
    pub name: String,
    pub symbols: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MarketConfig {
    pub name: String,
    /// Appended to bare tickers, e.g. "2330" -> "2330.TW".
    #[serde(default)]
    pub symbol_suffix: Option<String>,
    /// Index that drives the market outlook.
    pub primary_index: String,
    pub indices: Vec<IndexConfig>,
    pub sectors: Vec<SectorConfig>,
}

impl MarketConfig {
    pub fn sector(&self, name: &str) -> Option<&SectorConfig> {
        self.sectors.iter().find(|s| s.name == name)
    }

    pub fn index(&self, symbol: &str) -> Option<&IndexConfig> {
        self.indices.iter().find(|i| i.symbol == symbol)
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.sectors
            .iter()
            .flat_map(|s| s.symbols.iter().cloned())
            .collect()
    }

    pub fn normalize_symbol(&self, raw: &str) -> Result<String> {
        let mut symbol = raw.trim().to_uppercase();
        if symbol.is_empty() {
            bail!("stock symbol must not be empty");
        }
        if let Some(suffix) = &self.symbol_suffix {
            if !symbol.ends_with(suffix.as_str()) {
                symbol.push_str(suffix);
            }
        }
        if !SYMBOL_RE.is_match(&symbol) {
            bail!("invalid stock symbol: {:?}", raw);
        }
        Ok(symbol)
    }

    /// Adds `symbol` to `sector`, creating the sector when needed.
    /// Returns false when the symbol is already listed there.
    pub fn add_stock(&mut self, sector: &str, symbol: &str) -> Result<bool> {
        let symbol = self.normalize_symbol(symbol)?;
        let sector = sector.trim();
        if sector.is_empty() {
            bail!("sector name must not be empty");
        }

        match self.sectors.iter_mut().find(|s| s.name == sector) {
            Some(existing) if existing.symbols.contains(&symbol) => Ok(false),
            Some(existing) => {
                existing.symbols.push(symbol);
                Ok(true)
            }
            None => {
                self.sectors.push(SectorConfig {
                    name: sector.to_string(),
                    symbols: vec![symbol],
                });
                Ok(true)
            }
        }
    }

    pub fn remove_stock(&mut self, sector: &str, symbol: &str) -> Result<bool> {
        let symbol = self.normalize_symbol(symbol)?;
        let Some(existing) = self.sectors.iter_mut().find(|s| s.name == sector.trim()) else {
            return Ok(false);
        };
        let before = existing.symbols.len();
        existing.symbols.retain(|s| *s != symbol);
        Ok(existing.symbols.len() != before)
    }

    pub fn add_sector(&mut self, name: &str, symbols: &[String]) -> Result<bool> {
        let name = name.trim();
        if name.is_empty() {
            bail!("sector name must not be empty");
        }
        if self.sector(name).is_some() {
            return Ok(false);
        }

        let mut normalized: Vec<String> = Vec::with_capacity(symbols.len());
        for raw in symbols {
            let symbol = self.normalize_symbol(raw)?;
            if !normalized.contains(&symbol) {
                normalized.push(symbol);
            }
        }

        self.sectors.push(SectorConfig {
            name: name.to_string(),
            symbols: normalized,
        });
        Ok(true)
    }

    pub fn remove_sector(&mut self, name: &str) -> bool {
        let before = self.sectors.len();
        self.sectors.retain(|s| s.name != name.trim());
        self.sectors.len() != before
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Watchlist {
    pub tw: MarketConfig,
    pub us: MarketConfig,
}

impl Watchlist {
    pub fn market(&self, id: MarketId) -> &MarketConfig {
        match id {
            MarketId::Tw => &self.tw,
            MarketId::Us => &self.us,
        }
    }

    pub fn market_mut(&mut self, id: MarketId) -> &mut MarketConfig {
        match id {
            MarketId::Tw => &mut self.tw,
            MarketId::Us => &mut self.us,
        }
    }
}

fn index(symbol: &str, name: &str) -> IndexConfig {
    IndexConfig {
        symbol: symbol.to_string(),
        name: name.to_string(),
    }
}

fn sector(name: &str, symbols: &[&str]) -> SectorConfig {
    SectorConfig {
        name: name.to_string(),
        symbols: symbols.iter().map(|s| s.to_string()).collect(),
    }
}

impl Default for Watchlist {
    fn default() -> Self {
        Self {
            tw: MarketConfig {
                name: "Taiwan".to_string(),
                symbol_suffix: Some(".TW".to_string()),
                primary_index: "^TWII".to_string(),
                indices: vec![index("^TWII", "TAIEX")],
                sectors: vec![
                    sector("Semiconductors", &["2330.TW", "2454.TW", "2303.TW", "3711.TW", "2379.TW"]),
                    sector("Electronic Components", &["2317.TW", "2382.TW", "3008.TW", "2408.TW", "2327.TW"]),
                    sector("Financials", &["2881.TW", "2882.TW", "2883.TW", "2884.TW", "2891.TW"]),
                    sector("Traditional Industry", &["1301.TW", "1303.TW", "1326.TW", "2002.TW", "2105.TW"]),
                    sector("Shipping", &["2603.TW", "2609.TW", "2615.TW", "2618.TW", "5880.TW"]),
                    sector("Biotech & Healthcare", &["4904.TW", "1476.TW", "6446.TW", "4743.TW", "1707.TW"]),
                    sector("Green Energy", &["3481.TW", "6803.TW", "3576.TW", "6443.TW", "6488.TW"]),
                ],
            },
            us: MarketConfig {
                name: "US".to_string(),
                symbol_suffix: None,
                primary_index: "^GSPC".to_string(),
                indices: vec![
                    index("^GSPC", "S&P 500"),
                    index("^DJI", "Dow Jones Industrial Average"),
                    index("^IXIC", "Nasdaq Composite"),
                    index("^SOX", "PHLX Semiconductor"),
                ],
                sectors: vec![
                    sector("Big Tech", &["AAPL", "MSFT", "GOOGL", "AMZN", "META", "NVDA"]),
                    sector("Semiconductors", &["NVDA", "AMD", "INTC", "TSM", "AVGO", "QCOM"]),
                    sector("AI", &["NVDA", "MSFT", "GOOGL", "PLTR", "AI", "SNOW"]),
                    sector("Electric Vehicles", &["TSLA", "RIVN", "LCID", "NIO", "LI", "XPEV"]),
                    sector("Financials", &["JPM", "BAC", "WFC", "GS", "MS", "C"]),
                    sector("Healthcare", &["JNJ", "UNH", "PFE", "ABBV", "MRK", "LLY"]),
                    sector("Energy", &["XOM", "CVX", "COP", "SLB", "EOG", "PXD"]),
                ],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_taiwan_symbols() {
        let list = Watchlist::default();
        assert_eq!(list.tw.normalize_symbol(" 2330 ").unwrap(), "2330.TW");
        assert_eq!(list.tw.normalize_symbol("2330.tw").unwrap(), "2330.TW");
        assert_eq!(list.us.normalize_symbol("brk-b").unwrap(), "BRK-B");
        assert!(list.us.normalize_symbol("").is_err());
        assert!(list.us.normalize_symbol("AA PL").is_err());
    }

    #[test]
    fn add_and_remove_stock() {
        let mut list = Watchlist::default();
        let tw = list.market_mut(MarketId::Tw);

        assert!(tw.add_stock("Semiconductors", "2344").unwrap());
        assert!(!tw.add_stock("Semiconductors", "2344.TW").unwrap());
        assert!(tw.sector("Semiconductors").unwrap().symbols.contains(&"2344.TW".to_string()));

        assert!(tw.add_stock("Robotics", "2049").unwrap());
        assert_eq!(tw.sector("Robotics").unwrap().symbols, vec!["2049.TW"]);

        assert!(tw.remove_stock("Robotics", "2049").unwrap());
        assert!(!tw.remove_stock("Robotics", "2049").unwrap());
        assert!(!tw.remove_stock("Missing", "2049").unwrap());
    }

    #[test]
    fn add_and_remove_sector() {
        let mut list = Watchlist::default();
        let us = list.market_mut(MarketId::Us);

        assert!(!us.add_sector("Energy", &[]).unwrap());
        assert!(us.add_sector("Retail", &["wmt".into(), "COST".into(), "WMT".into()]).unwrap());
        assert_eq!(us.sector("Retail").unwrap().symbols, vec!["WMT", "COST"]);

        assert!(us.remove_sector("Retail"));
        assert!(!us.remove_sector("Retail"));
    }

    #[test]
    fn symbols_are_deduplicated_across_sectors() {
        let list = Watchlist::default();
        let symbols = list.us.symbols();
        assert!(symbols.contains("NVDA"));
        assert_eq!(symbols.iter().filter(|s| s.as_str() == "NVDA").count(), 1);
    }
}
