use crate::sector_scanner::StockAnalysis;

pub struct MomentumFilter {
    pub min_volume_ratio: f64,
    pub fallback_volume_ratio: f64,
    pub min_results: usize,
}

pub fn matches_filter(stock: &StockAnalysis, min_volume_ratio: f64) -> bool {
    // Both conditions are strict: a flat day or average volume does not count.
    stock.volume_ratio > min_volume_ratio && stock.price_change_pct > 0.0
}

impl MomentumFilter {
    /// Keeps rising stocks on expanding volume. When the strict ratio leaves
    /// fewer than `min_results`, the fallback ratio is used instead.
    /// Input order is preserved.
    pub fn apply(&self, stocks: &[StockAnalysis]) -> Vec<StockAnalysis> {
        let strict: Vec<StockAnalysis> = stocks
            .iter()
            .filter(|s| matches_filter(s, self.min_volume_ratio))
            .cloned()
            .collect();

        if strict.len() >= self.min_results {
            return strict;
        }

        stocks
            .iter()
            .filter(|s| matches_filter(s, self.fallback_volume_ratio))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sector_scanner::tests::stock;

    fn mover(symbol: &str, volume_ratio: f64, change: f64) -> StockAnalysis {
        let mut s = stock(symbol, 60.0, false);
        s.volume_ratio = volume_ratio;
        s.price_change_pct = change;
        s
    }

    fn filter() -> MomentumFilter {
        MomentumFilter {
            min_volume_ratio: 1.5,
            fallback_volume_ratio: 1.0,
            min_results: 3,
        }
    }

    #[test]
    fn requires_positive_change_and_volume() {
        assert!(matches_filter(&mover("A", 1.6, 0.5), 1.5));
        assert!(!matches_filter(&mover("A", 1.5, 0.5), 1.5));
        assert!(!matches_filter(&mover("A", 3.0, 0.0), 1.5));
        assert!(!matches_filter(&mover("A", 3.0, -1.0), 1.5));
    }

    #[test]
    fn strict_filter_when_enough_results() {
        let stocks = vec![
            mover("A", 2.0, 1.0),
            mover("B", 1.2, 1.0),
            mover("C", 1.8, 2.0),
            mover("D", 1.6, 0.1),
        ];
        let kept: Vec<String> = filter().apply(&stocks).into_iter().map(|s| s.symbol).collect();
        assert_eq!(kept, vec!["A", "C", "D"]);
    }

    #[test]
    fn relaxes_to_fallback_ratio() {
        let stocks = vec![
            mover("A", 2.0, 1.0),
            mover("B", 1.2, 1.0),
            mover("C", 0.9, 2.0),
            mover("D", 1.1, -0.5),
        ];
        let kept: Vec<String> = filter().apply(&stocks).into_iter().map(|s| s.symbol).collect();
        assert_eq!(kept, vec!["A", "B"]);
    }
}
