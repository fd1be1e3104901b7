use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// In-memory map whose entries expire a fixed time after insertion.
pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub fn insert(&self, key: String, value: V) {
        self.insert_at(key, value, Instant::now());
    }

    fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if now < entry.expires_at => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    fn insert_at(&self, key: String, value: V, now: Instant) {
        let expires_at = now + self.ttl;
        self.entries.lock().insert(key, Entry { value, expires_at });
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entries_expire_after_ttl() {
        let cache = TtlCache::new(Duration::from_secs(900));
        let start = Instant::now();
        cache.insert_at("AAPL_3mo_1d".into(), 1u32, start);

        assert_eq!(cache.get_at("AAPL_3mo_1d", start + Duration::from_secs(899)), Some(1));
        assert_eq!(cache.get_at("AAPL_3mo_1d", start + Duration::from_secs(900)), None);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.insert("a".into(), "x".to_string());
        cache.insert("b".into(), "y".to_string());
        assert_eq!(cache.get("a").as_deref(), Some("x"));
        cache.clear();
        assert!(cache.get("b").is_none());
    }
}
