use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use tracing::debug;

use crate::models::AccountNameMap;

/// Something that can turn an address into a human label.
///
/// Lookups never fail the request: any problem is reported as `None`.
#[async_trait]
pub trait NameLookup: Send + Sync {
    async fn lookup(&self, address: &str) -> Option<String>;
}

/// Process-wide cache of resolved names with TTL expiry and a size bound.
pub struct NameCache {
    entries: DashMap<String, (String, Instant)>,
    capacity: usize,
    ttl: Duration,
}

impl NameCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        NameCache {
            entries: DashMap::new(),
            capacity,
            ttl,
        }
    }

    pub fn get(&self, address: &str) -> Option<String> {
        let expired = match self.entries.get(address) {
            Some(entry) if entry.1.elapsed() < self.ttl => return Some(entry.0.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(address);
        }
        None
    }

    pub fn insert(&self, address: &str, name: &str) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(address) && self.entries.len() >= self.capacity {
            self.evict();
        }
        self.entries
            .insert(address.to_string(), (name.to_string(), Instant::now()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Drop expired entries, then the oldest one if still full
    fn evict(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, (_, inserted)| inserted.elapsed() < ttl);
        if self.entries.len() < self.capacity {
            return;
        }
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().1)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }
}

/// Resolves every unique address at most once, concurrently.
///
/// Cached names are served without a lookup; new successes are written back.
pub async fn resolve_names<L>(
    lookup: &L,
    addresses: impl IntoIterator<Item = String>,
    cache: Option<&NameCache>,
) -> AccountNameMap
where
    L: NameLookup + ?Sized,
{
    let mut names = AccountNameMap::new();
    let mut seen = HashSet::new();
    let mut pending = Vec::new();

    for address in addresses {
        if address.is_empty() || !seen.insert(address.clone()) {
            continue;
        }
        match cache.and_then(|c| c.get(&address)) {
            Some(name) => names.insert(address, name),
            None => pending.push(address),
        }
    }

    let results = join_all(pending.iter().map(|address| lookup.lookup(address))).await;
    for (address, result) in pending.into_iter().zip(results) {
        match result {
            Some(name) => {
                if let Some(cache) = cache {
                    cache.insert(&address, &name);
                }
                names.insert(address, name);
            }
            None => debug!(%address, "No account name available"),
        }
    }

    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl NameLookup for Recording {
        async fn lookup(&self, address: &str) -> Option<String> {
            self.calls.lock().unwrap().push(address.to_string());
            if address.starts_with("0xa") {
                Some(format!("name-{}", address))
            } else {
                None
            }
        }
    }

    fn recording() -> Recording {
        Recording {
            calls: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn each_address_is_looked_up_once() {
        let lookup = recording();
        let names = resolve_names(
            &lookup,
            vec!["0xa1".to_string(), "0xb2".to_string(), "0xa1".to_string()],
            None,
        )
        .await;

        assert_eq!(lookup.calls.lock().unwrap().len(), 2);
        assert_eq!(names.get("0xa1"), Some("name-0xa1"));
        assert!(!names.contains("0xb2"));
    }

    #[tokio::test]
    async fn cached_names_skip_the_lookup() {
        let lookup = recording();
        let cache = NameCache::new(10, Duration::from_secs(60));
        cache.insert("0xb2", "Cached");

        let names = resolve_names(&lookup, vec!["0xb2".to_string()], Some(&cache)).await;
        assert!(lookup.calls.lock().unwrap().is_empty());
        assert_eq!(names.get("0xb2"), Some("Cached"));

        resolve_names(&lookup, vec!["0xa9".to_string()], Some(&cache)).await;
        assert_eq!(cache.get("0xa9").as_deref(), Some("name-0xa9"));
    }

    #[test]
    fn full_cache_evicts_the_oldest_entry() {
        let cache = NameCache::new(2, Duration::from_secs(60));
        cache.insert("first", "1");
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("second", "2");
        cache.insert("third", "3");

        assert_eq!(cache.len(), 2);
        assert!(cache.get("first").is_none());
        assert_eq!(cache.get("third").as_deref(), Some("3"));
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = NameCache::new(4, Duration::from_millis(0));
        cache.insert("addr", "name");
        assert!(cache.get("addr").is_none());
        assert!(cache.is_empty());
    }
}
