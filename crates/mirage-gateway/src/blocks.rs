//! Attacker block table with per-entry round-robin state.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use mirage_common::{GatewayStats, MirageError};

/// One blocked source address and its decoy set.
///
/// The counter is process-local and resets on restart; the modulo in
/// [`BlockEntry::select`] keeps selection well-defined across wraparound.
#[derive(Debug)]
pub struct BlockEntry {
    pub source_ip: String,
    pub decoy_urls: Vec<String>,
    pub blocked_at: DateTime<Utc>,
    counter: AtomicU64,
}

impl BlockEntry {
    fn new(source_ip: String, decoy_urls: Vec<String>) -> Self {
        Self {
            source_ip,
            decoy_urls,
            blocked_at: Utc::now(),
            counter: AtomicU64::new(0),
        }
    }

    /// Pick the next decoy URL. The k-th selection (0-indexed) returns
    /// `decoy_urls[k mod len]`; the returned count is k+1, for logging.
    pub fn select(&self) -> (&str, u64) {
        let k = self.counter.fetch_add(1, Ordering::Relaxed);
        let url = &self.decoy_urls[(k % self.decoy_urls.len() as u64) as usize];
        (url, k.wrapping_add(1))
    }

    #[cfg(test)]
    fn set_counter(&self, value: u64) {
        self.counter.store(value, Ordering::Relaxed);
    }
}

/// Block table: many readers (every proxied request), rare writers
/// (control API). Counter advancement happens inside the entry so the hot
/// path never takes the table write lock.
pub struct BlockTable {
    entries: RwLock<HashMap<String, Arc<BlockEntry>>>,
}

impl BlockTable {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Install or overwrite the block entry for an address. Overwriting
    /// discards the previous selection history: the counter restarts at 0.
    pub async fn install(
        &self,
        source_ip: String,
        decoy_urls: Vec<String>,
    ) -> Result<(), MirageError> {
        if source_ip.is_empty() {
            return Err(MirageError::InvalidInput("source_ip is required".into()));
        }
        if decoy_urls.is_empty() {
            return Err(MirageError::InvalidInput(
                "decoy_urls array is required".into(),
            ));
        }
        for url in &decoy_urls {
            let parsed = reqwest::Url::parse(url)
                .map_err(|e| MirageError::InvalidInput(format!("invalid decoy URL {url}: {e}")))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(MirageError::InvalidInput(format!(
                    "unsupported decoy URL scheme: {url}"
                )));
            }
        }

        let entry = Arc::new(BlockEntry::new(source_ip.clone(), decoy_urls.clone()));
        self.entries.write().await.insert(source_ip.clone(), entry);

        tracing::info!(
            action = "block_ip",
            source_ip = %source_ip,
            decoy_urls = ?decoy_urls,
            "Block entry installed"
        );

        Ok(())
    }

    /// Remove the entry for an address. Returns whether one was present;
    /// clearing an unknown address is a no-op.
    pub async fn clear(&self, source_ip: &str) -> bool {
        let removed = self.entries.write().await.remove(source_ip).is_some();

        if removed {
            tracing::info!(
                action = "cleanup_ip",
                source_ip = %source_ip,
                "Block entry removed"
            );
        }

        removed
    }

    /// Look up the entry for an address, if blocked.
    pub async fn lookup(&self, source_ip: &str) -> Option<Arc<BlockEntry>> {
        self.entries.read().await.get(source_ip).cloned()
    }

    pub async fn stats(&self) -> GatewayStats {
        let entries = self.entries.read().await;
        GatewayStats {
            total_blocked_ips: entries.len(),
            blocked_ips: entries.keys().cloned().collect(),
        }
    }
}

impl Default for BlockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn urls() -> Vec<String> {
        vec![
            "http://d1".to_string(),
            "http://d2".to_string(),
            "http://d3".to_string(),
        ]
    }

    #[tokio::test]
    async fn test_round_robin_rotation() {
        let table = BlockTable::new();
        table.install("10.0.0.9".into(), urls()).await.unwrap();

        let entry = table.lookup("10.0.0.9").await.unwrap();
        let picked: Vec<String> = (0..7).map(|_| entry.select().0.to_string()).collect();

        assert_eq!(
            picked,
            vec![
                "http://d1", "http://d2", "http://d3", "http://d1", "http://d2", "http://d3",
                "http://d1"
            ]
        );
    }

    #[tokio::test]
    async fn test_reinstall_resets_counter() {
        let table = BlockTable::new();
        table.install("10.0.0.9".into(), urls()).await.unwrap();

        let entry = table.lookup("10.0.0.9").await.unwrap();
        entry.select();
        entry.select();

        let replacement = vec!["http://e1".to_string(), "http://e2".to_string()];
        table
            .install("10.0.0.9".into(), replacement)
            .await
            .unwrap();

        let entry = table.lookup("10.0.0.9").await.unwrap();
        let (url, count) = entry.select();
        assert_eq!(url, "http://e1");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let table = BlockTable::new();
        table.install("10.0.0.9".into(), urls()).await.unwrap();

        assert!(table.clear("10.0.0.9").await);
        assert!(!table.clear("10.0.0.9").await);
        assert!(table.lookup("10.0.0.9").await.is_none());
    }

    #[tokio::test]
    async fn test_install_rejects_empty_and_malformed() {
        let table = BlockTable::new();

        assert!(table.install("10.0.0.9".into(), vec![]).await.is_err());
        assert!(table
            .install("10.0.0.9".into(), vec!["not a url".to_string()])
            .await
            .is_err());
        assert!(table
            .install("10.0.0.9".into(), vec!["ftp://d1".to_string()])
            .await
            .is_err());

        // Failed installs must not leave partial state behind
        assert!(table.lookup("10.0.0.9").await.is_none());
        assert_eq!(table.stats().await.total_blocked_ips, 0);
    }

    #[tokio::test]
    async fn test_counter_wraparound() {
        let table = BlockTable::new();
        table.install("10.0.0.9".into(), urls()).await.unwrap();

        let entry = table.lookup("10.0.0.9").await.unwrap();
        entry.set_counter(u64::MAX);

        // u64::MAX % 3 == 0, and the next fetch_add wraps without panicking
        let (url, _) = entry.select();
        assert_eq!(url, "http://d1");
        let (url, count) = entry.select();
        assert_eq!(url, "http://d1");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_stats_lists_addresses() {
        let table = BlockTable::new();
        table.install("10.0.0.9".into(), urls()).await.unwrap();
        table.install("10.0.0.10".into(), urls()).await.unwrap();

        let stats = table.stats().await;
        assert_eq!(stats.total_blocked_ips, 2);
        assert!(stats.blocked_ips.contains(&"10.0.0.9".to_string()));
        assert!(stats.blocked_ips.contains(&"10.0.0.10".to_string()));
    }
}
