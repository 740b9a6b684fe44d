//! In-memory implementations of the persistence ports.
//!
//! The relational store is an external collaborator; this adapter provides
//! the same contract for the binary's default wiring and for tests. Rows live
//! in a mutex-guarded vector; write volume is one row per completed exchange,
//! so contention is not a concern here.
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scc::hash_map::Entry;
use tokio::sync::Mutex;

use crate::ports::{
    credential_store::CredentialStore,
    log_store::{LogStore, NewRequestLog, RequestLog, StoreError},
};

/// Volatile [`LogStore`].
#[derive(Default)]
pub struct MemoryLogStore {
    rows: Mutex<Vec<RequestLog>>,
    next_id: AtomicI64,
}

impl MemoryLogStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

#[async_trait]
impl LogStore for MemoryLogStore {
    async fn insert(&self, log: NewRequestLog) -> Result<RequestLog, StoreError> {
        let row = RequestLog {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            hostname: log.hostname,
            path: log.path,
            method: log.method,
            request_headers: log.request_headers,
            request_body: log.request_body,
            response_status: log.response_status,
            response_headers: log.response_headers,
            response_body: log.response_body,
            created_at: log.created_at,
        };
        self.rows.lock().await.push(row.clone());
        Ok(row)
    }

    async fn find_recent_by_hostname(
        &self,
        hostname: &str,
        limit: usize,
    ) -> Result<Vec<RequestLog>, StoreError> {
        let rows = self.rows.lock().await;
        let mut matched: Vec<RequestLog> = rows
            .iter()
            .filter(|row| row.hostname == hostname)
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        matched.truncate(limit);
        Ok(matched)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<RequestLog>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows.iter().find(|row| row.id == id).cloned())
    }

    async fn delete_by_hostname(&self, hostname: &str) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| row.hostname != hostname);
        Ok((before - rows.len()) as u64)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|row| row.created_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

/// Volatile [`CredentialStore`] keyed on normalized hostname.
#[derive(Default)]
pub struct MemoryCredentialStore {
    passwords: scc::HashMap<String, String>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn upsert(&self, hostname: &str, password: &str) -> Result<(), StoreError> {
        match self.passwords.entry_async(hostname.to_string()).await {
            Entry::Occupied(mut occupied) => {
                *occupied.get_mut() = password.to_string();
            }
            Entry::Vacant(vacant) => {
                vacant.insert_entry(password.to_string());
            }
        }
        Ok(())
    }

    async fn get(&self, hostname: &str) -> Result<Option<String>, StoreError> {
        Ok(self.passwords.read(hostname, |_, password| password.clone()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn row(hostname: &str, path: &str, created_at: DateTime<Utc>) -> NewRequestLog {
        NewRequestLog {
            hostname: hostname.to_string(),
            path: path.to_string(),
            method: "GET".to_string(),
            request_headers: "{}".to_string(),
            request_body: String::new(),
            response_status: Some(200),
            response_headers: "{}".to_string(),
            response_body: String::new(),
            created_at,
        }
    }

    #[tokio::test]
    async fn recent_is_newest_first_with_id_tiebreak() {
        let store = MemoryLogStore::new();
        let now = Utc::now();

        store.insert(row("a.example", "/old", now - Duration::hours(2))).await.unwrap();
        store.insert(row("a.example", "/tie-1", now)).await.unwrap();
        store.insert(row("a.example", "/tie-2", now)).await.unwrap();
        store.insert(row("b.example", "/other", now)).await.unwrap();

        let recent = store.find_recent_by_hostname("a.example", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].path, "/tie-2");
        assert_eq!(recent[1].path, "/tie-1");
    }

    #[tokio::test]
    async fn delete_older_than_is_idempotent() {
        let store = MemoryLogStore::new();
        let now = Utc::now();
        store.insert(row("a.example", "/old", now - Duration::days(20))).await.unwrap();
        store.insert(row("a.example", "/fresh", now)).await.unwrap();

        let cutoff = now - Duration::days(14);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 1);
        assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 0);
        assert_eq!(
            store.find_recent_by_hostname("a.example", 10).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn delete_by_hostname_counts_rows() {
        let store = MemoryLogStore::new();
        let now = Utc::now();
        store.insert(row("a.example", "/1", now)).await.unwrap();
        store.insert(row("a.example", "/2", now)).await.unwrap();
        store.insert(row("b.example", "/3", now)).await.unwrap();

        assert_eq!(store.delete_by_hostname("a.example").await.unwrap(), 2);
        assert!(store.find_by_id(3).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn credentials_upsert_replaces() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get("a.example").await.unwrap(), None);
        store.upsert("a.example", "s3cret").await.unwrap();
        store.upsert("a.example", "rotated").await.unwrap();
        assert_eq!(store.get("a.example").await.unwrap().as_deref(), Some("rotated"));
    }
}
