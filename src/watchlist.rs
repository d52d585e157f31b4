use anyhow::{bail, Context, Result};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::{MediaFilter, MediaType};
use crate::storage::Storage;

pub const STORAGE_KEY: &str = "watchlist";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchlistItem {
    pub id: i32,
    pub media_type: MediaType,
    pub title: String,
    #[serde(default)]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub vote_average: f32,
    #[serde(default)]
    pub added_at: Option<String>,
}

impl WatchlistItem {
    pub fn key(&self) -> (i32, MediaType) {
        (self.id, self.media_type)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatchlistStats {
    pub total: usize,
    pub movies: usize,
    pub tv: usize,
    pub release_years: usize,
}

/// User-curated list keyed by `(id, media_type)`, written back to storage on every change.
pub struct Watchlist {
    items: Vec<WatchlistItem>,
    storage: Arc<dyn Storage>,
}

impl Watchlist {
    pub async fn load(storage: Arc<dyn Storage>) -> Result<Self> {
        let stored = storage
            .load(STORAGE_KEY)
            .await
            .context("Failed to read stored watchlist")?;
        let items = match stored {
            Some(value) => match serde_json::from_value::<Vec<WatchlistItem>>(value) {
                Ok(items) => dedupe(items),
                Err(e) => {
                    warn!("Stored watchlist is unreadable, starting empty: {}", e);
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        info!("Watchlist loaded with {} item(s)", items.len());
        Ok(Self { items, storage })
    }

    pub fn items(&self) -> &[WatchlistItem] {
        &self.items
    }

    pub fn filtered(&self, filter: MediaFilter) -> Vec<WatchlistItem> {
        self.items
            .iter()
            .filter(|i| filter.matches(i.media_type))
            .cloned()
            .collect()
    }

    pub fn contains(&self, id: i32, media_type: MediaType) -> bool {
        self.position(id, media_type).is_some()
    }

    /// Inserts at the end unless the key is already present, in which case the
    /// existing entry is kept untouched. Returns whether anything was inserted.
    pub async fn add(&mut self, mut item: WatchlistItem) -> Result<bool> {
        if item.media_type == MediaType::Person {
            bail!("people cannot be added to the watchlist");
        }
        if self.contains(item.id, item.media_type) {
            return Ok(false);
        }
        if item.added_at.is_none() {
            item.added_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
        }
        info!("Adding {} {} '{}' to watchlist", item.media_type, item.id, item.title);
        self.items.push(item);
        if let Err(e) = self.persist().await {
            self.items.pop();
            return Err(e);
        }
        Ok(true)
    }

    /// Returns whether an entry was removed; a missing key is not an error.
    pub async fn remove(&mut self, id: i32, media_type: MediaType) -> Result<bool> {
        let Some(pos) = self.position(id, media_type) else {
            return Ok(false);
        };
        let removed = self.items.remove(pos);
        info!("Removing {} {} '{}' from watchlist", media_type, id, removed.title);
        if let Err(e) = self.persist().await {
            self.items.insert(pos, removed);
            return Err(e);
        }
        Ok(true)
    }

    /// Flips membership and returns the new state.
    pub async fn toggle(&mut self, item: WatchlistItem) -> Result<bool> {
        if self.contains(item.id, item.media_type) {
            self.remove(item.id, item.media_type).await?;
            Ok(false)
        } else {
            self.add(item).await?;
            Ok(true)
        }
    }

    pub fn stats(&self) -> WatchlistStats {
        let years: HashSet<Option<&str>> = self
            .items
            .iter()
            .map(|i| i.release_date.as_deref().map(|d| d.get(..4).unwrap_or(d)))
            .collect();
        WatchlistStats {
            total: self.items.len(),
            movies: self.count(MediaType::Movie),
            tv: self.count(MediaType::Tv),
            release_years: years.len(),
        }
    }

    fn count(&self, media_type: MediaType) -> usize {
        self.items.iter().filter(|i| i.media_type == media_type).count()
    }

    fn position(&self, id: i32, media_type: MediaType) -> Option<usize> {
        self.items
            .iter()
            .position(|i| i.id == id && i.media_type == media_type)
    }

    async fn persist(&self) -> Result<()> {
        let value = serde_json::to_value(&self.items).context("Failed to serialize watchlist")?;
        self.storage
            .store(STORAGE_KEY, value)
            .await
            .context("Failed to persist watchlist")
    }
}

fn dedupe(items: Vec<WatchlistItem>) -> Vec<WatchlistItem> {
    let mut seen = HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.key())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    fn item(id: i32, media_type: MediaType, title: &str, date: Option<&str>) -> WatchlistItem {
        WatchlistItem {
            id,
            media_type,
            title: title.to_string(),
            poster_path: None,
            release_date: date.map(str::to_string),
            vote_average: 7.5,
            added_at: None,
        }
    }

    async fn empty() -> (Watchlist, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let list = Watchlist::load(storage.clone()).await.unwrap();
        (list, storage)
    }

    #[tokio::test]
    async fn add_is_idempotent_per_key() {
        let (mut list, _) = empty().await;
        assert!(list.add(item(1, MediaType::Movie, "First", None)).await.unwrap());
        assert!(!list.add(item(1, MediaType::Movie, "Renamed", None)).await.unwrap());
        assert_eq!(list.items().len(), 1);
        assert_eq!(list.items()[0].title, "First");
        assert!(list.items()[0].added_at.is_some());
    }

    #[tokio::test]
    async fn same_id_with_other_media_type_is_distinct() {
        let (mut list, _) = empty().await;
        list.add(item(42, MediaType::Movie, "Movie", None)).await.unwrap();
        list.add(item(42, MediaType::Tv, "Show", None)).await.unwrap();
        assert!(list.contains(42, MediaType::Movie));
        assert!(list.contains(42, MediaType::Tv));

        assert!(list.remove(42, MediaType::Movie).await.unwrap());
        assert!(!list.contains(42, MediaType::Movie));
        assert!(list.contains(42, MediaType::Tv));
        assert!(!list.remove(42, MediaType::Movie).await.unwrap());
    }

    #[tokio::test]
    async fn every_change_is_written_to_storage() {
        let (mut list, storage) = empty().await;
        list.add(item(1, MediaType::Movie, "A", None)).await.unwrap();
        list.add(item(2, MediaType::Tv, "B", None)).await.unwrap();
        let stored = storage.load(STORAGE_KEY).await.unwrap().unwrap();
        assert_eq!(stored.as_array().unwrap().len(), 2);

        list.remove(1, MediaType::Movie).await.unwrap();
        let stored = storage.load(STORAGE_KEY).await.unwrap().unwrap();
        assert_eq!(stored[0]["id"], json!(2));
        assert_eq!(stored[0]["media_type"], json!("tv"));

        let reloaded = Watchlist::load(storage.clone()).await.unwrap();
        assert_eq!(reloaded.items(), list.items());
    }

    #[tokio::test]
    async fn toggle_flips_membership() {
        let (mut list, _) = empty().await;
        let movie = item(7, MediaType::Movie, "Seven", None);
        assert!(list.toggle(movie.clone()).await.unwrap());
        assert!(list.contains(7, MediaType::Movie));
        assert!(!list.toggle(movie).await.unwrap());
        assert!(list.items().is_empty());
    }

    #[tokio::test]
    async fn people_are_rejected() {
        let (mut list, _) = empty().await;
        assert!(list
            .add(item(3, MediaType::Person, "Someone", None))
            .await
            .is_err());
        assert!(list.items().is_empty());
    }

    #[tokio::test]
    async fn stats_count_types_and_years() {
        let (mut list, _) = empty().await;
        list.add(item(1, MediaType::Movie, "A", Some("1999-10-15"))).await.unwrap();
        list.add(item(2, MediaType::Movie, "B", Some("1999-03-31"))).await.unwrap();
        list.add(item(3, MediaType::Tv, "C", Some("2011-04-17"))).await.unwrap();
        list.add(item(4, MediaType::Tv, "D", None)).await.unwrap();
        let stats = list.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.movies, 2);
        assert_eq!(stats.tv, 2);
        assert_eq!(stats.release_years, 3);
        assert_eq!(list.filtered(MediaFilter::Only(MediaType::Tv)).len(), 2);
        assert_eq!(list.filtered(MediaFilter::All).len(), 4);
    }

    #[tokio::test]
    async fn unreadable_or_duplicated_storage_is_repaired_on_load() {
        let storage = Arc::new(MemoryStorage::with_value(STORAGE_KEY, json!("nonsense")));
        let list = Watchlist::load(storage).await.unwrap();
        assert!(list.items().is_empty());

        let storage = Arc::new(MemoryStorage::with_value(
            STORAGE_KEY,
            json!([
                {"id": 1, "media_type": "movie", "title": "A"},
                {"id": 1, "media_type": "movie", "title": "A again"},
                {"id": 1, "media_type": "tv", "title": "A show"}
            ]),
        ));
        let list = Watchlist::load(storage).await.unwrap();
        assert_eq!(list.items().len(), 2);
        assert_eq!(list.items()[0].title, "A");
    }

    struct FailingStorage {
        fail: AtomicBool,
        inner: MemoryStorage,
    }

    #[async_trait]
    impl Storage for FailingStorage {
        async fn load(&self, key: &str) -> Result<Option<Value>> {
            self.inner.load(key).await
        }
        async fn store(&self, key: &str, value: Value) -> Result<()> {
            if self.fail.load(Ordering::SeqCst) {
                anyhow::bail!("disk full");
            }
            self.inner.store(key, value).await
        }
    }

    #[tokio::test]
    async fn failed_writes_roll_back_memory() {
        let storage = Arc::new(FailingStorage {
            fail: AtomicBool::new(false),
            inner: MemoryStorage::new(),
        });
        let mut list = Watchlist::load(storage.clone()).await.unwrap();
        list.add(item(1, MediaType::Movie, "Kept", None)).await.unwrap();

        storage.fail.store(true, Ordering::SeqCst);
        assert!(list.add(item(2, MediaType::Movie, "Lost", None)).await.is_err());
        assert!(!list.contains(2, MediaType::Movie));
        assert!(list.remove(1, MediaType::Movie).await.is_err());
        assert!(list.contains(1, MediaType::Movie));
    }
}
