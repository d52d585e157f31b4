//! Small key/value document store backing the watchlist and preferences.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[async_trait]
pub trait Storage: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<Value>>;
    async fn store(&self, key: &str, value: Value) -> Result<()>;
}

/// All keys live in one JSON object on disk. Every `store` rewrites the file
/// through a temp file and a rename, so readers never see a half-written document.
pub struct JsonFileStorage {
    path: PathBuf,
    doc: Mutex<Map<String, Value>>,
}

impl JsonFileStorage {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let doc = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => {
                    info!("Loaded {} stored key(s) from {}", map.len(), path.display());
                    map
                }
                Ok(_) | Err(_) => {
                    warn!(
                        "Ignoring unreadable data file {}; it will be replaced on next write",
                        path.display()
                    );
                    Map::new()
                }
            },
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("No data file at {}, starting empty", path.display());
                Map::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn write_document(&self, doc: &Map<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(doc).context("Failed to serialize data file")?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl Storage for JsonFileStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.doc.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value: Value) -> Result<()> {
        let mut doc = self.doc.lock().await;
        let mut next = doc.clone();
        next.insert(key.to_string(), value);
        self.write_document(&next).await?;
        *doc = next;
        debug!("Stored key '{}' in {}", key, self.path.display());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(key: &str, value: Value) -> Self {
        Self {
            values: Mutex::new(HashMap::from([(key.to_string(), value)])),
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn load(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn store(&self, key: &str, value: Value) -> Result<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}
