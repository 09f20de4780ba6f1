//! Bounded, newest-first cache of past results.
//!
//! Every mutation is written through to the durable store under
//! [`HISTORY_KEY`] as a versioned document:
//!
//! ```text
//! {"schema_version": 2, "records": [ResultRecord, ...]}
//! ```
//!
//! Version 1 was a bare JSON array whose image references were plain
//! strings. It is migrated on load and the migrated document is written back
//! immediately.

use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::domain::{AssetRef, RecordId, ResultRecord};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::{
    error::StagingError,
    store::{DurableStore, HISTORY_KEY},
};

pub const HISTORY_CAPACITY: usize = 12;
pub const HISTORY_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct HistoryDocumentV2 {
    schema_version: u32,
    records: Vec<ResultRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyRecordV1 {
    id: i64,
    original_image: String,
    staged_image: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    description: String,
    #[serde(default = "first_iteration")]
    iteration: u32,
    timestamp: DateTime<Utc>,
}

fn first_iteration() -> u32 {
    1
}

impl LegacyRecordV1 {
    fn migrate(self, base_url: &Url) -> Result<ResultRecord, url::ParseError> {
        Ok(ResultRecord {
            id: RecordId(self.id),
            original: AssetRef::resolve(&self.original_image, base_url)?,
            staged: AssetRef::resolve(&self.staged_image, base_url)?,
            reasoning: self.reasoning,
            prompt: self.prompt,
            description: self.description,
            iteration: self.iteration.max(1),
            created_at: self.timestamp,
        })
    }
}

/// Decodes any known schema version. The flag is true when a migration ran.
fn decode_document(raw: &str, base_url: &Url) -> anyhow::Result<(Vec<ResultRecord>, bool)> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    if value.is_array() {
        let legacy: Vec<LegacyRecordV1> = serde_json::from_value(value)?;
        let records = legacy
            .into_iter()
            .map(|record| record.migrate(base_url))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok((records, true));
    }

    let version = value
        .get("schema_version")
        .and_then(serde_json::Value::as_u64)
        .unwrap_or_default();
    if version != u64::from(HISTORY_SCHEMA_VERSION) {
        anyhow::bail!("unsupported history schema version {version}");
    }
    let document: HistoryDocumentV2 = serde_json::from_value(value)?;
    Ok((document.records, false))
}

pub struct HistoryCache {
    entries: VecDeque<ResultRecord>,
    capacity: usize,
    store: Arc<dyn DurableStore>,
    version: u64,
    written: Arc<Mutex<u64>>,
}

/// A snapshot of the cache waiting to be written to the durable store.
///
/// Taken while the session is locked and committed after the lock is
/// released. A snapshot older than one already written is skipped.
#[must_use = "history changes are only durable once committed"]
pub struct HistoryWrite {
    store: Arc<dyn DurableStore>,
    written: Arc<Mutex<u64>>,
    version: u64,
    records: Vec<ResultRecord>,
}

impl HistoryWrite {
    pub async fn commit(self) -> Result<(), StagingError> {
        let mut written = self.written.lock().await;
        if *written >= self.version {
            debug!(version = self.version, "skipping superseded history write");
            return Ok(());
        }
        let document = HistoryDocumentV2 {
            schema_version: HISTORY_SCHEMA_VERSION,
            records: self.records,
        };
        let raw = serde_json::to_string(&document)
            .map_err(|err| StagingError::storage(anyhow::Error::new(err)))?;
        self.store
            .save(HISTORY_KEY, &raw)
            .await
            .map_err(StagingError::storage)?;
        *written = self.version;
        Ok(())
    }
}

impl HistoryCache {
    /// Reloads persisted history, migrating older schemas in place.
    pub async fn load(store: Arc<dyn DurableStore>, base_url: &Url) -> Result<Self, StagingError> {
        let raw = store
            .load(HISTORY_KEY)
            .await
            .map_err(StagingError::storage)?;
        let mut cache = Self {
            entries: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
            capacity: HISTORY_CAPACITY,
            store,
            version: 0,
            written: Arc::new(Mutex::new(0)),
        };
        let Some(raw) = raw else {
            return Ok(cache);
        };

        let (records, migrated) = decode_document(&raw, base_url)
            .map_err(|err| StagingError::storage(err.context("failed to decode stored history")))?;
        cache.entries.extend(records.into_iter().take(cache.capacity));
        if migrated {
            info!(
                records = cache.entries.len(),
                to_version = HISTORY_SCHEMA_VERSION,
                "migrated stored history"
            );
            cache.snapshot().commit().await?;
        }
        Ok(cache)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Newest first.
    pub fn records(&self) -> impl Iterator<Item = &ResultRecord> {
        self.entries.iter()
    }

    pub fn get(&self, id: RecordId) -> Option<&ResultRecord> {
        self.entries.iter().find(|record| record.id == id)
    }

    pub fn max_id(&self) -> Option<RecordId> {
        self.entries.iter().map(|record| record.id).max()
    }

    /// Prepends `record`, evicting the oldest entry past capacity.
    ///
    /// The in-memory cache is updated at once. The returned write persists
    /// it and fails without undoing the in-memory change.
    pub fn push(&mut self, record: ResultRecord) -> HistoryWrite {
        self.entries.push_front(record);
        while self.entries.len() > self.capacity {
            if let Some(evicted) = self.entries.pop_back() {
                debug!(record_id = %evicted.id, "evicted oldest history entry");
            }
        }
        self.snapshot()
    }

    fn snapshot(&mut self) -> HistoryWrite {
        self.version += 1;
        HistoryWrite {
            store: self.store.clone(),
            written: self.written.clone(),
            version: self.version,
            records: self.entries.iter().cloned().collect(),
        }
    }
}
