//! Persistence: `SaveState`/`RestoreState` for the queue manager.
//!
//! Two variation points get fixed-method-set traits instead of reflection: a
//! [`Codec`] for compressing the serialized snapshot, and a [`PersistenceStore`]
//! for where the bytes land. Defaults ship for both; callers swap in object
//! storage or a different compression scheme without touching [`super::manager::QueueManager`].

use super::item::{Priority, QueueItem};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Wire shape for a single persisted item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDict {
    pub id: String,
    pub data: serde_json::Value,
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub ttl_seconds: Option<f64>,
}

impl From<&QueueItem> for ItemDict {
    fn from(item: &QueueItem) -> Self {
        Self {
            id: item.id.clone(),
            data: item.data.clone(),
            priority: item.priority.as_u8(),
            created_at: item.created_at,
            retry_count: item.retry_count,
            max_retries: item.max_retries,
            ttl_seconds: item.ttl_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityFromU8Error(pub u8);

impl std::fmt::Display for PriorityFromU8Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is not a valid priority (expected 1, 5, 10, or 20)", self.0)
    }
}
impl std::error::Error for PriorityFromU8Error {}

fn priority_from_u8(value: u8) -> Result<Priority, PriorityFromU8Error> {
    match value {
        1 => Ok(Priority::Low),
        5 => Ok(Priority::Normal),
        10 => Ok(Priority::High),
        20 => Ok(Priority::Critical),
        other => Err(PriorityFromU8Error(other)),
    }
}

impl TryFrom<ItemDict> for QueueItem {
    type Error = PriorityFromU8Error;

    fn try_from(dict: ItemDict) -> Result<Self, Self::Error> {
        Ok(QueueItem {
            id: dict.id,
            data: dict.data,
            priority: priority_from_u8(dict.priority)?,
            created_at: dict.created_at,
            retry_count: dict.retry_count,
            max_retries: dict.max_retries,
            ttl_seconds: dict.ttl_seconds,
            partition: None,
        })
    }
}

/// Persisted counters alongside the queue contents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct PersistedMetrics {
    pub total_enqueued: u64,
    pub total_dequeued: u64,
}

/// `{ "queue": [ItemDict...], "metrics": {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub queue: Vec<ItemDict>,
    pub metrics: PersistedMetrics,
}

/// Compresses/decompresses a serialized snapshot before it reaches the store.
pub trait Codec: Send + Sync {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
}

/// No-op codec: stores raw JSON bytes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCodec;

impl Codec for NoopCodec {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Gzip codec, the production default.
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipCodec;

impl Codec for GzipCodec {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data)?;
        encoder.finish()
    }

    fn decompress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        use flate2::read::GzDecoder;
        let mut decoder = GzDecoder::new(data);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    }
}

/// Where persisted snapshot bytes live.
pub trait PersistenceStore: Send + Sync {
    fn save(&self, bytes: &[u8]) -> std::io::Result<()>;
    fn load(&self) -> std::io::Result<Vec<u8>>;
}

/// Local filesystem store at a fixed path, matching `RestoreState(path)`/`SaveState()`.
#[derive(Debug, Clone)]
pub struct FilesystemStore {
    path: PathBuf,
}

impl FilesystemStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self { path: path.as_ref().to_path_buf() }
    }
}

impl PersistenceStore for FilesystemStore {
    fn save(&self, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::write(&self.path, bytes)
    }

    fn load(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_codec_roundtrips() {
        let codec = NoopCodec;
        let data = b"hello world";
        let compressed = codec.compress(data).unwrap();
        assert_eq!(compressed, data);
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn gzip_codec_roundtrips() {
        let codec = GzipCodec;
        let data = b"hello world, compressed and decompressed";
        let compressed = codec.compress(data).unwrap();
        assert_ne!(compressed, data);
        assert_eq!(codec.decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn filesystem_store_roundtrips() {
        let dir = std::env::temp_dir().join(format!("queue-persist-test-{}", std::process::id()));
        let store = FilesystemStore::new(&dir);
        store.save(b"snapshot bytes").unwrap();
        assert_eq!(store.load().unwrap(), b"snapshot bytes");
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn item_dict_roundtrips_through_queue_item() {
        let item = QueueItem::new("a", serde_json::json!({"k": 1}), Priority::High, 5)
            .unwrap()
            .with_ttl(30.0);
        let dict = ItemDict::from(&item);
        let restored = QueueItem::try_from(dict).unwrap();
        assert_eq!(restored.id, item.id);
        assert_eq!(restored.priority, item.priority);
        assert_eq!(restored.ttl_seconds, item.ttl_seconds);
    }

    #[test]
    fn rejects_invalid_priority_value() {
        let dict = ItemDict {
            id: "a".into(),
            data: serde_json::json!(null),
            priority: 7,
            created_at: Utc::now(),
            retry_count: 0,
            max_retries: 1,
            ttl_seconds: None,
        };
        assert!(QueueItem::try_from(dict).is_err());
    }
}
