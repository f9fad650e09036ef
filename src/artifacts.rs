use crate::config::ArtifactsConfig;
use crate::error::{KioskError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

/// How a session's generation ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    Generated,
    /// Result shown with the original photo
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    /// "print" or "message"
    pub channel: String,
    pub destination: Option<String>,
    pub message_id: Option<String>,
    pub delivered_at: DateTime<Utc>,
}

/// Final report of one kiosk visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: Uuid,
    pub style_id: Option<String>,
    pub style_name: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub generation_attempts: u32,
    pub outcome: SessionOutcome,
    #[serde(default)]
    pub deliveries: Vec<DeliveryRecord>,
}

/// Writes session records as pretty JSON, one file per session
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    directory: PathBuf,
}

impl ArtifactStore {
    pub fn new<P: Into<PathBuf>>(directory: P) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Store for the configured directory, if reporting is enabled
    pub fn from_config(config: &ArtifactsConfig) -> Option<Self> {
        config.enabled.then(|| Self::new(&config.directory))
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn record_path(&self, session_id: Uuid) -> PathBuf {
        self.directory.join(format!("{}.json", session_id))
    }

    /// Write (or overwrite) the record for its session
    pub async fn write(&self, record: &SessionRecord) -> Result<PathBuf> {
        let json = serde_json::to_string_pretty(record)?;

        fs::create_dir_all(&self.directory).await.map_err(|e| {
            KioskError::component(
                "artifacts".to_string(),
                format!("Failed to create artifacts directory: {}", e),
            )
        })?;

        // Readers never see a half-written record
        let path = self.record_path(record.session_id);
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, json).await.map_err(|e| {
            KioskError::component(
                "artifacts".to_string(),
                format!("Failed to write session record: {}", e),
            )
        })?;
        fs::rename(&staging, &path).await.map_err(|e| {
            KioskError::component(
                "artifacts".to_string(),
                format!("Failed to move session record into place: {}", e),
            )
        })?;

        debug!("Saved session record to {}", path.display());
        Ok(path)
    }

    pub async fn read(&self, session_id: Uuid) -> Result<SessionRecord> {
        let json = fs::read_to_string(self.record_path(session_id)).await?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// Serializes record writes through one background task so that later
/// snapshots of a session always land after earlier ones
pub struct ArtifactWriter {
    store: ArtifactStore,
    queue: Option<(mpsc::UnboundedSender<SessionRecord>, JoinHandle<()>)>,
}

impl ArtifactWriter {
    pub fn new(store: ArtifactStore) -> Self {
        Self { store, queue: None }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Queue a record; the writer task starts on first use
    pub fn submit(&mut self, record: SessionRecord) {
        let store = &self.store;
        let (sender, _) = self.queue.get_or_insert_with(|| {
            let (sender, mut records) = mpsc::unbounded_channel::<SessionRecord>();
            let store = store.clone();
            let handle = tokio::spawn(async move {
                while let Some(record) = records.recv().await {
                    if let Err(e) = store.write(&record).await {
                        warn!("Failed to save session record: {}", e);
                    }
                }
                debug!("Artifact writer stopped");
            });
            (sender, handle)
        });

        if sender.send(record).is_err() {
            warn!("Artifact writer is gone; session record dropped");
        }
    }

    /// Wait until every queued record is on disk
    pub async fn flush(&mut self) {
        if let Some((sender, handle)) = self.queue.take() {
            drop(sender);
            if let Err(e) = handle.await {
                warn!("Artifact writer task failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record() -> SessionRecord {
        SessionRecord {
            session_id: Uuid::new_v4(),
            style_id: Some("pixar".to_string()),
            style_name: Some("Pixar".to_string()),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            generation_attempts: 2,
            outcome: SessionOutcome::Fallback {
                reason: "HTTP 500".to_string(),
            },
            deliveries: Vec::new(),
        }
    }

    #[test]
    fn test_disabled_by_default() {
        assert!(ArtifactStore::from_config(&ArtifactsConfig::default()).is_none());
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path().join("sessions"));
        let record = record();

        let path = store.write(&record).await.unwrap();
        assert_eq!(path, store.record_path(record.session_id));

        let loaded = store.read(record.session_id).await.unwrap();
        assert_eq!(loaded, record);
    }

    #[tokio::test]
    async fn test_rewrite_adds_deliveries() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new(dir.path());
        let mut record = record();
        store.write(&record).await.unwrap();

        record.deliveries.push(DeliveryRecord {
            channel: "message".to_string(),
            destination: Some("@someone".to_string()),
            message_id: Some("m-1".to_string()),
            delivered_at: Utc::now(),
        });
        store.write(&record).await.unwrap();

        let loaded = store.read(record.session_id).await.unwrap();
        assert_eq!(loaded.deliveries.len(), 1);

        let raw = std::fs::read_to_string(store.record_path(record.session_id)).unwrap();
        assert!(raw.contains("\"kind\": \"fallback\""));
    }

    #[tokio::test]
    async fn test_writer_keeps_submission_order() {
        let dir = TempDir::new().unwrap();
        let mut writer = ArtifactWriter::new(ArtifactStore::new(dir.path()));
        let mut record = record();

        for n in 0..5 {
            if n > 0 {
                record.deliveries.push(DeliveryRecord {
                    channel: "print".to_string(),
                    destination: None,
                    message_id: None,
                    delivered_at: Utc::now(),
                });
            }
            writer.submit(record.clone());
        }
        writer.flush().await;

        let loaded = writer.store().read(record.session_id).await.unwrap();
        assert_eq!(loaded.deliveries.len(), 4);
        assert!(!writer
            .store()
            .record_path(record.session_id)
            .with_extension("json.tmp")
            .exists());
    }

    #[tokio::test]
    async fn test_flush_without_records() {
        let dir = TempDir::new().unwrap();
        let mut writer = ArtifactWriter::new(ArtifactStore::new(dir.path()));
        writer.flush().await;
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }
}
