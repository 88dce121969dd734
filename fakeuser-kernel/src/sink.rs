use crate::error::SinkError;
use crate::models::ReconciliationOutcome;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Persists one tick's outcomes for every processed site.
    async fn record(&self, zone_id: &str, records: &[ReconciliationOutcome]) -> Result<(), SinkError>;
}

#[derive(Serialize)]
struct RecordLine<'a> {
    zone_id: &'a str,
    #[serde(flatten)]
    outcome: &'a ReconciliationOutcome,
}

/// Appends one JSON object per record to `{dir}/record_{zone}.jsonl`.
#[derive(Debug, Clone)]
pub struct JsonlRecordSink {
    dir: PathBuf,
}

impl JsonlRecordSink {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, zone_id: &str) -> PathBuf {
        self.dir.join(format!("record_{}.jsonl", zone_id))
    }
}

#[async_trait]
impl RecordSink for JsonlRecordSink {
    async fn record(&self, zone_id: &str, records: &[ReconciliationOutcome]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut batch = Vec::new();
        for outcome in records {
            serde_json::to_writer(&mut batch, &RecordLine { zone_id, outcome })?;
            batch.push(b'\n');
        }

        tokio::fs::create_dir_all(&self.dir).await?;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(zone_id))
            .await?;
        file.write_all(&batch).await?;
        file.flush().await?;
        Ok(())
    }
}
