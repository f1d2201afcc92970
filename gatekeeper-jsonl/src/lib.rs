//! JSON-lines record store for `gatekeeper`. One identity record per line.
//! Every save replaces the whole file; bring your own path.

use async_trait::async_trait;
use gatekeeper::{IdentityRecord, RecordSet, RecordStore, StoreError};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct JsonlRecordStore {
    path: PathBuf,
}

impl JsonlRecordStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // Sibling file renamed over the target, so readers never see a partial write.
    fn staging_path(&self) -> PathBuf {
        let mut staging = OsString::from(self.path.as_os_str());
        staging.push(".tmp");
        PathBuf::from(staging)
    }
}

#[async_trait]
impl RecordStore for JsonlRecordStore {
    async fn load_all(&self) -> Result<RecordSet, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(RecordSet::new()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        parse_lines(&contents)
    }

    async fn save_all(&self, records: &RecordSet) -> Result<(), StoreError> {
        let body = render_lines(records)?;
        let staging = self.staging_path();
        tokio::fs::write(&staging, body.as_bytes()).await?;
        tokio::fs::rename(&staging, &self.path).await?;
        tracing::debug!(
            target: "gatekeeper::jsonl",
            path = %self.path.display(),
            records = records.len(),
            "identity records written"
        );
        Ok(())
    }
}

fn parse_lines(contents: &str) -> Result<RecordSet, StoreError> {
    let mut records = RecordSet::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: IdentityRecord = serde_json::from_str(line)
            .map_err(|e| StoreError::Corrupt(format!("line {}: {}", index + 1, e)))?;
        records.insert(record.id.clone(), record);
    }
    Ok(records)
}

fn render_lines(records: &RecordSet) -> Result<String, StoreError> {
    let mut ordered: Vec<&IdentityRecord> = records.values().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut body = String::new();
    for record in ordered {
        let line =
            serde_json::to_string(record).map_err(|e| StoreError::Serialization(e.to_string()))?;
        body.push_str(&line);
        body.push('\n');
    }
    Ok(body)
}
