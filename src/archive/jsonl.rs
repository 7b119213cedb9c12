use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::ArchiveWriter;
use crate::domain::TransactionRecord;
use crate::error::Result;

/// Appends each archived record as one JSON line.
pub struct JsonlArchiveWriter {
    path: PathBuf,
    // Serializes appends so concurrent lines never interleave
    lock: Mutex<()>,
}

impl JsonlArchiveWriter {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ArchiveWriter for JsonlArchiveWriter {
    async fn persist(&self, record: &TransactionRecord) -> Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TransactionInput;
    use tokio_test::assert_ok;

    fn record(id: &str) -> TransactionRecord {
        TransactionRecord::new(
            id.to_string(),
            TransactionInput {
                chain_id: 137,
                from_address: "0xfrom".into(),
                to_address: "0xto".into(),
                payload: "0xdeadbeef".into(),
                value: "0x10".into(),
                reason: None,
            },
        )
    }

    #[tokio::test]
    async fn test_appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tx.jsonl");
        let writer = JsonlArchiveWriter::new(&path);

        assert_ok!(writer.persist(&record("a")).await);
        assert_ok!(writer.persist(&record("b")).await);

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: TransactionRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.transaction_id, "a");
        assert_eq!(first.input.chain_id, 137);
        let raw: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(raw["chainId"], 137);
        assert_eq!(raw["data"], "0xdeadbeef");
    }
}
