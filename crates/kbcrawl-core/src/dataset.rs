use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::CrawlError;
use crate::traits::Dataset;

/// Dataset persisted as JSON Lines: one record per line, in push order.
#[derive(Clone)]
pub struct JsonLinesDataset {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl JsonLinesDataset {
    /// Create (or truncate) the dataset file, creating parent directories.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, CrawlError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .await?;

        tracing::debug!(path = %path.display(), "Opened dataset");
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Dataset for JsonLinesDataset {
    async fn push(&self, record: &serde_json::Value) -> Result<(), CrawlError> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        // One write per record under the lock keeps lines whole.
        let mut file = self.file.lock().await;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn writes_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/default.jsonl");
        let dataset = JsonLinesDataset::create(&path).await.unwrap();

        dataset
            .push(&json!({"title": "A", "url": "https://a.test/", "content": "x\ny"}))
            .await
            .unwrap();
        dataset.push(&json!({"title": "B"})).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = written
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["content"], "x\ny");
        assert_eq!(lines[1]["title"], "B");
    }

    #[tokio::test]
    async fn create_truncates_previous_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("default.jsonl");
        std::fs::write(&path, "{\"stale\":true}\n").unwrap();

        let dataset = JsonLinesDataset::create(&path).await.unwrap();
        dataset.push(&json!({"fresh": true})).await.unwrap();

        let written = std::fs::read_to_string(dataset.path()).unwrap();
        assert_eq!(written, "{\"fresh\":true}\n");
    }

    #[tokio::test]
    async fn concurrent_pushes_keep_lines_intact() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = JsonLinesDataset::create(dir.path().join("d.jsonl"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..20 {
            let ds = dataset.clone();
            handles.push(tokio::spawn(async move {
                ds.push(&json!({"n": i, "pad": "x".repeat(512)})).await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let written = std::fs::read_to_string(dataset.path()).unwrap();
        assert_eq!(written.lines().count(), 20);
        for line in written.lines() {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }
}
