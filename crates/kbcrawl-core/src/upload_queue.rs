//! Background delivery of documents to the knowledge base.
//!
//! Pages hand their documents to the queue and move on; the queue runs the
//! uploads on their own tasks, at most `concurrency` at a time, so a slow
//! ingestion endpoint never holds up page processing. A failed upload is
//! logged and counted, and nothing else happens: no retry, no error
//! surfaced to the crawl.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;

use crate::models::UploadTask;
use crate::traits::Uploader;

/// Upload outcomes for a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct UploadTotals {
    pub succeeded: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
}

pub struct UploadQueue<U: Uploader> {
    uploader: U,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    counters: Arc<Counters>,
}

impl<U: Uploader> UploadQueue<U> {
    pub fn new(uploader: U, concurrency: usize) -> Self {
        Self {
            uploader,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tracker: TaskTracker::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Schedule a document for delivery. Never blocks on the upload itself.
    pub fn submit(&self, task: UploadTask) {
        let uploader = self.uploader.clone();
        let permits = Arc::clone(&self.permits);
        let counters = Arc::clone(&self.counters);

        self.tracker.spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            match uploader.upload(&task).await {
                Ok(receipt) => {
                    counters.succeeded.fetch_add(1, Ordering::Relaxed);
                    tracing::info!(
                        filename = %task.filename,
                        http_status = receipt.http_status,
                        status = receipt.status_type.as_deref().unwrap_or("unknown"),
                        "Uploaded document to knowledge base"
                    );
                }
                Err(e) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(filename = %task.filename, error = %e, "Upload failed");
                }
            }
        });
    }

    /// Uploads submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn totals(&self) -> UploadTotals {
        UploadTotals {
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Stop accepting work and wait for every submitted upload to finish.
    pub async fn drain(&self) -> UploadTotals {
        self.tracker.close();
        self.tracker.wait().await;
        self.totals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrawlError;
    use crate::testutil::MockUploader;
    use std::time::Duration;

    fn task(name: &str) -> UploadTask {
        UploadTask {
            filename: format!("{name}.txt"),
            content: "body".into(),
            api_key: "key".into(),
            project_id: "proj".into(),
        }
    }

    #[tokio::test]
    async fn delivers_every_submitted_task() {
        let uploader = MockUploader::ok();
        let queue = UploadQueue::new(uploader.clone(), 2);
        for name in ["a", "b", "c"] {
            queue.submit(task(name));
        }
        let totals = queue.drain().await;
        assert_eq!(totals, UploadTotals { succeeded: 3, failed: 0 });

        let mut names = uploader.uploaded_filenames();
        names.sort();
        assert_eq!(names, vec!["a.txt", "b.txt", "c.txt"]);
    }

    #[tokio::test]
    async fn failure_is_isolated_to_its_document() {
        let uploader = MockUploader::failing_for(["b.txt"]);
        let queue = UploadQueue::new(uploader.clone(), 1);
        for name in ["a", "b", "c"] {
            queue.submit(task(name));
        }
        let totals = queue.drain().await;
        assert_eq!(totals, UploadTotals { succeeded: 2, failed: 1 });
        assert_eq!(uploader.attempts(), 3);
    }

    #[tokio::test]
    async fn submit_returns_before_upload_completes() {
        let uploader = MockUploader::ok().with_delay(Duration::from_millis(200));
        let queue = UploadQueue::new(uploader.clone(), 1);

        let start = std::time::Instant::now();
        queue.submit(task("slow-1"));
        queue.submit(task("slow-2"));
        assert!(start.elapsed() < Duration::from_millis(100));
        assert_eq!(queue.in_flight(), 2);

        queue.drain().await;
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected() {
        let uploader = MockUploader::ok().with_delay(Duration::from_millis(30));
        let queue = UploadQueue::new(uploader.clone(), 2);
        for i in 0..6 {
            queue.submit(task(&format!("doc-{i}")));
        }
        queue.drain().await;
        assert!(uploader.max_concurrent() <= 2);
        assert_eq!(uploader.attempts(), 6);
    }

    #[tokio::test]
    async fn rejected_upload_counts_as_failure() {
        let uploader = MockUploader::with_error(CrawlError::UploadRejected {
            status: 401,
            body: "unauthorized".into(),
        });
        let queue = UploadQueue::new(uploader, 1);
        queue.submit(task("a"));
        assert_eq!(queue.drain().await.failed, 1);
    }
}
