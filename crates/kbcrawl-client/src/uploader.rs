use std::time::Duration;

use kbcrawl_core::config::DEFAULT_API_BASE_URL;
use kbcrawl_core::error::CrawlError;
use kbcrawl_core::models::{UploadReceipt, UploadTask};
use kbcrawl_core::traits::Uploader;
use reqwest::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::Deserialize;

use crate::fetcher::{USER_AGENT, transport_error};

const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
struct DocumentStatus {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct DocumentData {
    status: Option<DocumentStatus>,
}

#[derive(Deserialize)]
struct UploadResponse {
    status: Option<DocumentStatus>,
    data: Option<DocumentData>,
}

impl UploadResponse {
    fn status_type(self) -> Option<String> {
        self.status
            .and_then(|s| s.kind)
            .or_else(|| self.data.and_then(|d| d.status).and_then(|s| s.kind))
    }
}

/// Multipart uploader for the knowledge-base document ingestion endpoint.
#[derive(Clone)]
pub struct KnowledgeBaseUploader {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl KnowledgeBaseUploader {
    pub fn new() -> Result<Self, CrawlError> {
        Self::with_base_url(DEFAULT_API_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self, CrawlError> {
        Self::build(base_url, DEFAULT_UPLOAD_TIMEOUT)
    }

    pub fn with_timeout(self, timeout: Duration) -> Result<Self, CrawlError> {
        Self::build(&self.base_url, timeout)
    }

    fn build(base_url: &str, timeout: Duration) -> Result<Self, CrawlError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlError::UploadError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// `{base}/v3/projects/{projectID}/knowledge-base/documents/file`
    pub fn endpoint(&self, project_id: &str) -> String {
        format!(
            "{}/v3/projects/{}/knowledge-base/documents/file",
            self.base_url, project_id
        )
    }
}

impl Uploader for KnowledgeBaseUploader {
    async fn upload(&self, task: &UploadTask) -> Result<UploadReceipt, CrawlError> {
        let file = Part::text(task.content.clone())
            .file_name(task.filename.clone())
            .mime_str("text/plain")
            .map_err(|e| CrawlError::UploadError(e.to_string()))?;
        let form = Form::new().part("file", file).text("canEdit", "true");

        let response = self
            .client
            .post(self.endpoint(&task.project_id))
            .header(ACCEPT, "application/json, text/plain, */*")
            .header(AUTHORIZATION, &task.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| match transport_error(e, self.timeout) {
                CrawlError::FetchError(message) => CrawlError::UploadError(message),
                other => other,
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::UploadError(format!("Failed to read upload response: {e}")))?;

        if !status.is_success() {
            return Err(CrawlError::UploadRejected {
                status: status.as_u16(),
                body,
            });
        }

        let status_type = serde_json::from_str::<UploadResponse>(&body)
            .ok()
            .and_then(UploadResponse::status_type);
        if status_type.is_none() {
            tracing::debug!(filename = %task.filename, %body, "Upload response carried no document status");
        }

        Ok(UploadReceipt {
            http_status: status.as_u16(),
            status_type,
        })
    }
}
