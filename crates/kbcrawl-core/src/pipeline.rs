use crate::error::CrawlError;
use crate::models::{PageResult, UploadTask};
use crate::traits::Cleaner;

/// Extension of every uploaded document.
pub const DOCUMENT_EXTENSION: &str = "txt";

/// Derive a document filename from a page title.
///
/// Path separators and characters that are invalid in filenames are
/// removed; an empty result falls back to `untitled`.
/// Example: `"Get Started / Voice"` → `"Get Started  Voice.txt"`
pub fn document_filename(title: &str) -> String {
    let sanitized = sanitize_filename::sanitize(title.trim());
    let stem = sanitized.trim();
    if stem.is_empty() {
        format!("untitled.{DOCUMENT_EXTENSION}")
    } else {
        format!("{stem}.{DOCUMENT_EXTENSION}")
    }
}

/// Pure transformation from extracted HTML to an upload-ready document.
#[derive(Clone)]
pub struct DocumentPipeline<C: Cleaner> {
    cleaner: C,
    api_key: String,
    project_id: String,
}

impl<C: Cleaner> DocumentPipeline<C> {
    pub fn new(cleaner: C, api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            cleaner,
            api_key: api_key.into(),
            project_id: project_id.into(),
        }
    }

    /// Convert the extracted region of a page into its result record.
    pub fn build_result(&self, title: &str, url: &str, html: &str) -> Result<PageResult, CrawlError> {
        let content = self.cleaner.clean(html)?;
        Ok(PageResult {
            title: title.to_string(),
            url: url.to_string(),
            content,
        })
    }

    /// Package a page result as a named document for the uploader.
    pub fn process(&self, result: &PageResult) -> UploadTask {
        UploadTask {
            filename: document_filename(&result.title),
            content: result.content.clone(),
            api_key: self.api_key.clone(),
            project_id: self.project_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockCleaner;

    #[test]
    fn filename_comes_from_title() {
        assert_eq!(document_filename("Get Started"), "Get Started.txt");
        assert_eq!(document_filename("  API Reference  "), "API Reference.txt");
        assert_eq!(document_filename("a/b\\c"), "abc.txt");
        assert_eq!(document_filename(""), "untitled.txt");
        assert_eq!(document_filename("///"), "untitled.txt");
    }

    #[test]
    fn process_is_deterministic() {
        let pipeline = DocumentPipeline::new(MockCleaner::passthrough(), "key", "proj");
        let result = pipeline
            .build_result("Guide", "https://a.test/guide", "<p>text</p>")
            .unwrap();
        assert_eq!(result.content, "<p>text</p>");

        let first = pipeline.process(&result);
        let second = pipeline.process(&result);
        assert_eq!(first, second);
        assert_eq!(first.filename, "Guide.txt");
        assert_eq!(first.api_key, "key");
        assert_eq!(first.project_id, "proj");
    }

    #[test]
    fn cleaner_error_propagates() {
        let pipeline = DocumentPipeline::new(
            MockCleaner::with_error(CrawlError::CleanerError("bad html".into())),
            "key",
            "proj",
        );
        let err = pipeline.build_result("T", "https://a.test/", "<p>").unwrap_err();
        assert!(matches!(err, CrawlError::CleanerError(_)));
    }
}
