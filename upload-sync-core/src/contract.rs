//! # contract: boundaries between the synchronizer and its collaborators
//!
//! The synchronizer never talks to the network or to a user directly. It goes
//! through two traits defined here:
//!
//! - [`UploadTransport`]: sends one file to the backend and returns the created
//!   resource ([`UploadResult`]).
//! - [`ConfirmPrompt`]: asks the user whether a file entry may be removed.
//!
//! Both traits are annotated for `mockall`, so tests (and downstream crates with
//! the `test-export-mocks` feature) get `MockUploadTransport` and
//! `MockConfirmPrompt` for free.
//!
//! ## Progress & cancellation
//! Each call to [`UploadTransport::upload`] receives an [`UploadOptions`] bag with
//! a [`ProgressReporter`], a [`CancellationToken`] and the configured extra request
//! fields. Implementations should stop as soon as the token fires and report
//! [`TransportError::Cancelled`].

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

#[allow(unused_imports)]
use mockall::{automock, predicate::*};

/// A file selected by the user, not yet sent anywhere.
#[derive(Clone, PartialEq, Eq)]
pub struct LocalFile {
    pub name: String,
    /// Size in bytes. Used by pre-flight validation.
    pub size: u64,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl LocalFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size: bytes.len() as u64,
            content_type: None,
            bytes,
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Reads a file from disk, naming it after its final path component.
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }

    pub fn info(&self) -> FileInfo {
        FileInfo {
            name: self.name.clone(),
            size: self.size,
            content_type: self.content_type.clone(),
        }
    }
}

impl fmt::Debug for LocalFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalFile")
            .field("name", &self.name)
            .field("size", &self.size)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Metadata of a [`LocalFile`] without its contents, carried by events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    pub content_type: Option<String>,
}

/// Descriptor of the resource the backend created for an uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub id: String,
    pub url: String,
    /// Name the backend stored the file under.
    pub file_name: String,
    /// Name the user picked the file with.
    pub original_name: String,
    #[serde(default, alias = "thUrl")]
    pub thumbnail_url: Option<String>,
}

/// Errors a transport may report. Each one fails only the file it belongs to.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("server rejected upload ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("invalid response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,
}

/// Converts raw byte counts into whole percentages and forwards them.
///
/// Reports arriving after the token was cancelled are dropped.
#[derive(Clone)]
pub struct ProgressReporter {
    sink: Arc<dyn Fn(u32) + Send + Sync>,
    cancel: CancellationToken,
}

impl ProgressReporter {
    pub fn new<F>(cancel: CancellationToken, sink: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        Self {
            sink: Arc::new(sink),
            cancel,
        }
    }

    /// A reporter that discards everything.
    pub fn noop() -> Self {
        Self::new(CancellationToken::new(), |_| {})
    }

    pub fn report(&self, loaded: u64, total: u64) {
        if self.cancel.is_cancelled() {
            return;
        }
        if let Some(percent) = percent_of(loaded, total) {
            (self.sink)(percent);
        }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// `floor(loaded / total * 100)`, or `None` when the total is unknown.
pub fn percent_of(loaded: u64, total: u64) -> Option<u32> {
    if total == 0 {
        return None;
    }
    let percent = (loaded as u128 * 100) / total as u128;
    Some(percent.min(100) as u32)
}

/// Everything a transport gets besides the file itself.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub progress: ProgressReporter,
    pub cancel: CancellationToken,
    /// Additional request fields, sent next to the file.
    pub extra_data: serde_json::Map<String, serde_json::Value>,
}

/// Sends files to the backend.
///
/// Implemented by the HTTP client in the CLI crate and by mocks in tests.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Upload a single file and return the created resource.
    async fn upload(
        &self,
        file: LocalFile,
        options: UploadOptions,
    ) -> Result<UploadResult, TransportError>;
}

/// What the user is asked before a file entry is removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmRequest {
    pub title: String,
    pub message: String,
    /// The confirming action is destructive.
    pub danger: bool,
}

impl ConfirmRequest {
    pub fn removal(display_name: &str) -> Self {
        Self {
            title: "Confirm".to_string(),
            message: format!("Are you sure you want to remove {display_name}?"),
            danger: true,
        }
    }
}

/// Asks the user for consent. Resolves to `true` when the user agrees.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    async fn confirm(&self, request: ConfirmRequest) -> bool;
}

/// Accepts every request immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysConfirm;

#[async_trait]
impl ConfirmPrompt for AlwaysConfirm {
    async fn confirm(&self, _request: ConfirmRequest) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn percent_is_floored() {
        assert_eq!(percent_of(1, 3), Some(33));
        assert_eq!(percent_of(2, 3), Some(66));
        assert_eq!(percent_of(3, 3), Some(100));
        assert_eq!(percent_of(5, 0), None);
    }

    #[test]
    fn reporter_goes_quiet_after_cancel() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let token = CancellationToken::new();
        let sink = seen.clone();
        let reporter = ProgressReporter::new(token.clone(), move |p| sink.lock().unwrap().push(p));

        reporter.report(50, 100);
        token.cancel();
        reporter.report(100, 100);

        assert_eq!(*seen.lock().unwrap(), vec![50]);
    }

    #[test]
    fn upload_result_accepts_short_thumbnail_key() {
        let json = r#"{"id":"7","url":"https://x/a.png","fileName":"a_1.png","originalName":"a.png","thUrl":"https://x/t.png"}"#;
        let result: UploadResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.thumbnail_url.as_deref(), Some("https://x/t.png"));
        assert_eq!(result.original_name, "a.png");
    }
}
