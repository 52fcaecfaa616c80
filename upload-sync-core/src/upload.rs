//! # upload: pre-flight validation and the per-file upload task
//!
//! A selected file goes through [`validate`] first; a refused file never
//! reaches the transport and never gets an entry. Accepted files get a
//! `Pending` entry and one spawned task each. The task moves the entry to
//! `Uploading`, calls the [`UploadTransport`], and applies the outcome:
//!
//! - success: the entry takes over the result (`uid = result.id`, url, names,
//!   thumbnail) and the result URL is written into the bound value with the
//!   reconcile latch armed;
//! - failure: the entry is dropped or marked `Error`, per `remove_on_error`;
//! - cancellation, or an entry that disappeared while the request was in
//!   flight: nothing is applied.
//!
//! Tasks share the synchronizer's cancellation token, so tearing the
//! synchronizer down aborts every one of them.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bound_value::BoundValue;
use crate::config::{SyncConfig, UploadMode};
use crate::contract::{
    FileInfo, LocalFile, ProgressReporter, TransportError, UploadOptions, UploadResult,
    UploadTransport,
};
use crate::entry::{FileEntry, FileStatus};
use crate::events::{Notice, UploadEvent};
use crate::synchronise::Shared;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Why a file was refused before upload.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("File must not exceed {max_size_mb}MB")]
    TooLarge { size: u64, max_size_mb: f64 },

    #[error("At most {max_count} files can be uploaded")]
    TooManyFiles { max_count: usize },
}

/// Checks a file against the configured limits. File type is not checked.
pub fn validate(
    config: &SyncConfig,
    current_count: usize,
    file: &LocalFile,
) -> Result<(), ValidationError> {
    if file.size as f64 / BYTES_PER_MB >= config.max_size_mb {
        return Err(ValidationError::TooLarge {
            size: file.size,
            max_size_mb: config.max_size_mb,
        });
    }
    if let (UploadMode::Multiple, Some(max_count)) = (config.mode(), config.max_count) {
        if current_count >= max_count {
            return Err(ValidationError::TooManyFiles { max_count });
        }
    }
    Ok(())
}

/// How an upload task ended.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Done(UploadResult),
    Failed(String),
    /// Aborted by teardown or by removing the entry; nothing was applied.
    Cancelled,
    /// The request finished but its entry was gone; nothing was applied.
    Discarded,
}

/// Handle to one in-flight upload.
#[derive(Debug)]
pub struct UploadTask {
    uid: String,
    handle: JoinHandle<UploadOutcome>,
}

impl UploadTask {
    /// The uid the entry had when it was queued.
    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub async fn wait(self) -> UploadOutcome {
        match self.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(uid = %self.uid, error = ?e, "Upload task did not complete");
                UploadOutcome::Failed(e.to_string())
            }
        }
    }
}

impl Shared {
    /// Queues a `Pending` entry for `file` and spawns its upload task.
    pub(crate) fn start_upload(
        self: &Arc<Self>,
        transport: Arc<dyn UploadTransport>,
        file: LocalFile,
    ) -> Option<UploadTask> {
        let entry = FileEntry::pending(crate::entry::new_uid(), &file);
        let uid = entry.uid.clone();
        let cancel = self.cancel.child_token();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            if state.closed {
                warn!(file = %file.name, "Upload requested after shutdown, ignoring");
                return None;
            }
            if self.config.mode() == UploadMode::Single {
                for replaced in state.files.drain(..) {
                    if let Some(token) = state.in_flight.remove(&replaced.key) {
                        token.cancel();
                    }
                }
            }
            state.files.push(entry.clone());
            state.in_flight.insert(uid.clone(), cancel.clone());
            self.emit(UploadEvent::StatusChanged { entry });
        }

        info!(uid = %uid, file = %file.name, size = file.size, "Queued upload");
        let shared = Arc::clone(self);
        let task_uid = uid.clone();
        let handle = tokio::spawn(async move {
            let outcome = shared.run_upload(transport, &task_uid, file, cancel).await;
            shared.lock().in_flight.remove(&task_uid);
            outcome
        });
        Some(UploadTask { uid, handle })
    }

    async fn run_upload(
        self: &Arc<Self>,
        transport: Arc<dyn UploadTransport>,
        key: &str,
        file: LocalFile,
        cancel: CancellationToken,
    ) -> UploadOutcome {
        if !self.mark_uploading(key) {
            return UploadOutcome::Cancelled;
        }

        let progress = {
            let shared = Arc::clone(self);
            let key = key.to_string();
            ProgressReporter::new(cancel.clone(), move |percent| {
                shared.record_progress(&key, percent)
            })
        };
        let options = UploadOptions {
            progress,
            cancel: cancel.clone(),
            extra_data: self.config.extra_data.clone(),
        };
        let info = file.info();

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            res = transport.upload(file, options) => res,
        };

        match result {
            Ok(result) => self.finish_success(key, info, result),
            Err(TransportError::Cancelled) => {
                debug!(key = %key, "Upload cancelled");
                UploadOutcome::Cancelled
            }
            Err(e) => self.finish_failure(key, e),
        }
    }

    fn mark_uploading(&self, key: &str) -> bool {
        let mut state = self.lock();
        if state.closed {
            return false;
        }
        let Some(entry) = state.files.iter_mut().find(|f| f.key == key) else {
            debug!(key = %key, "Entry vanished before its upload started");
            return false;
        };
        entry.status = FileStatus::Uploading;
        let snapshot = entry.clone();
        self.emit(UploadEvent::StatusChanged { entry: snapshot });
        true
    }

    fn record_progress(&self, key: &str, percent: u32) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        if let Some(entry) = state
            .files
            .iter_mut()
            .find(|f| f.key == key && f.status == FileStatus::Uploading)
        {
            entry.percent = percent;
            self.emit(UploadEvent::Progress {
                uid: entry.uid.clone(),
                percent,
            });
        }
    }

    fn finish_success(&self, key: &str, file: FileInfo, result: UploadResult) -> UploadOutcome {
        let mut state = self.lock();
        if state.closed || self.cancel.is_cancelled() {
            debug!(key = %key, "Upload finished after shutdown, dropping result");
            return UploadOutcome::Cancelled;
        }
        let Some(entry) = state.files.iter_mut().find(|f| f.key == key) else {
            info!(key = %key, url = %result.url, "Upload finished for a removed entry, dropping result");
            return UploadOutcome::Discarded;
        };
        entry.apply_result(&result);
        let snapshot = entry.clone();
        self.emit(UploadEvent::StatusChanged { entry: snapshot });

        state.latch.arm();
        let value = match &state.bound {
            BoundValue::Multiple(list) => {
                let mut list = list.clone();
                list.push(result.url.clone());
                BoundValue::Multiple(list)
            }
            BoundValue::Single(_) => BoundValue::Single(result.url.clone()),
        };
        self.commit_bound_value(&mut state, value);

        info!(uid = %result.id, url = %result.url, "Upload succeeded");
        if self.config.show_success_msg {
            self.emit(UploadEvent::Notice {
                notice: Notice::Success("Upload succeeded".to_string()),
            });
        }
        self.emit(UploadEvent::Success {
            file,
            result: result.clone(),
        });
        UploadOutcome::Done(result)
    }

    fn finish_failure(&self, key: &str, err: TransportError) -> UploadOutcome {
        error!(key = %key, error = %err, "Upload failed");
        let mut state = self.lock();
        if state.closed {
            return UploadOutcome::Cancelled;
        }
        let Some(index) = state.files.iter().position(|f| f.key == key) else {
            return UploadOutcome::Discarded;
        };
        let entry = if self.config.remove_on_error {
            let mut removed = state.files.remove(index);
            removed.status = FileStatus::Error;
            removed
        } else {
            let kept = &mut state.files[index];
            kept.status = FileStatus::Error;
            kept.clone()
        };
        self.emit(UploadEvent::StatusChanged { entry });
        UploadOutcome::Failed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sized(size: u64) -> LocalFile {
        LocalFile {
            name: "big.bin".into(),
            size,
            content_type: None,
            bytes: Vec::new(),
        }
    }

    #[test]
    fn size_limit_is_exclusive() {
        let config = SyncConfig {
            max_size_mb: 2.0,
            ..Default::default()
        };
        assert!(validate(&config, 0, &sized(2 * 1024 * 1024 - 1)).is_ok());
        assert_eq!(
            validate(&config, 0, &sized(2 * 1024 * 1024)),
            Err(ValidationError::TooLarge {
                size: 2 * 1024 * 1024,
                max_size_mb: 2.0
            })
        );
    }

    #[test]
    fn count_limit_applies_to_bounded_multi_fields_only() {
        let multi = SyncConfig {
            max_count: Some(2),
            ..Default::default()
        };
        assert!(validate(&multi, 1, &sized(1)).is_ok());
        assert_eq!(
            validate(&multi, 2, &sized(1)),
            Err(ValidationError::TooManyFiles { max_count: 2 })
        );

        let single = SyncConfig::default();
        assert!(validate(&single, 1, &sized(1)).is_ok());

        let unbounded = SyncConfig {
            max_count: None,
            ..Default::default()
        };
        assert!(validate(&unbounded, 100, &sized(1)).is_ok());
    }

    #[test]
    fn too_large_message_names_the_limit() {
        let err = ValidationError::TooLarge {
            size: 1,
            max_size_mb: 5.0,
        };
        assert_eq!(err.to_string(), "File must not exceed 5MB");
    }
}
