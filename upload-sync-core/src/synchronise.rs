//! High-level component: keeps a bound value and a file list in step.
//!
//! [`UploadSynchronizer`] owns the two sides of an upload field:
//!   - the bound value the form stores (one URL or an ordered list of URLs),
//!   - the file list shown to the user, with per-file upload state.
//!
//! It runs three coordinators over them:
//!   - the reconciler ([`crate::reconcile`]): external writes to the bound value
//!     rebuild the file list,
//!   - the upload coordinator ([`crate::upload`]): selected files are validated,
//!     uploaded as independent tasks, and written back into the bound value,
//!   - the removal coordinator ([`crate::remove`]): entries are removed, after
//!     confirmation when configured.
//!
//! # Consistency
//! All state sits behind one mutex that is never held across an `.await`, so
//! observers see either the state before or after a mutation, never a half-done
//! one. Work that suspends (the request, the confirmation prompt) re-checks the
//! state when it resumes.
//!
//! # Events
//! Everything the host must know about is sent, in order, on the channel
//! returned by [`UploadSynchronizer::take_events`].
//!
//! # Teardown
//! [`UploadSynchronizer::shutdown`] closes the synchronizer and cancels the
//! shared token; no upload applies anything afterwards. Dropping the
//! synchronizer does the same when `abort_on_drop` is set.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bound_value::BoundValue;
use crate::config::{SyncConfig, UploadMode};
use crate::contract::{AlwaysConfirm, ConfirmPrompt, ConfirmRequest, LocalFile, UploadTransport};
use crate::entry::FileEntry;
use crate::events::{Notice, UploadEvent};
use crate::reconcile::{reconcile, EntryResolver, ReconcileLatch, UrlResolver};
use crate::upload::{validate, UploadTask, ValidationError};

pub(crate) struct SyncState {
    pub(crate) bound: BoundValue,
    pub(crate) files: Vec<FileEntry>,
    pub(crate) latch: ReconcileLatch,
    /// Cancellation handles of queued and running uploads, by entry key.
    pub(crate) in_flight: HashMap<String, CancellationToken>,
    pub(crate) closed: bool,
}

pub(crate) struct Shared {
    pub(crate) config: SyncConfig,
    resolver: Arc<dyn EntryResolver>,
    transport: Option<Arc<dyn UploadTransport>>,
    prompt: Arc<dyn ConfirmPrompt>,
    state: Mutex<SyncState>,
    events: mpsc::UnboundedSender<UploadEvent>,
    pub(crate) cancel: CancellationToken,
}

impl Shared {
    pub(crate) fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: UploadEvent) {
        // The host may have dropped its receiver; the state stays authoritative.
        let _ = self.events.send(event);
    }

    /// Stores `value` as the new bound value and runs the reconcile pass the
    /// change triggers.
    pub(crate) fn commit_bound_value(&self, state: &mut SyncState, value: BoundValue) {
        let value = value.conform(self.config.mode());
        if value != state.bound {
            state.bound = value.clone();
            self.emit(UploadEvent::ValueChanged { value });
        }
        self.reconcile_pass(state);
    }

    fn reconcile_pass(&self, state: &mut SyncState) {
        let suppressed = state.latch.take();
        if state.bound.is_empty() {
            self.replace_files(state, Vec::new());
            return;
        }
        if suppressed {
            debug!("Skipping reconcile for the value written by our own upload");
            return;
        }

        let out = reconcile(&state.bound, self.config.keep_missing_id, self.resolver.as_ref());
        debug!(entries = out.files.len(), pruned = out.rewrite.is_some(), "Reconciled file list");
        self.replace_files(state, out.files);
        if let Some(value) = out.rewrite {
            info!(value = ?value, "Pruning unresolved identifiers from bound value");
            state.bound = value.clone();
            self.emit(UploadEvent::ValueChanged { value });
        }
    }

    fn replace_files(&self, state: &mut SyncState, files: Vec<FileEntry>) {
        // Uploads whose entries were swept away have nothing left to update.
        for (key, token) in state.in_flight.drain() {
            debug!(key = %key, "Cancelling upload orphaned by reconcile");
            token.cancel();
        }
        state.files = files;
    }
}

/// Builds an [`UploadSynchronizer`].
pub struct UploadSynchronizerBuilder {
    config: SyncConfig,
    initial: Option<BoundValue>,
    resolver: Arc<dyn EntryResolver>,
    transport: Option<Arc<dyn UploadTransport>>,
    prompt: Option<Arc<dyn ConfirmPrompt>>,
}

impl UploadSynchronizerBuilder {
    pub fn transport(mut self, transport: Arc<dyn UploadTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn prompt(mut self, prompt: Arc<dyn ConfirmPrompt>) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn EntryResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// The bound value the form holds when the field is mounted.
    pub fn initial_value(mut self, value: impl Into<BoundValue>) -> Self {
        self.initial = Some(value.into());
        self
    }

    /// Creates the synchronizer and reconciles the initial value right away.
    pub fn build(self) -> UploadSynchronizer {
        let mode = self.config.mode();
        if self.transport.is_none() {
            warn!("No upload transport configured; uploads will be ignored");
        }
        let prompt = match self.prompt {
            Some(prompt) => prompt,
            None => {
                if self.config.remove_confirm {
                    warn!("remove_confirm is set but no prompt was given; removals are auto-confirmed");
                }
                Arc::new(AlwaysConfirm)
            }
        };

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            config: self.config,
            resolver: self.resolver,
            transport: self.transport,
            prompt,
            state: Mutex::new(SyncState {
                bound: BoundValue::empty(mode),
                files: Vec::new(),
                latch: ReconcileLatch::Idle,
                in_flight: HashMap::new(),
                closed: false,
            }),
            events: events_tx,
            cancel: CancellationToken::new(),
        });

        {
            let mut state = shared.lock();
            let initial = self.initial.unwrap_or_else(|| BoundValue::empty(mode));
            state.bound = initial.conform(mode);
            shared.reconcile_pass(&mut state);
        }

        UploadSynchronizer {
            shared,
            events_rx: Some(events_rx),
        }
    }
}

/// Keeps a form field's bound value and its file list in step.
pub struct UploadSynchronizer {
    shared: Arc<Shared>,
    events_rx: Option<mpsc::UnboundedReceiver<UploadEvent>>,
}

impl UploadSynchronizer {
    pub fn builder(config: SyncConfig) -> UploadSynchronizerBuilder {
        UploadSynchronizerBuilder {
            config,
            initial: None,
            resolver: Arc::new(UrlResolver),
            transport: None,
            prompt: None,
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<UploadEvent>> {
        self.events_rx.take()
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    pub fn mode(&self) -> UploadMode {
        self.shared.config.mode()
    }

    pub fn bound_value(&self) -> BoundValue {
        self.shared.lock().bound.clone()
    }

    pub fn file_list(&self) -> Vec<FileEntry> {
        self.shared.lock().files.clone()
    }

    /// The accepted-formats hint for the UI.
    pub fn accept_str(&self) -> Option<String> {
        self.shared.config.accept_str()
    }

    /// The form wrote a new value; rebuild the file list from it.
    pub fn set_bound_value(&self, value: impl Into<BoundValue>) {
        let value = value.into();
        let mut state = self.shared.lock();
        if state.closed {
            debug!("Ignoring bound value written after shutdown");
            return;
        }
        let value = value.conform(self.mode());
        state.bound = value;
        self.shared.reconcile_pass(&mut state);
    }

    /// Pre-flight check. A refused file is reported as an error notice.
    pub fn validate(&self, file: LocalFile) -> Result<LocalFile, ValidationError> {
        let count = self.shared.lock().files.len();
        match validate(&self.shared.config, count, &file) {
            Ok(()) => Ok(file),
            Err(e) => {
                info!(file = %file.name, size = file.size, reason = %e, "File refused before upload");
                self.shared.emit(UploadEvent::Notice {
                    notice: Notice::Error(e.to_string()),
                });
                Err(e)
            }
        }
    }

    /// Uploads `file` in its own task. Without a transport this only logs a warning.
    pub fn upload(&self, file: LocalFile) -> Option<UploadTask> {
        let Some(transport) = self.shared.transport.clone() else {
            warn!(file = %file.name, "Upload transport must be configured; ignoring upload");
            return None;
        };
        self.shared.start_upload(transport, file)
    }

    /// Validates `file` and, when it passes, uploads it.
    pub fn add_file(&self, file: LocalFile) -> Result<Option<UploadTask>, ValidationError> {
        let file = self.validate(file)?;
        Ok(self.upload(file))
    }

    /// Removes the entry with `uid` (current, or the one it was queued with),
    /// asking first when `remove_confirm` is set.
    ///
    /// Resolves to `false` when the user declines or the entry is gone by the
    /// time the answer arrives.
    pub async fn remove(&self, uid: &str) -> bool {
        let (key, name) = {
            let state = self.shared.lock();
            match state.files.iter().find(|f| f.answers_to(uid)) {
                Some(entry) => (entry.key.clone(), entry.display_name.clone()),
                None => {
                    debug!(uid = %uid, "No entry to remove");
                    return false;
                }
            }
        };

        if self.shared.config.remove_confirm {
            let confirmed = self.shared.prompt.confirm(ConfirmRequest::removal(&name)).await;
            if !confirmed {
                info!(uid = %uid, name = %name, "Removal declined");
                return false;
            }
        }
        // The upload may have finished meanwhile and changed the uid; the key holds.
        self.shared.remove_entry(&key)
    }

    /// Flags an entry as busy with a UI sub-operation. Returns `false` if the entry is gone.
    pub fn set_loading(&self, uid: &str, loading: bool) -> bool {
        let mut state = self.shared.lock();
        match state.files.iter_mut().find(|f| f.answers_to(uid)) {
            Some(entry) => {
                entry.loading = loading;
                true
            }
            None => false,
        }
    }

    /// Closes the synchronizer and aborts every upload still in flight.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.in_flight.clear();
        }
        self.shared.cancel.cancel();
        info!("Upload synchronizer shut down");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }
}

impl Drop for UploadSynchronizer {
    fn drop(&mut self) {
        if self.shared.config.abort_on_drop {
            self.shutdown();
        }
    }
}
