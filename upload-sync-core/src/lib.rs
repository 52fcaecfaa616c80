#![doc = "upload-sync-core: keeps an upload field's bound value and its file list in step."]

//! This crate holds the synchronization engine behind an upload form field:
//! the bound value the form stores, the file list the user sees, and the
//! upload and removal flows that connect the two. Network and user interaction
//! go through the traits in [`contract`].
//!
//! # Usage
//! Build an [`UploadSynchronizer`] from a [`SyncConfig`], give it an
//! [`UploadTransport`], and drain [`UploadEvent`]s from `take_events()`.

pub mod bound_value;
pub mod config;
pub mod contract;
pub mod entry;
pub mod events;
pub mod reconcile;
pub mod remove;
pub mod synchronise;
pub mod upload;

pub use bound_value::BoundValue;
pub use config::{AcceptFormat, SyncConfig, UploadMode};
pub use contract::{
    AlwaysConfirm, ConfirmPrompt, ConfirmRequest, FileInfo, LocalFile, ProgressReporter,
    TransportError, UploadOptions, UploadResult, UploadTransport,
};
pub use entry::{FileEntry, FileStatus};
pub use events::{Notice, UploadEvent};
pub use reconcile::{EntryResolver, ReconcileLatch, UrlResolver};
pub use synchronise::{UploadSynchronizer, UploadSynchronizerBuilder};
pub use upload::{UploadOutcome, UploadTask, ValidationError};
