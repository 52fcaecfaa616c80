use serde::Serialize;

use crate::bound_value::BoundValue;
use crate::contract::{FileInfo, UploadResult};
use crate::entry::FileEntry;

/// User-facing messages. Rendering them is up to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "level", content = "message", rename_all = "lowercase")]
pub enum Notice {
    Success(String),
    Error(String),
}

/// Everything the synchronizer reports to its host, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UploadEvent {
    /// An entry moved to a new status. Carries a snapshot of the entry.
    StatusChanged { entry: FileEntry },
    Progress { uid: String, percent: u32 },
    Success { file: FileInfo, result: UploadResult },
    Removed { entry: FileEntry },
    /// The bound value was written; the host should store the new value.
    ValueChanged { value: BoundValue },
    Notice { notice: Notice },
}
