use percent_encoding::percent_decode_str;
use serde::Serialize;
use uuid::Uuid;

use crate::contract::{LocalFile, UploadResult};

/// Lifecycle of one entry: `Pending -> Uploading -> Done | Error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Uploading,
    Done,
    Error,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, FileStatus::Done | FileStatus::Error)
    }
}

/// One row of the file list the synchronizer keeps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEntry {
    /// Identifier hosts see. Becomes the backend's id once an upload succeeds.
    pub uid: String,
    /// Fixed for the entry's whole life, unlike `uid`.
    #[serde(skip)]
    pub(crate) key: String,
    pub name: String,
    pub display_name: String,
    pub url: Option<String>,
    pub preview_url: Option<String>,
    /// The bound value element this entry stands for.
    pub bound_key: Option<String>,
    pub status: FileStatus,
    pub percent: u32,
    /// Set by dependent UI state while a sub-operation on this entry runs.
    pub loading: bool,
}

impl FileEntry {
    /// A freshly selected file, before its request is issued.
    pub fn pending(uid: String, file: &LocalFile) -> Self {
        Self {
            key: uid.clone(),
            uid,
            name: file.name.clone(),
            display_name: file.name.clone(),
            url: None,
            preview_url: None,
            bound_key: None,
            status: FileStatus::Pending,
            percent: 0,
            loading: false,
        }
    }

    /// An already uploaded resource known only by its URL.
    pub fn from_url(url: &str) -> Self {
        let name = parse_file_name(url);
        let uid = new_uid();
        Self {
            key: uid.clone(),
            uid,
            name: name.clone(),
            display_name: name,
            url: Some(url.to_string()),
            preview_url: Some(url.to_string()),
            bound_key: Some(url.to_string()),
            status: FileStatus::Done,
            percent: 100,
            loading: false,
        }
    }

    pub(crate) fn apply_result(&mut self, result: &UploadResult) {
        self.uid = result.id.clone();
        self.url = Some(result.url.clone());
        self.bound_key = Some(result.url.clone());
        self.display_name = result.original_name.clone();
        self.name = result.file_name.clone();
        self.preview_url = result.thumbnail_url.clone();
        self.status = FileStatus::Done;
        self.percent = 100;
    }

    /// Whether this entry occupies a slot in the bound value.
    pub fn is_bound(&self) -> bool {
        self.status == FileStatus::Done && self.bound_key.is_some()
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Matches the current uid as well as the one the entry was created with.
    pub fn answers_to(&self, id: &str) -> bool {
        self.uid == id || self.key == id
    }
}

pub fn new_uid() -> String {
    Uuid::new_v4().to_string()
}

/// Percent-decoded last path segment of `url`, or a fresh id when there is none.
pub fn parse_file_name(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let segment = path.rsplit('/').next().unwrap_or_default();
    let decoded = percent_decode_str(segment).decode_utf8_lossy();
    if decoded.is_empty() {
        new_uid()
    } else {
        decoded.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_is_last_segment_decoded() {
        assert_eq!(parse_file_name("https://x/a/b/photo%20one.png"), "photo one.png");
        assert_eq!(parse_file_name("https://x/a.png?sig=1#top"), "a.png");
        assert_eq!(parse_file_name("plain.txt"), "plain.txt");
    }

    #[test]
    fn file_name_falls_back_to_fresh_id() {
        let name = parse_file_name("https://x/dir/");
        assert!(Uuid::parse_str(&name).is_ok(), "expected a uuid, got {name}");
    }

    #[test]
    fn url_entries_are_done_with_fresh_uid() {
        let entry = FileEntry::from_url("https://x/a.png");
        assert_eq!(entry.status, FileStatus::Done);
        assert_eq!(entry.display_name, "a.png");
        assert_ne!(entry.uid, "https://x/a.png");
        assert_eq!(entry.bound_key.as_deref(), Some("https://x/a.png"));
        assert!(entry.is_bound());
    }

    #[test]
    fn key_survives_upload_result() {
        let mut entry = FileEntry::pending(new_uid(), &LocalFile::new("a.png", vec![1]));
        let queued = entry.uid.clone();
        assert!(!entry.is_bound());

        entry.apply_result(&UploadResult {
            id: "srv-1".into(),
            url: "https://x/a.png".into(),
            file_name: "stored_a.png".into(),
            original_name: "a.png".into(),
            thumbnail_url: None,
        });

        assert_eq!(entry.uid, "srv-1");
        assert_eq!(entry.key(), queued);
        assert!(entry.answers_to(&queued));
        assert!(entry.answers_to("srv-1"));
        assert_eq!(entry.bound_key.as_deref(), Some("https://x/a.png"));
        assert!(entry.is_bound());
    }
}
