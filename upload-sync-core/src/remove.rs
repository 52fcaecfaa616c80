//! # remove: taking an entry out of the file list and the bound value
//!
//! Removal works on the entry's identity: two entries may stand for the same
//! element, and only the slot belonging to the removed one may go. Each bound
//! entry records the element it stands for (`bound_key`: the element it was
//! resolved from, or the URL its upload wrote). The slot is found by rank: if
//! the entry is the k-th bound entry with its key in the file list, the k-th
//! occurrence of that key in the bound value is removed. Identifiers kept by
//! `keep_missing_id` (which have no entry) do not shift the result.

use tracing::{debug, info};

use crate::bound_value::BoundValue;
use crate::entry::FileEntry;
use crate::events::UploadEvent;
use crate::synchronise::Shared;

/// Index in `bound` of the slot owned by `files[index]`, if it owns one.
pub fn bound_slot(bound: &[String], files: &[FileEntry], index: usize) -> Option<usize> {
    let entry = files.get(index)?;
    if !entry.is_bound() {
        return None;
    }
    let element = entry.bound_key.as_deref()?;
    let rank = files[..index]
        .iter()
        .filter(|f| f.is_bound() && f.bound_key.as_deref() == Some(element))
        .count();
    bound
        .iter()
        .enumerate()
        .filter(|(_, el)| el.as_str() == element)
        .nth(rank)
        .map(|(slot, _)| slot)
}

impl Shared {
    /// Removes the entry with the stable `key` from both sides. Returns `false`
    /// when the entry is no longer there.
    pub(crate) fn remove_entry(&self, key: &str) -> bool {
        let mut guard = self.lock();
        let state = &mut *guard;
        if state.closed {
            return false;
        }
        let Some(index) = state.files.iter().position(|f| f.key == key) else {
            debug!(key = %key, "Entry to remove is gone");
            return false;
        };

        let value = match &state.bound {
            BoundValue::Single(_) => Some(BoundValue::Single(String::new())),
            BoundValue::Multiple(list) => bound_slot(list, &state.files, index).map(|slot| {
                let mut list = list.clone();
                list.remove(slot);
                BoundValue::Multiple(list)
            }),
        };

        let entry = state.files.remove(index);
        if let Some(token) = state.in_flight.remove(&entry.key) {
            token.cancel();
        }
        if let Some(value) = value {
            if value != state.bound {
                state.bound = value.clone();
                self.emit(UploadEvent::ValueChanged { value });
            }
        }

        info!(uid = %entry.uid, name = %entry.name, "Removed file entry");
        self.emit(UploadEvent::Removed { entry });
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::FileStatus;

    fn done(url: &str) -> FileEntry {
        FileEntry::from_url(url)
    }

    fn list(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn slot_follows_position_among_duplicates() {
        let files = vec![done("a"), done("b"), done("a")];
        let bound = list(&["a", "b", "a"]);
        assert_eq!(bound_slot(&bound, &files, 0), Some(0));
        assert_eq!(bound_slot(&bound, &files, 1), Some(1));
        assert_eq!(bound_slot(&bound, &files, 2), Some(2));
    }

    #[test]
    fn kept_missing_ids_do_not_shift_slots() {
        let files = vec![done("a"), done("c")];
        let bound = list(&["a", "missing", "c"]);
        assert_eq!(bound_slot(&bound, &files, 1), Some(2));
    }

    #[test]
    fn slot_follows_resolved_element_not_url() {
        let mut first = done("https://cdn/id1.png");
        first.bound_key = Some("id1".into());
        let mut second = done("https://cdn/id2.png");
        second.bound_key = Some("id2".into());
        let files = vec![first, second];
        let bound = list(&["id1", "id2"]);
        assert_eq!(bound_slot(&bound, &files, 0), Some(0));
        assert_eq!(bound_slot(&bound, &files, 1), Some(1));
    }

    #[test]
    fn unfinished_entries_own_no_slot() {
        let mut pending = done("a");
        pending.status = FileStatus::Uploading;
        let files = vec![pending];
        assert_eq!(bound_slot(&list(&["a"]), &files, 0), None);
    }
}
