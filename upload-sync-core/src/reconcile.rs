//! # reconcile: rebuilding the file list from the bound value
//!
//! Whenever the bound value changes from outside, the file list is derived from
//! it again. The derivation itself ([`reconcile`]) is a pure function of the
//! value, the `keep_missing_id` flag and the [`EntryResolver`]; applying it to
//! the synchronizer's state is done by the caller inside one critical section.
//!
//! Writes the synchronizer performs itself after an upload arm a
//! [`ReconcileLatch`] so that the pass they trigger is skipped.

use tracing::debug;

use crate::bound_value::BoundValue;
use crate::entry::FileEntry;

#[allow(unused_imports)]
use mockall::{automock, predicate::*};

/// Turns one element of the bound value into a file entry.
///
/// Returning `None` marks the element as unresolved; unless `keep_missing_id`
/// is set, unresolved elements are pruned from the bound value.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
pub trait EntryResolver: Send + Sync {
    fn resolve(&self, element: &str) -> Option<FileEntry>;
}

/// Treats each element as a resource URL. Blank elements do not resolve.
#[derive(Debug, Default, Clone, Copy)]
pub struct UrlResolver;

impl EntryResolver for UrlResolver {
    fn resolve(&self, element: &str) -> Option<FileEntry> {
        if element.trim().is_empty() {
            return None;
        }
        Some(FileEntry::from_url(element))
    }
}

/// One-shot suppression of the reconcile pass caused by the synchronizer's own write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconcileLatch {
    #[default]
    Idle,
    SuppressNextReconcile,
}

impl ReconcileLatch {
    pub fn arm(&mut self) {
        *self = ReconcileLatch::SuppressNextReconcile;
    }

    /// Resets the latch, returning whether it was armed.
    pub fn take(&mut self) -> bool {
        std::mem::take(self) == ReconcileLatch::SuppressNextReconcile
    }
}

/// Result of deriving the file list from a bound value.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub files: Vec<FileEntry>,
    /// Replacement for the bound value, when unresolved elements must go.
    pub rewrite: Option<BoundValue>,
}

pub fn reconcile(
    value: &BoundValue,
    keep_missing_id: bool,
    resolver: &dyn EntryResolver,
) -> Reconciliation {
    if value.is_empty() {
        return Reconciliation {
            files: Vec::new(),
            rewrite: None,
        };
    }

    let elements = value.to_list();
    let mut files = Vec::with_capacity(elements.len());
    let mut survivors = Vec::with_capacity(elements.len());
    for element in elements {
        match resolver.resolve(&element) {
            Some(mut entry) => {
                entry.bound_key = Some(element.clone());
                files.push(entry);
                survivors.push(element);
            }
            None => debug!(element = %element, "Bound element did not resolve to a file entry"),
        }
    }

    let rewrite = match value {
        BoundValue::Single(_) if files.is_empty() && !keep_missing_id => {
            Some(BoundValue::Single(String::new()))
        }
        BoundValue::Multiple(list) if files.len() != list.len() && !keep_missing_id => {
            Some(BoundValue::Multiple(survivors))
        }
        _ => None,
    };

    Reconciliation { files, rewrite }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observable(files: &[FileEntry]) -> Vec<(Option<String>, String)> {
        files
            .iter()
            .map(|f| (f.url.clone(), f.display_name.clone()))
            .collect()
    }

    #[test]
    fn latch_fires_once() {
        let mut latch = ReconcileLatch::default();
        assert!(!latch.take());
        latch.arm();
        assert!(latch.take());
        assert!(!latch.take());
    }

    #[test]
    fn reconciling_twice_gives_equal_entries() {
        let value = BoundValue::from(vec!["https://x/a.png", "https://x/b.png"]);
        let first = reconcile(&value, false, &UrlResolver);
        let second = reconcile(&value, false, &UrlResolver);
        assert_eq!(observable(&first.files), observable(&second.files));
        assert_eq!(first.rewrite, None);
    }

    #[test]
    fn unresolved_elements_are_pruned_in_multi_mode() {
        let mut resolver = MockEntryResolver::new();
        resolver
            .expect_resolve()
            .returning(|el| (el == "u1").then(|| FileEntry::from_url(el)));

        let out = reconcile(&BoundValue::from(vec!["u1", "u2"]), false, &resolver);
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.rewrite, Some(BoundValue::from(vec!["u1"])));
    }

    #[test]
    fn unresolved_elements_are_kept_when_asked() {
        let value = BoundValue::from(vec!["https://x/a.png", " "]);
        let out = reconcile(&value, true, &UrlResolver);
        assert_eq!(out.files.len(), 1);
        assert_eq!(out.rewrite, None);
    }

    #[test]
    fn unresolved_single_value_is_reset() {
        let out = reconcile(&BoundValue::from("  "), false, &UrlResolver);
        assert!(out.files.is_empty());
        assert_eq!(out.rewrite, Some(BoundValue::from("")));

        let kept = reconcile(&BoundValue::from("  "), true, &UrlResolver);
        assert_eq!(kept.rewrite, None);
    }

    #[test]
    fn entries_remember_the_element_they_resolved() {
        let mut resolver = MockEntryResolver::new();
        resolver
            .expect_resolve()
            .returning(|el| Some(FileEntry::from_url(&format!("https://cdn/{el}.png"))));

        let out = reconcile(&BoundValue::from(vec!["id1", "id2"]), false, &resolver);
        let keys: Vec<_> = out.files.iter().map(|f| f.bound_key.as_deref()).collect();
        assert_eq!(keys, vec![Some("id1"), Some("id2")]);
        assert_eq!(out.files[0].url.as_deref(), Some("https://cdn/id1.png"));
    }

    #[test]
    fn duplicates_are_preserved() {
        let value = BoundValue::from(vec!["https://x/a.png", "https://x/a.png"]);
        let out = reconcile(&value, false, &UrlResolver);
        assert_eq!(out.files.len(), 2);
        assert_ne!(out.files[0].uid, out.files[1].uid);
        assert_eq!(out.rewrite, None);
    }
}
