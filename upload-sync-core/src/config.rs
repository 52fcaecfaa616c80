use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

/// Whether the field holds one resource or an ordered list of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMode {
    Single,
    Multiple,
}

/// How the accepted-formats hint shown to the user is produced.
#[derive(Clone)]
pub enum AcceptFormat {
    /// Shown as-is.
    Literal(String),
    /// Derived from the raw `accept` list when the hint is requested.
    Derive(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl AcceptFormat {
    pub fn derive<F>(f: F) -> Self
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        AcceptFormat::Derive(Arc::new(f))
    }
}

impl fmt::Debug for AcceptFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AcceptFormat::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            AcceptFormat::Derive(_) => f.write_str("Derive(..)"),
        }
    }
}

/// Static configuration of one upload field. Fixed for the synchronizer's lifetime.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// `Some(1)` selects single mode; anything else is multi mode (`None` = unbounded).
    pub max_count: Option<usize>,
    /// Drop failed entries instead of keeping them with an error status.
    pub remove_on_error: bool,
    /// Ask before removing an entry.
    pub remove_confirm: bool,
    /// Keep identifiers that did not resolve to an entry.
    pub keep_missing_id: bool,
    /// Files of this size or larger (in MiB) are refused before upload.
    pub max_size_mb: f64,
    /// Raw accept list, e.g. `.jpg,.png`.
    pub accept: Option<String>,
    pub accept_format: Option<AcceptFormat>,
    pub show_success_msg: bool,
    /// Cancel in-flight uploads when the synchronizer is dropped.
    pub abort_on_drop: bool,
    /// Extra request fields forwarded to the transport with every file.
    pub extra_data: serde_json::Map<String, serde_json::Value>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_count: Some(1),
            remove_on_error: true,
            remove_confirm: false,
            keep_missing_id: false,
            max_size_mb: 5.0,
            accept: None,
            accept_format: None,
            show_success_msg: true,
            abort_on_drop: true,
            extra_data: serde_json::Map::new(),
        }
    }
}

impl SyncConfig {
    pub fn mode(&self) -> UploadMode {
        match self.max_count {
            Some(1) => UploadMode::Single,
            _ => UploadMode::Multiple,
        }
    }

    /// The accepted-formats hint for the UI.
    ///
    /// Without an explicit `accept_format`, leading dots are stripped from each
    /// entry of `accept` and the entries are joined with `", "`.
    pub fn accept_str(&self) -> Option<String> {
        match &self.accept_format {
            Some(AcceptFormat::Literal(s)) => Some(s.clone()),
            Some(AcceptFormat::Derive(f)) => Some(f(self.accept.as_deref().unwrap_or_default())),
            None => self.accept.as_ref().map(|accept| {
                accept
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| item.strip_prefix('.').unwrap_or(item))
                    .collect::<Vec<_>>()
                    .join(", ")
            }),
        }
    }

    pub fn trace_loaded(&self) {
        info!(
            mode = ?self.mode(),
            max_count = ?self.max_count,
            max_size_mb = self.max_size_mb,
            remove_confirm = self.remove_confirm,
            keep_missing_id = self.keep_missing_id,
            "Loaded upload field config"
        );
        debug!(?self, "Upload field config (full debug)");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_follows_max_count() {
        let mut config = SyncConfig::default();
        assert_eq!(config.mode(), UploadMode::Single);
        config.max_count = Some(5);
        assert_eq!(config.mode(), UploadMode::Multiple);
        config.max_count = None;
        assert_eq!(config.mode(), UploadMode::Multiple);
    }

    #[test]
    fn default_accept_hint_strips_dots() {
        let config = SyncConfig {
            accept: Some(".jpg,.png, webp".into()),
            ..Default::default()
        };
        assert_eq!(config.accept_str().as_deref(), Some("jpg, png, webp"));
    }

    #[test]
    fn accept_format_overrides_default_hint() {
        let literal = SyncConfig {
            accept: Some(".jpg".into()),
            accept_format: Some(AcceptFormat::Literal("images only".into())),
            ..Default::default()
        };
        assert_eq!(literal.accept_str().as_deref(), Some("images only"));

        let derived = SyncConfig {
            accept: Some(".jpg,.png".into()),
            accept_format: Some(AcceptFormat::derive(|raw| format!("[{raw}]"))),
            ..Default::default()
        };
        assert_eq!(derived.accept_str().as_deref(), Some("[.jpg,.png]"));
    }

    #[test]
    fn no_accept_means_no_hint() {
        assert_eq!(SyncConfig::default().accept_str(), None);
    }
}
