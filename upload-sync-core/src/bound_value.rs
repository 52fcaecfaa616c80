//! The field value the surrounding form owns: one resource reference or an
//! ordered list of them.

use serde::{Deserialize, Serialize};

use crate::config::UploadMode;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundValue {
    Single(String),
    Multiple(Vec<String>),
}

impl BoundValue {
    pub fn empty(mode: UploadMode) -> Self {
        match mode {
            UploadMode::Single => BoundValue::Single(String::new()),
            UploadMode::Multiple => BoundValue::Multiple(Vec::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            BoundValue::Single(s) => s.is_empty(),
            BoundValue::Multiple(list) => list.is_empty(),
        }
    }

    /// The value as a list; a scalar becomes a one-element list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            BoundValue::Single(s) => vec![s.clone()],
            BoundValue::Multiple(list) => list.clone(),
        }
    }

    /// Reshapes the value into the variant `mode` requires.
    ///
    /// A scalar handed to a multi field becomes a list (empty for `""`); a list
    /// handed to a single field keeps its first element.
    pub fn conform(self, mode: UploadMode) -> Self {
        match (mode, self) {
            (UploadMode::Single, BoundValue::Multiple(list)) => {
                BoundValue::Single(list.into_iter().next().unwrap_or_default())
            }
            (UploadMode::Multiple, BoundValue::Single(s)) if s.is_empty() => {
                BoundValue::Multiple(Vec::new())
            }
            (UploadMode::Multiple, BoundValue::Single(s)) => BoundValue::Multiple(vec![s]),
            (_, value) => value,
        }
    }
}

impl From<&str> for BoundValue {
    fn from(value: &str) -> Self {
        BoundValue::Single(value.to_string())
    }
}

impl From<String> for BoundValue {
    fn from(value: String) -> Self {
        BoundValue::Single(value)
    }
}

impl From<Vec<String>> for BoundValue {
    fn from(value: Vec<String>) -> Self {
        BoundValue::Multiple(value)
    }
}

impl From<Vec<&str>> for BoundValue {
    fn from(value: Vec<&str>) -> Self {
        BoundValue::Multiple(value.into_iter().map(str::to_string).collect())
    }
}
