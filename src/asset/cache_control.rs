//! `Cache-Control` selection.
//!
//! A non-empty override wins for every key.  Otherwise keys whose final
//! segment carries a version marker (`.v` followed by a digit, e.g.
//! `report.v20250101T000000Z.pdf`) are treated as never overwritten in place
//! and get the long-lived directive.  The marker is a naming convention only;
//! the backend is not consulted.

use crate::asset::key::ObjectKey;

/// Configured directive strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    /// Applied to every key when non-empty.
    pub override_value: String,
    pub default_value: String,
    pub immutable_value: String,
}

/// A resolved `Cache-Control` value and the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheDirective {
    Override(String),
    Immutable(String),
    Default(String),
}

impl CacheDirective {
    pub fn value(&self) -> &str {
        match self {
            CacheDirective::Override(v) | CacheDirective::Immutable(v) | CacheDirective::Default(v) => v,
        }
    }
}

impl CachePolicy {
    pub fn select(&self, key: &ObjectKey) -> CacheDirective {
        if !self.override_value.is_empty() {
            CacheDirective::Override(self.override_value.clone())
        } else if is_immutable_key(key) {
            CacheDirective::Immutable(self.immutable_value.clone())
        } else {
            CacheDirective::Default(self.default_value.clone())
        }
    }
}

/// True when the final path segment contains `.v<digit>`.
pub fn is_immutable_key(key: &ObjectKey) -> bool {
    key.file_name()
        .as_bytes()
        .windows(3)
        .any(|w| w[0] == b'.' && w[1] == b'v' && w[2].is_ascii_digit())
}

// -- Tests --------------------------------------------------------------------
