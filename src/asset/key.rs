//! Object key validation and prefix allow-listing.

use std::fmt;

use crate::errors::{BadRequestKind, ForbiddenKind};

/// Routing prefix stripped from the request path before validation.
pub const ASSET_ROUTE_PREFIX: &str = "/assets/";

/// A validated, slash-delimited, relative object key.
///
/// Never empty, never starts with `/`, contains no backslash and no empty,
/// `.` or `..` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Validate a key that has already had the routing prefix removed.
    ///
    /// Checks run on the whitespace-trimmed text, so a blank key is empty.
    /// The key itself is kept as given.
    pub fn parse(key: &str) -> Result<Self, BadRequestKind> {
        let checked = key.trim();
        if checked.is_empty() {
            return Err(BadRequestKind::EmptyKey);
        }
        if checked.contains('\\') {
            return Err(BadRequestKind::BackslashInKey);
        }
        if checked.starts_with('/') {
            return Err(BadRequestKind::LeadingSlash);
        }
        for segment in checked.split('/') {
            match segment {
                "" => return Err(BadRequestKind::EmptySegment),
                "." | ".." => return Err(BadRequestKind::TraversalSegment),
                _ => {}
            }
        }
        Ok(Self(key.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip [`ASSET_ROUTE_PREFIX`] from a decoded request path and validate the rest.
pub fn validate_asset_path(path: &str) -> Result<ObjectKey, BadRequestKind> {
    let key = path
        .strip_prefix(ASSET_ROUTE_PREFIX)
        .ok_or(BadRequestKind::MissingPrefix)?;
    ObjectKey::parse(key)
}

/// Allow-list of key prefixes.  An empty list allows every key.
#[derive(Debug, Clone, Default)]
pub struct PrefixAuthorizer {
    prefixes: Vec<String>,
}

impl PrefixAuthorizer {
    /// Build from configured prefixes, trimming whitespace and dropping blanks.
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(|p| p.as_ref().trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    pub fn is_open(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// True when the key may be served.
    pub fn allows(&self, key: &ObjectKey) -> bool {
        self.is_open()
            || self
                .prefixes
                .iter()
                .any(|p| key.as_str().starts_with(p.as_str()))
    }

    pub fn authorize(&self, key: &ObjectKey) -> Result<(), ForbiddenKind> {
        if self.allows(key) {
            Ok(())
        } else {
            Err(ForbiddenKind::PrefixNotAllowed)
        }
    }
}

// -- Tests --------------------------------------------------------------------
