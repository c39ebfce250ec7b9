//! Single byte-range parsing for the `Range` request header.
//!
//! Supported forms:
//!   - `bytes=<start>-<end>`
//!   - `bytes=<start>-`
//!   - `bytes=-<suffix-length>`
//!
//! Multiple comma-separated ranges are recognized and refused with
//! [`RangeError::MultiRangeUnsupported`].  Starts past the end of the object
//! are unsatisfiable; ends past the end are clamped.

use thiserror::Error;

/// An inclusive byte window inside an object: `start <= end < size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered by the window.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// `Content-Range` value for a window inside an object of `size` bytes.
    pub fn content_range(&self, size: u64) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, size)
    }
}

/// Why a `Range` header was not turned into a [`ByteRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("malformed range syntax")]
    MalformedSyntax,
    #[error("range start is beyond the end of the object")]
    OutOfBoundsStart,
    #[error("multiple ranges are not supported")]
    MultiRangeUnsupported,
}

impl RangeError {
    /// True for syntactically valid requests this server declines to serve.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, RangeError::MultiRangeUnsupported)
    }
}

const UNIT_PREFIX: &str = "bytes=";

/// Parse a `Range` header value against an object of `size` bytes.
///
/// Pure function of its inputs.
pub fn parse_single_range(header: &str, size: u64) -> Result<ByteRange, RangeError> {
    let header = header.trim();
    let unit = header
        .get(..UNIT_PREFIX.len())
        .ok_or(RangeError::MalformedSyntax)?;
    if !unit.eq_ignore_ascii_case(UNIT_PREFIX) {
        return Err(RangeError::MalformedSyntax);
    }

    let spec = header[UNIT_PREFIX.len()..].trim();
    if spec.is_empty() {
        return Err(RangeError::MalformedSyntax);
    }
    if spec.contains(',') {
        return Err(RangeError::MultiRangeUnsupported);
    }

    // An empty object has no satisfiable byte.
    if size == 0 {
        return Err(RangeError::OutOfBoundsStart);
    }

    // bytes=-N
    if let Some(suffix) = spec.strip_prefix('-') {
        let n: u64 = suffix
            .trim()
            .parse()
            .map_err(|_| RangeError::MalformedSyntax)?;
        if n == 0 {
            return Err(RangeError::MalformedSyntax);
        }
        return Ok(if n >= size {
            ByteRange {
                start: 0,
                end: size - 1,
            }
        } else {
            ByteRange {
                start: size - n,
                end: size - 1,
            }
        });
    }

    let (start_s, end_s) = spec.split_once('-').ok_or(RangeError::MalformedSyntax)?;
    let start: u64 = start_s
        .trim()
        .parse()
        .map_err(|_| RangeError::MalformedSyntax)?;
    if start >= size {
        return Err(RangeError::OutOfBoundsStart);
    }

    let end_s = end_s.trim();
    if end_s.is_empty() {
        return Ok(ByteRange {
            start,
            end: size - 1,
        });
    }

    let end: u64 = end_s.parse().map_err(|_| RangeError::MalformedSyntax)?;
    if end < start {
        return Err(RangeError::MalformedSyntax);
    }
    let end = end.min(size - 1);

    if start > end {
        return Err(RangeError::MalformedSyntax);
    }

    Ok(ByteRange { start, end })
}

// -- Tests --------------------------------------------------------------------
