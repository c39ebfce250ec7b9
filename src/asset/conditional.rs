//! `If-None-Match` evaluation.
//!
//! A deliberately simple comparison: one layer of surrounding double quotes
//! is removed from both sides and the remainders are compared as opaque
//! strings.  The request header is a single token; lists, wildcards and the
//! weak/strong distinction are not interpreted.

/// Result of evaluating a conditional request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conditional {
    NotModified,
    Proceed,
}

/// Strip one layer of surrounding double quotes.
pub fn strip_etag_quotes(etag: &str) -> &str {
    let etag = etag.trim();
    etag.strip_prefix('"')
        .and_then(|e| e.strip_suffix('"'))
        .unwrap_or(etag)
}

/// Decide whether the request can be answered with 304.
///
/// Both `if_none_match` and `object_etag` must be non-empty for a match.
pub fn evaluate(if_none_match: Option<&str>, object_etag: &str) -> Conditional {
    let object_etag = strip_etag_quotes(object_etag);
    if object_etag.is_empty() {
        return Conditional::Proceed;
    }
    match if_none_match.map(str::trim) {
        Some(inm) if !inm.is_empty() && strip_etag_quotes(inm) == object_etag => {
            Conditional::NotModified
        }
        _ => Conditional::Proceed,
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_etag_quotes() {
        assert_eq!(strip_etag_quotes("\"abc123\""), "abc123");
        assert_eq!(strip_etag_quotes("abc123"), "abc123");
        assert_eq!(strip_etag_quotes("\"\""), "");
        assert_eq!(strip_etag_quotes(""), "");
        assert_eq!(strip_etag_quotes("\""), "\"");
        assert_eq!(strip_etag_quotes("\"\"abc\"\""), "\"abc\"");
    }

    #[test]
    fn test_match_ignores_quoting_on_either_side() {
        assert_eq!(evaluate(Some("\"abc\""), "abc"), Conditional::NotModified);
        assert_eq!(evaluate(Some("abc"), "\"abc\""), Conditional::NotModified);
        assert_eq!(evaluate(Some(" \"abc\" "), "\"abc\""), Conditional::NotModified);
    }

    #[test]
    fn test_mismatch_proceeds() {
        assert_eq!(evaluate(Some("\"other\""), "\"abc\""), Conditional::Proceed);
        assert_eq!(evaluate(None, "\"abc\""), Conditional::Proceed);
        assert_eq!(evaluate(Some(""), "\"abc\""), Conditional::Proceed);
    }

    #[test]
    fn test_header_is_single_token() {
        assert_eq!(
            evaluate(Some("\"abc\", \"def\""), "\"abc\""),
            Conditional::Proceed
        );
        assert_eq!(evaluate(Some("*"), "\"abc\""), Conditional::Proceed);
        assert_eq!(evaluate(Some("W/\"abc\""), "\"abc\""), Conditional::Proceed);
    }

    #[test]
    fn test_empty_object_etag_never_matches() {
        assert_eq!(evaluate(Some("\"\""), ""), Conditional::Proceed);
        assert_eq!(evaluate(Some("x"), "  "), Conditional::Proceed);
    }
}
