//! Pseudo-path derivation and URI helpers.
//!
//! The compiler service addresses documents by a stable string handle, not a
//! URI. For `file://` URIs the handle is the filesystem path; for every other
//! scheme a synthesized tag is used, stable for the lifetime of the URI.

use lsp_types::Uri;

/// Extract the scheme of a URI, lowercased.
///
/// Returns `None` for relative references (no scheme).
pub fn uri_scheme(uri: &Uri) -> Option<String> {
    let s = uri.as_str();
    let colon = s.find(':')?;
    let scheme = &s[..colon];
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '-' || c == '.')
    {
        return None;
    }
    Some(scheme.to_ascii_lowercase())
}

/// Derive the compiler-service document handle for a URI.
///
/// `file://` URIs map to their filesystem path. Any other scheme maps to a
/// synthesized tag of the form `<scheme>-<remainder>` so two distinct URIs
/// never collide with a real path.
pub fn pseudo_path(uri: &Uri) -> String {
    let s = uri.as_str();
    if let Some(path) = s.strip_prefix("file://") {
        return percent_decode(path);
    }
    match uri_scheme(uri) {
        Some(scheme) => {
            let rest = &s[scheme.len() + 1..];
            let rest = rest.trim_start_matches('/');
            format!("{scheme}-{rest}")
        }
        None => s.to_string(),
    }
}

/// Parse a compiler-service document name back into a URI.
///
/// Names with a leading `/` are filesystem paths; anything else is expected
/// to already be a URI string.
pub fn uri_from_document_name(name: &str) -> Option<Uri> {
    if name.starts_with('/') {
        format!("file://{name}").parse().ok()
    } else {
        name.parse().ok()
    }
}

/// Decode percent-escapes in a URI path component.
fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uri(s: &str) -> Uri {
        s.parse().expect("valid uri")
    }

    #[test]
    fn test_scheme_extraction() {
        assert_eq!(uri_scheme(&uri("file:///a/b.swift")), Some("file".into()));
        assert_eq!(uri_scheme(&uri("git://x/y")), Some("git".into()));
    }

    #[test]
    fn test_file_pseudo_path() {
        assert_eq!(pseudo_path(&uri("file:///a/b.swift")), "/a/b.swift");
        assert_eq!(
            pseudo_path(&uri("file:///a/with%20space.swift")),
            "/a/with space.swift"
        );
    }

    #[test]
    fn test_non_file_pseudo_path_is_tagged() {
        let p = pseudo_path(&uri("untitled:Untitled-1"));
        assert!(p.starts_with("untitled-"));
        assert!(!p.starts_with('/'));
    }

    #[test]
    fn test_document_name_round_trip() {
        let u = uri_from_document_name("/abs/path/x.swift").expect("parsed");
        assert_eq!(u.as_str(), "file:///abs/path/x.swift");

        let u = uri_from_document_name("untitled:Untitled-1").expect("parsed");
        assert_eq!(u.as_str(), "untitled:Untitled-1");
    }
}
