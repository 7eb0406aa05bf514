//! DNS hostname syntax validation (RFC 952/1123 style).

/// Checks whether `input` is a syntactically legal DNS hostname.
///
/// A single trailing dot (fully-qualified form) is tolerated. The total
/// length must not exceed 253 characters, every label must be 1-63
/// characters from `[A-Za-z0-9-]` without a leading or trailing hyphen,
/// and the last label must not be purely numeric.
///
/// Total over all inputs: never panics, never errors.
pub fn is_valid_hostname(input: &str) -> bool {
    let name = input.strip_suffix('.').unwrap_or(input);
    if name.len() > 253 {
        return false;
    }
    let mut labels = name.split('.').peekable();
    let mut last_label = "";
    while let Some(label) = labels.next() {
        if !is_valid_label(label) {
            return false;
        }
        if labels.peek().is_none() {
            last_label = label;
        }
    }
    // A purely numeric top-level label is not a hostname (it is how IP
    // literals end up here).
    !last_label.bytes().all(|b| b.is_ascii_digit())
}

fn is_valid_label(label: &str) -> bool {
    let bytes = label.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    if bytes[0] == b'-' || bytes[bytes.len() - 1] == b'-' {
        return false;
    }
    bytes
        .iter()
        .all(|b| b.is_ascii_alphanumeric() || *b == b'-')
}
