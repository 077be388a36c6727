//! Repair of target URLs that arrive as an HTTP request path.
//!
//! Path cleaners between the client and the proxy commonly collapse `//` to
//! `/`, which turns `https://github.com/...` into `https:/github.com/...`.

use std::borrow::Cow;
use std::str::Utf8Error;

use percent_encoding::percent_decode_str;

/// Restore the scheme separator of the first `https:/` and the first
/// `http:/` in `path`.  Input that already carries `://` is returned as-is.
pub fn repair_scheme(path: &str) -> String {
    let repaired = repair_first(path, "https:/");
    repair_first(&repaired, "http:/").into_owned()
}

fn repair_first<'a>(path: &'a str, collapsed: &str) -> Cow<'a, str> {
    let Some(idx) = path.find(collapsed) else {
        return Cow::Borrowed(path);
    };
    let tail = &path[idx + collapsed.len()..];
    // Already `://`. Skipping it keeps repair idempotent; do not add a third slash.
    if tail.starts_with('/') {
        return Cow::Borrowed(path);
    }
    let mut out = String::with_capacity(path.len() + 1);
    out.push_str(&path[..idx + collapsed.len()]);
    out.push('/');
    out.push_str(tail);
    Cow::Owned(out)
}

/// Percent-decode `path` for classification.
pub fn decode(path: &str) -> Result<String, Utf8Error> {
    percent_decode_str(path).decode_utf8().map(Cow::into_owned)
}
