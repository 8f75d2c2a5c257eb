//! Filename extraction, validation, and output path resolution.
//!
//! Filenames come from remote input (`Content-Disposition` or the URL path),
//! so they are validated against a conservative pattern before they are ever
//! joined onto a local directory.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;
use url::Url;

/// Longest accepted filename, in characters.
pub const MAX_FILENAME_LEN: usize = 255;

/// Word characters, limited punctuation, and at least one extension.
#[allow(clippy::expect_used)]
static FILENAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\w+[\w\-.]*\.\w+$").expect("static filename pattern")
});

/// Returns true if `name` is safe to use as a file name inside the output directory.
///
/// Rejects empty names, `.`/`..`, anything containing a path separator, names
/// longer than [`MAX_FILENAME_LEN`] characters, and names without an
/// extension-like suffix.
#[must_use]
pub fn validate_filename(name: &str) -> bool {
    if name.is_empty() || name == "." || name == ".." {
        return false;
    }
    if name.contains('/') || name.contains('\\') {
        return false;
    }
    if name.chars().count() > MAX_FILENAME_LEN {
        return false;
    }
    FILENAME_PATTERN.is_match(name)
}

/// Extracts the filename parameter from a `Content-Disposition` value.
///
/// The extended `filename*=charset'lang'value` form is preferred over plain
/// `filename=`, which may be quoted or bare.
pub(crate) fn parse_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').skip(1) {
        let Some((key, value)) = param.split_once('=') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_ascii_lowercase().as_str() {
            "filename*" => {
                let decoded = value
                    .rsplit_once('\'')
                    .and_then(|(_, encoded)| urlencoding::decode(encoded).ok());
                if let Some(name) = decoded.filter(|n| !n.is_empty()) {
                    return Some(name.into_owned());
                }
            }
            "filename" if plain.is_none() => {
                let unquoted = value
                    .strip_prefix('"')
                    .and_then(|v| v.strip_suffix('"'))
                    .unwrap_or(value);
                plain = Some(unquoted.to_string()).filter(|n| !n.is_empty());
            }
            _ => {}
        }
    }
    plain
}

/// Returns the percent-decoded last segment of the URL path, if any.
pub(crate) fn filename_from_url(url: &Url) -> Option<String> {
    let last = url.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    let decoded = urlencoding::decode(last).map_or_else(
        |e| {
            debug!(segment = %last, error = %e, "URL decoding failed, using raw segment");
            last.to_string()
        },
        std::borrow::Cow::into_owned,
    );
    Some(decoded)
}

/// Picks the download filename: a parseable Content-Disposition wins over the URL path.
pub(crate) fn select_filename(content_disposition: Option<&str>, url: &Url) -> String {
    content_disposition
        .and_then(parse_content_disposition)
        .or_else(|| filename_from_url(url))
        .unwrap_or_default()
}

/// Returns the `n`th candidate output name: `file.tar.gz` for 0, then
/// `file_1.tar.gz`, `file_2.tar.gz`. The counter goes before the first dot so
/// multi-part extensions stay intact.
pub(crate) fn numbered_filename(filename: &str, n: u32) -> String {
    if n == 0 {
        return filename.to_string();
    }
    let (stem, ext) = filename.split_at(filename.find('.').unwrap_or(filename.len()));
    format!("{stem}_{n}{ext}")
}
