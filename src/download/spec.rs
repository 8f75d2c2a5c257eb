//! Download and segment descriptors persisted between attempts.

use std::fmt;

use rand::RngCore;
use serde::{Deserialize, Serialize};

/// One contiguous byte range of a download, fetched independently.
///
/// `start` and `end` are inclusive. The last segment of a download uses
/// `end == size` as an "until end of stream" sentinel, so it holds
/// `size - start` bytes rather than `end - start + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    /// Position in byte order, storage naming and merge order.
    pub index: u32,
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive), or the total size for the last segment.
    pub end: u64,
    /// Bytes stored for this segment at the last checkpoint.
    #[serde(default)]
    pub written: u64,
}

impl Segment {
    /// Creates a segment with no recorded progress.
    #[must_use]
    pub fn new(index: u32, start: u64, end: u64) -> Self {
        Self {
            index,
            start,
            end,
            written: 0,
        }
    }

    /// Returns true if this segment runs to the end of the resource.
    #[must_use]
    pub fn is_open_ended(&self, total_size: u64) -> bool {
        self.end == total_size
    }

    /// Returns the number of bytes this segment must hold, if known.
    ///
    /// Unknown when the resource size itself is unknown (`total_size == 0`).
    #[must_use]
    pub fn expected_len(&self, total_size: u64) -> Option<u64> {
        if total_size == 0 {
            return None;
        }
        if self.is_open_ended(total_size) {
            Some(self.end.saturating_sub(self.start))
        } else {
            Some(self.end.saturating_sub(self.start) + 1)
        }
    }
}

/// Everything needed to (re)start a segmented download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadSpec {
    /// Unique, immutable identifier; also the storage directory name.
    pub id: String,
    /// Fully-qualified source URL.
    pub url: String,
    /// Validated destination filename.
    pub name: String,
    /// Total size in bytes, 0 when unknown.
    pub size: u64,
    /// Entity tag captured when the download was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_token: Option<String>,
    /// Segments in index order, covering `[0, size]`.
    pub segments: Vec<Segment>,
}

impl DownloadSpec {
    /// Returns true if interrupted progress can be checkpointed and resumed.
    #[must_use]
    pub fn is_resumable(&self) -> bool {
        self.size > 0 && !self.segments.is_empty()
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Returns the total bytes recorded across all segments.
    #[must_use]
    pub fn written(&self) -> u64 {
        self.segments.iter().map(|s| s.written).sum()
    }
}

impl fmt::Display for DownloadSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            " ⁕ {} ⇒ URL: {} Size: {}",
            self.id,
            self.url,
            readable_size(self.size)
        )
    }
}

/// Generates a download id: 8 random bytes in hex followed by the filename.
///
/// The filename suffix keeps ids recognizable in `list` output while the
/// random prefix allows the same file to be fetched from several sources.
#[must_use]
pub fn generate_download_id(name: &str) -> String {
    let mut bytes = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut bytes);
    let prefix: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
    format!("{prefix}-{name}")
}

/// Formats a byte count with SI units, e.g. `21.2 MB`.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn readable_size(bytes: u64) -> String {
    const SI: u64 = 1000;
    const UNITS: &[u8] = b"kMGTPE";

    if bytes < SI {
        return format!("{bytes} B");
    }

    let mut div = SI;
    let mut exp = 0;
    let mut n = bytes / SI;
    while n >= SI {
        div *= SI;
        exp += 1;
        n /= SI;
    }

    format!(
        "{:.1} {}B",
        bytes as f64 / div as f64,
        char::from(UNITS[exp])
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_expected_len_inner_segment_is_inclusive() {
        let segment = Segment::new(0, 0, 49);
        assert_eq!(segment.expected_len(150), Some(50));
    }

    #[test]
    fn test_expected_len_last_segment_uses_size_sentinel() {
        let segment = Segment::new(2, 100, 150);
        assert!(segment.is_open_ended(150));
        assert_eq!(segment.expected_len(150), Some(50));
    }

    #[test]
    fn test_expected_len_unknown_size() {
        let segment = Segment::new(0, 0, 0);
        assert_eq!(segment.expected_len(0), None);
    }

    #[test]
    fn test_resumable_requires_known_size() {
        let mut spec = DownloadSpec {
            id: "abc-file.bin".to_string(),
            url: "https://example.com/file.bin".to_string(),
            name: "file.bin".to_string(),
            size: 0,
            version_token: None,
            segments: vec![Segment::new(0, 0, 0)],
        };
        assert!(!spec.is_resumable());

        spec.size = 10;
        spec.segments = vec![Segment::new(0, 0, 10)];
        assert!(spec.is_resumable());

        spec.segments.clear();
        assert!(!spec.is_resumable());
    }

    #[test]
    fn test_spec_json_tolerates_missing_written_and_token() {
        let raw = r#"{"id":"x-a.bin","url":"https://h/a.bin","name":"a.bin","size":4,
            "segments":[{"index":0,"start":0,"end":4}]}"#;
        let spec: DownloadSpec = serde_json::from_str(raw).unwrap();
        assert_eq!(spec.segments[0].written, 0);
        assert!(spec.version_token.is_none());
    }

    #[test]
    fn test_generate_download_id_format() {
        let id = generate_download_id("go1.17.2.src.tar.gz");
        let (prefix, name) = id.split_once('-').unwrap();
        assert_eq!(prefix.len(), 16);
        assert!(prefix.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(name, "go1.17.2.src.tar.gz");
        assert_ne!(id, generate_download_id("go1.17.2.src.tar.gz"));
    }

    #[test]
    fn test_readable_size() {
        assert_eq!(readable_size(0), "0 B");
        assert_eq!(readable_size(999), "999 B");
        assert_eq!(readable_size(1000), "1.0 kB");
        assert_eq!(readable_size(21_200_000), "21.2 MB");
        assert_eq!(readable_size(3_500_000_000), "3.5 GB");
    }

    #[test]
    fn test_display_lists_id_url_and_size() {
        let spec = DownloadSpec {
            id: "9218d55b6ba5da11-go.tar.gz".to_string(),
            url: "https://golang.org/dl/go.tar.gz".to_string(),
            name: "go.tar.gz".to_string(),
            size: 21_200_000,
            version_token: None,
            segments: vec![Segment::new(0, 0, 21_200_000)],
        };
        let line = spec.to_string();
        assert!(line.contains("9218d55b6ba5da11-go.tar.gz"));
        assert!(line.contains("https://golang.org/dl/go.tar.gz"));
        assert!(line.contains("21.2 MB"));
    }
}
