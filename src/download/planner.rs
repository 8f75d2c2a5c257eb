//! Segment planning: splits a resource into contiguous byte ranges.

use super::error::DownloadError;
use super::spec::Segment;

/// Divides `[0, size]` into contiguous, non-overlapping segments.
///
/// A single segment spanning `[0, size]` is returned when the size is unknown
/// (`0`) or the server does not accept range requests. Otherwise segment `i`
/// starts at `floor(size / n) * i`, inner segments end one byte before the
/// next start and the last segment ends at `size`, absorbing the remainder.
/// Resources smaller than the requested count get one segment per byte.
///
/// # Errors
///
/// Returns [`DownloadError::InvalidSegmentCount`] if `requested` is 0.
pub fn plan_segments(
    size: u64,
    requested: usize,
    accepts_ranges: bool,
) -> Result<Vec<Segment>, DownloadError> {
    if requested == 0 {
        return Err(DownloadError::InvalidSegmentCount { value: requested });
    }

    if size == 0 || !accepts_ranges {
        return Ok(vec![Segment::new(0, 0, size)]);
    }

    let count = u64::try_from(requested).unwrap_or(u64::MAX).min(size);
    let step = size / count;

    let segments = (0..count)
        .map(|i| {
            let start = step * i;
            let end = if i + 1 == count {
                size
            } else {
                step * (i + 1) - 1
            };
            // count never exceeds the requested usize, which callers bound well below u32::MAX
            Segment::new(u32::try_from(i).unwrap_or(u32::MAX), start, end)
        })
        .collect();

    Ok(segments)
}
