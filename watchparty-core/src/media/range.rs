//! Byte range parsing and response planning

use super::{MediaAsset, MediaError};

/// Upper bound for an open-ended range (`bytes=N-`), 1 MiB.
/// Clients keep issuing follow-up range requests to stream the rest.
pub const CHUNK_SIZE: u64 = 1024 * 1024;

/// A single byte range as written in a `Range` header, before it is
/// checked against the asset size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// `bytes=start-end`
    Closed { start: u64, end: u64 },
    /// `bytes=start-`
    From { start: u64 },
    /// `bytes=-len`
    Suffix { len: u64 },
}

impl ByteRange {
    /// Parse a `Range` header value.
    ///
    /// Returns `None` for anything that is not a single well-formed byte
    /// range; callers then ignore the header and serve the whole asset.
    pub fn parse(header: &str) -> Option<Self> {
        let ranges = header.trim().strip_prefix("bytes=")?.trim();
        if ranges.contains(',') {
            return None;
        }

        let (start, end) = ranges.split_once('-')?;
        let (start, end) = (start.trim(), end.trim());

        match (start.is_empty(), end.is_empty()) {
            (true, true) => None,
            (true, false) => Some(ByteRange::Suffix {
                len: end.parse().ok()?,
            }),
            (false, true) => Some(ByteRange::From {
                start: start.parse().ok()?,
            }),
            (false, false) => {
                let start = start.parse().ok()?;
                let end = end.parse().ok()?;
                if end < start {
                    return None;
                }
                Some(ByteRange::Closed { start, end })
            }
        }
    }

    /// Resolve against an asset of `total` bytes
    pub fn resolve(self, total: u64) -> Result<RangeWindow, MediaError> {
        let unsatisfiable = MediaError::RangeNotSatisfiable { size: total };
        if total == 0 {
            return Err(unsatisfiable);
        }
        let last = total - 1;

        let (start, end) = match self {
            ByteRange::Closed { start, end } => (start, end.min(last)),
            ByteRange::From { start } => {
                (start, start.saturating_add(CHUNK_SIZE - 1).min(last))
            }
            ByteRange::Suffix { len } => {
                if len == 0 {
                    return Err(unsatisfiable);
                }
                (total - len.min(total), last)
            }
        };

        if start >= total {
            return Err(unsatisfiable);
        }

        Ok(RangeWindow { start, end, total })
    }
}

/// Inclusive byte window `start..=end` of an asset of `total` bytes.
/// Always satisfies `start <= end < total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeWindow {
    pub start: u64,
    pub end: u64,
    pub total: u64,
}

impl RangeWindow {
    /// The window covering the whole asset
    pub fn full(total: u64) -> Self {
        Self {
            start: 0,
            end: total.saturating_sub(1),
            total,
        }
    }

    /// Number of bytes in the window
    pub fn len(&self) -> u64 {
        if self.total == 0 {
            0
        } else {
            self.end - self.start + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Content-Range` header value
    pub fn content_range(&self) -> String {
        format!("bytes {}-{}/{}", self.start, self.end, self.total)
    }
}

/// What the streaming endpoint should answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServePlan {
    /// 200 with the whole asset
    Full { asset: MediaAsset },
    /// 206 with one window
    Partial {
        asset: MediaAsset,
        window: RangeWindow,
    },
}

impl ServePlan {
    pub fn asset(&self) -> &MediaAsset {
        match self {
            ServePlan::Full { asset } | ServePlan::Partial { asset, .. } => asset,
        }
    }

    /// The bytes this plan will send
    pub fn window(&self) -> RangeWindow {
        match self {
            ServePlan::Full { asset } => RangeWindow::full(asset.size_bytes),
            ServePlan::Partial { window, .. } => *window,
        }
    }
}

/// Decide how to answer a request for `asset` carrying an optional
/// `Range` header value
pub fn plan(asset: MediaAsset, range_header: Option<&str>) -> Result<ServePlan, MediaError> {
    if !asset.exists {
        return Err(MediaError::NotFound);
    }

    match range_header.and_then(ByteRange::parse) {
        Some(range) => {
            let window = range.resolve(asset.size_bytes)?;
            Ok(ServePlan::Partial { asset, window })
        }
        None => Ok(ServePlan::Full { asset }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn asset(size: u64) -> MediaAsset {
        MediaAsset {
            path: Some(PathBuf::from("movie.mp4")),
            size_bytes: size,
            mime_type: "video/mp4",
            exists: true,
        }
    }

    #[test]
    fn test_parse_range_header() {
        assert_eq!(
            ByteRange::parse("bytes=100-199"),
            Some(ByteRange::Closed { start: 100, end: 199 })
        );
        assert_eq!(ByteRange::parse("bytes=500-"), Some(ByteRange::From { start: 500 }));
        assert_eq!(ByteRange::parse("bytes=-20"), Some(ByteRange::Suffix { len: 20 }));
    }

    #[test]
    fn test_parse_rejects_unusable_headers() {
        assert_eq!(ByteRange::parse("items=0-1"), None);
        assert_eq!(ByteRange::parse("bytes=abc-"), None);
        assert_eq!(ByteRange::parse("bytes=-"), None);
        assert_eq!(ByteRange::parse("bytes=0-1,5-6"), None);
        assert_eq!(ByteRange::parse("bytes=10-5"), None);
    }

    #[test]
    fn test_open_range_is_bounded_by_chunk_size() {
        let total = 10 * CHUNK_SIZE;
        let window = ByteRange::From { start: 0 }.resolve(total).unwrap();
        assert_eq!(window.end, CHUNK_SIZE - 1);
        assert_eq!(window.len(), CHUNK_SIZE);

        // Near the end the window stops at the last byte
        let window = ByteRange::From { start: total - 10 }.resolve(total).unwrap();
        assert_eq!(window.end, total - 1);
        assert_eq!(window.len(), 10);
    }

    #[test]
    fn test_explicit_end_is_clamped() {
        let window = ByteRange::Closed { start: 100, end: 5000 }.resolve(1000).unwrap();
        assert_eq!((window.start, window.end, window.len()), (100, 999, 900));
        assert_eq!(window.content_range(), "bytes 100-999/1000");
    }

    #[test]
    fn test_suffix_range() {
        let window = ByteRange::Suffix { len: 100 }.resolve(1000).unwrap();
        assert_eq!((window.start, window.end), (900, 999));

        let window = ByteRange::Suffix { len: 5000 }.resolve(1000).unwrap();
        assert_eq!((window.start, window.end), (0, 999));

        assert!(ByteRange::Suffix { len: 0 }.resolve(1000).is_err());
    }

    #[test]
    fn test_start_beyond_eof_is_unsatisfiable() {
        for start in [1000, 1001, u64::MAX] {
            let result = ByteRange::From { start }.resolve(1000);
            assert!(matches!(
                result,
                Err(MediaError::RangeNotSatisfiable { size: 1000 })
            ));
        }
        assert!(ByteRange::Closed { start: 0, end: 0 }.resolve(0).is_err());
    }

    #[test]
    fn test_plan() {
        assert!(matches!(
            plan(MediaAsset::missing(None), Some("bytes=0-1")),
            Err(MediaError::NotFound)
        ));

        let full = plan(asset(1000), None).unwrap();
        assert!(matches!(full, ServePlan::Full { .. }));
        assert_eq!(full.window(), RangeWindow { start: 0, end: 999, total: 1000 });

        // A malformed header is ignored
        let full = plan(asset(1000), Some("bytes=nope")).unwrap();
        assert!(matches!(full, ServePlan::Full { .. }));

        let partial = plan(asset(1000), Some("bytes=10-19")).unwrap();
        assert_eq!(partial.window().len(), 10);

        assert!(matches!(
            plan(asset(1000), Some("bytes=1000-")),
            Err(MediaError::RangeNotSatisfiable { size: 1000 })
        ));
    }
}
