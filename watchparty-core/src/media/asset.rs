//! Media asset probing

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

/// MIME type used when the extension is unknown
pub const DEFAULT_CONTENT_TYPE: &str = "video/mp4";

/// Extension to MIME type table for the supported containers
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("ogg", "video/ogg"),
    ("avi", "video/x-msvideo"),
    ("mov", "video/quicktime"),
    ("mkv", "video/x-matroska"),
];

/// Classify a media file by its extension (case-insensitive)
pub fn content_type_for(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return DEFAULT_CONTENT_TYPE;
    };

    CONTENT_TYPES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(ext))
        .map(|(_, mime)| *mime)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
}

/// Snapshot of the media file at request time.
///
/// `size_bytes` and `mime_type` only carry meaning when `exists` is true.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaAsset {
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    pub mime_type: &'static str,
    pub exists: bool,
}

impl MediaAsset {
    /// An asset that is not available
    pub fn missing(path: Option<PathBuf>) -> Self {
        Self {
            path,
            size_bytes: 0,
            mime_type: DEFAULT_CONTENT_TYPE,
            exists: false,
        }
    }

    /// Stat the path and describe it. Never fails: anything that is not a
    /// readable regular file is reported as missing.
    pub async fn probe(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::missing(None);
        };

        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Self {
                path: Some(path.to_path_buf()),
                size_bytes: meta.len(),
                mime_type: content_type_for(path),
                exists: true,
            },
            Ok(_) => {
                debug!("Media path is not a regular file: {}", path.display());
                Self::missing(Some(path.to_path_buf()))
            }
            Err(e) => {
                debug!("Media path unavailable: {} ({})", path.display(), e);
                Self::missing(Some(path.to_path_buf()))
            }
        }
    }

    /// The `/video-info` view of this asset
    pub fn info(&self) -> VideoInfo {
        if self.exists {
            VideoInfo::Available {
                exists: true,
                size: self.size_bytes,
                content_type: self.mime_type,
            }
        } else {
            VideoInfo::Missing { exists: false }
        }
    }
}

/// JSON body returned by `/video-info`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum VideoInfo {
    #[serde(rename_all = "camelCase")]
    Available {
        exists: bool,
        size: u64,
        content_type: &'static str,
    },
    Missing {
        exists: bool,
    },
}
