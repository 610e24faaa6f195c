use std::path::Path;

use crate::types::Track;

/// Resolves local paths and direct media URLs into tracks
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSource;

impl FileSource {
    /// Build a file track for `url`
    ///
    /// Returns `None` for empty input.
    #[must_use]
    pub fn resolve(&self, url: &str) -> Option<Track> {
        let url = url.trim();
        if url.is_empty() {
            return None;
        }

        let title = Path::new(url)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(url)
            .to_string();

        Some(Track::file(url).with_metadata(title, None, Vec::new()))
    }
}
