use std::collections::BTreeSet;
use std::path::Path;

/// Extensions admitted when none are configured.
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif"];

/// Suffixes left behind by uploads and downloads still in flight.
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".tmp", ".crdownload"];

/// Decides which relative paths under the watched root are photo candidates.
///
/// Every check works on the forward-slash relative key so the root itself
/// (which may well live under a hidden directory) never influences the
/// outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    extensions: BTreeSet<String>,
}

impl Default for FileFilter {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED_EXTENSIONS.iter().copied())
    }
}

impl FileFilter {
    /// Build a filter from extensions with or without a leading dot, in any
    /// case.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { extensions }
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.extensions.iter().map(String::as_str)
    }

    /// Whether a regular file at `relative_path` should be cataloged.
    pub fn is_candidate(&self, relative_path: &str) -> bool {
        if !self.is_visible(relative_path) {
            return false;
        }
        extension_of(relative_path).is_some_and(|ext| self.supports(ext))
    }

    /// Looser check for watch events, where the path may name a directory
    /// that can no longer be inspected. Paths without any extension pass.
    pub fn may_be_relevant(&self, relative_path: &str) -> bool {
        if !self.is_visible(relative_path) {
            return false;
        }
        match extension_of(relative_path) {
            Some(ext) => self.supports(ext),
            None => true,
        }
    }

    pub fn supports_path(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.supports(ext))
    }

    fn supports(&self, ext: &str) -> bool {
        self.extensions.contains(&ext.to_ascii_lowercase())
    }

    fn is_visible(&self, relative_path: &str) -> bool {
        let mut segments = relative_path.split('/').peekable();
        while let Some(segment) = segments.next() {
            if segment.is_empty() || is_hidden_name(segment) {
                return false;
            }
            if segments.peek().is_none() && is_partial_name(segment) {
                return false;
            }
        }
        true
    }
}

pub(crate) fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

fn is_partial_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PARTIAL_SUFFIXES.iter().any(|suffix| lower.ends_with(suffix))
}

fn extension_of(relative_path: &str) -> Option<&str> {
    let name = relative_path.rsplit('/').next()?;
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_supported_extensions_case_insensitively() {
        let filter = FileFilter::default();
        assert!(filter.is_candidate("Travel/beach.JPG"));
        assert!(filter.is_candidate("Travel/2023/scan.tiff"));
        assert!(!filter.is_candidate("Travel/clip.mp4"));
        assert!(!filter.is_candidate("Travel/README"));
    }

    #[test]
    fn rejects_hidden_and_partial_files() {
        let filter = FileFilter::default();
        assert!(!filter.is_candidate("Travel/.beach.jpg"));
        assert!(!filter.is_candidate(".thumbs/Travel/beach.jpg"));
        assert!(!filter.is_candidate("Travel/beach.jpg.part"));
        assert!(!filter.is_candidate("Travel/beach.jpg.crdownload"));
        assert!(!filter.is_candidate("Travel/upload.TMP"));
    }

    #[test]
    fn configured_extensions_are_normalized() {
        let filter = FileFilter::new([" .PNG", "heic", ""]);
        assert!(filter.is_candidate("A/x.png"));
        assert!(filter.is_candidate("A/x.HEIC"));
        assert!(!filter.is_candidate("A/x.jpg"));
        assert_eq!(filter.extensions().collect::<Vec<_>>(), vec!["heic", "png"]);
    }

    #[test]
    fn event_paths_without_extension_may_be_directories() {
        let filter = FileFilter::default();
        assert!(filter.may_be_relevant("Travel"));
        assert!(filter.may_be_relevant("Travel/2023"));
        assert!(!filter.may_be_relevant("Travel/notes.txt"));
        assert!(!filter.may_be_relevant(".cache"));
    }
}
