use std::fmt;
use std::str::FromStr;

/// Derived thumbnail variants, bounded by their long edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ThumbnailSize {
    Small,
    Medium,
    Large,
}

impl ThumbnailSize {
    pub const ALL: [ThumbnailSize; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Maximum long-edge length in pixels.
    pub const fn max_edge(self) -> u32 {
        match self {
            ThumbnailSize::Small => 320,
            ThumbnailSize::Medium => 800,
            ThumbnailSize::Large => 1600,
        }
    }

    /// Stable key segment used by the derived-asset store.
    pub const fn as_str(self) -> &'static str {
        match self {
            ThumbnailSize::Small => "small",
            ThumbnailSize::Medium => "medium",
            ThumbnailSize::Large => "large",
        }
    }
}

impl fmt::Display for ThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownThumbnailSize(pub String);

impl fmt::Display for UnknownThumbnailSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "unknown thumbnail size '{}' (expected small, medium or large)",
            self.0
        )
    }
}

impl std::error::Error for UnknownThumbnailSize {}

impl FromStr for ThumbnailSize {
    type Err = UnknownThumbnailSize;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(ThumbnailSize::Small),
            "medium" => Ok(ThumbnailSize::Medium),
            "large" => Ok(ThumbnailSize::Large),
            _ => Err(UnknownThumbnailSize(s.to_string())),
        }
    }
}
