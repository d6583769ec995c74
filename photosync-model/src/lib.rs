//! Core data model definitions shared across photosync crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod events;
pub mod identity;
pub mod metadata;
pub mod record;
pub mod sizes;
pub mod stats;

pub use events::{ChangeEvent, ObservedFile, StatTuple};
pub use identity::{IdentityParseError, PhotoIdentity};
pub use metadata::{CaptureMetadata, GpsCoordinates, PhotoMetadata};
pub use record::{PhotoRecord, PhotoStatus, UnknownStatus};
pub use sizes::{ThumbnailSize, UnknownThumbnailSize};
pub use stats::SyncStats;
