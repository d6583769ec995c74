//! # Photosync Core
//!
//! Keeps a photo catalog synchronized with a directory tree that something
//! else mutates: uploads, operators, sync clients.
//!
//! ## Overview
//!
//! - **Identity**: files are keyed by a SHA-256 content hash, so renames of
//!   unchanged bytes keep their catalog row
//! - **Validation**: a file is admitted only once it fully decodes
//! - **Derived assets**: downscaled JPEG renditions keyed by identity
//! - **Reconciliation**: one per-path decision shared by full sweeps and
//!   live watch batches
//!
//! ## Feature Flags
//!
//! - `postgres` (default): the [`catalog::PostgresCatalog`] backend
//!
//! ## Architecture
//!
//! - [`scan`]: tree walks and live change notifications
//! - [`fingerprint`], [`metadata`], [`thumbnails`]: per-file work
//! - [`catalog`], [`assets`]: persistence boundaries
//! - [`sync`]: the reconciliation engine, its coordinator and health state

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]

/// Derived-asset stores (cacache on disk, in-memory for tests)
pub mod assets;

/// Catalog repository port and backends
pub mod catalog;

/// Error types and error handling utilities
pub mod error;

/// Content hashing and stat helpers
pub mod fingerprint;

/// Image decoding and EXIF capture metadata
pub mod metadata;

/// Relative keys, categories and display titles derived from paths
pub mod naming;

/// Tree scanning and filesystem watching
pub mod scan;

/// Reconciliation engine, coordinator and health tracking
pub mod sync;

/// Thumbnail rendering
pub mod thumbnails;

pub use error::{Result, SyncError, SyncErrorKind};
pub use photosync_model as model;
