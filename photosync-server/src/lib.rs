//! # Photosync Server
//!
//! Runs the sync engine against one photo tree and exposes its health over
//! HTTP. The binary is `photosync`; this library half exists so the router
//! and wiring can be exercised from integration tests.

pub mod http;
pub mod shutdown;
pub mod startup;
pub mod telemetry;
