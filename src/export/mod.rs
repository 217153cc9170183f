//! Output side: file naming, `.eml` serialization, batching, and manifests.

pub mod batch;
pub mod eml;
pub mod manifest;
pub mod naming;
pub mod verify;
