//! `mbox2eml`: split MBOX archives into standalone `.eml` files.
//!
//! This crate provides the core library: a streaming MBOX extractor,
//! filesystem-safe file naming, `.eml` serialization, and a partitioner that
//! packs the written files into import batches bounded by count and size.

pub mod config;
pub mod convert;
pub mod error;
pub mod export;
pub mod i18n;
pub mod model;
pub mod parser;

pub use convert::{batch_existing, convert, ConvertOptions, ProgressEvent};
pub use error::{ConvertError, Result};
