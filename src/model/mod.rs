//! Core data model: message records, sender addresses, output files, and reports.

pub mod address;
pub mod message;
pub mod report;
