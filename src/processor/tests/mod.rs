//! Pipeline tests for the processor module
//!
//! Runs the complete ingestion pipeline over synthetic run directories.

pub mod reconciliation;
