//! Media contact updater library.
//!
//! Keeps a CSV contact list of journalists current: each row is searched on
//! the web, an LLM extracts contact fields from the results, and the row is
//! either updated in place or flagged for manual review. Also holds the data
//! side of the journalist directory.
//!
//! # Modules
//!
//! - `api`: HTTP layer.
//! - `core`: Domain logic, models and errors.
//! - `integrations`: External collaborators and file storage.
//! - `analytics`: Dashboard views over the working table.
//! - `batch`: Batch runner.
//! - `config`: Configuration management.
//! - `directory`: Journalist directory dataset.
//! - `enrichment`: Query building, reconciliation and row history.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP request handlers.
//! - `models`: Core data models.
//! - `services`: Search and extraction clients.
//! - `table`: In-memory working table.
//! - `table_storage`: CSV load/save and backups.

pub mod api;
pub mod core;
pub mod integrations;

// Re-export primary modules for shared use in tests and the binary
pub mod analytics;
pub mod batch;
pub mod config;
pub mod directory;
pub mod enrichment;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod services;
pub mod table;
pub mod table_storage;
