//! Session storage for analysis reports.
//!
//! This crate provides:
//! - The `SessionStore` trait the worker persists results through
//! - A local-filesystem implementation writing one directory per session

pub mod error;
pub mod session;

pub use error::{StorageError, StorageResult};
pub use session::{LocalSessionStore, SessionStore, SessionSummary, ANALYSIS_FILE};
