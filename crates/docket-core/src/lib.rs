//! # docket-core
//!
//! Core types, traits, and defaults for docket.
//!
//! This crate provides the data model (document records, jobs, search
//! requests and results), the shared error type, and the trait seams that
//! the cache, job, search, and store crates are built around.

pub mod defaults;
pub mod error;
pub mod models;
pub mod search;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use models::*;
pub use search::*;
pub use traits::*;
