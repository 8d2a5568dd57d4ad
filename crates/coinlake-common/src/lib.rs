//! Coinlake Common Library
//!
//! Shared types, utilities, and error handling for the coinlake workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`LakeError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber bootstrap driven by `LOG_*` variables
//! - **Types**: logical datasets and the object key convention of the lake
//!
//! # Example
//!
//! ```no_run
//! use chrono::Local;
//! use coinlake_common::types::{Dataset, ObjectKey};
//!
//! let key = ObjectKey::new("crypto", Dataset::Global, None, Local::now())?;
//! println!("{}", key);
//! # Ok::<(), coinlake_common::LakeError>(())
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{LakeError, Result};
