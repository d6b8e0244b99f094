//! Progress reporting module
//!
//! Provides progress visualization for file renaming and device uploads.

mod reporter;

pub use reporter::*;
