//! Configuration module for dsutil
//!
//! Provides CLI arguments and runtime settings for both tools.

mod settings;

pub use settings::*;
