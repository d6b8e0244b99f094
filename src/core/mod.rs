//! Core engine module
//!
//! Provides the test-set merge orchestration: planning every rename up
//! front, then transferring and verifying images in order.

mod incrementer;

pub use incrementer::*;
