//! File system module
//!
//! Flat set-directory scanning, numeric name arithmetic and image I/O
//! for the incrementer.

pub mod image_io;
pub mod naming;
mod scanner;

pub use image_io::{read_image, verify_pixels, write_image};
pub use naming::{increment_name, split_name};
pub use scanner::*;
