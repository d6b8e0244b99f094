//! # dsutil - Dataset Merge and GPU Memory Reservation
//!
//! Two small utilities used around training pipelines:
//!
//! - **Incrementer**: copies a numbered test set (`0.png`, `1.png`, ...) into
//!   a merged directory, adding a fixed offset to every file name so it
//!   does not collide with the training set.
//! - **Occupier**: allocates a large `f32` matrix on a GPU, fills it with
//!   seeded random values and holds it.
//!
//! ## Merging a test set
//!
//! ```no_run
//! use dsutil::config::IncrementConfig;
//! use dsutil::core::Incrementer;
//! use std::path::PathBuf;
//!
//! let config = IncrementConfig {
//!     test_dir: PathBuf::from("./test"),
//!     together_dir: PathBuf::from("./together"),
//!     offset: 55680,
//!     verify: true,
//!     ..Default::default()
//! };
//!
//! let result = Incrementer::new(config).execute().unwrap();
//! result.print_summary();
//! ```
//!
//! ## Occupying device memory
//!
//! ```no_run
//! use dsutil::config::OccupyConfig;
//! use dsutil::gpu::{MatrixSpec, Occupier, SimulatedBackend};
//!
//! let config = OccupyConfig {
//!     matrix: MatrixSpec::new(1024, 1024),
//!     ..Default::default()
//! };
//!
//! let backend = SimulatedBackend::new(0, 8 * 1024 * 1024);
//! let reservation = Occupier::new(backend, config).occupy().unwrap();
//! assert_eq!(reservation.byte_size(), 1024 * 1024 * 4);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod error;
pub mod fs;
pub mod gpu;
pub mod progress;

// Re-export commonly used types
pub use config::{IncrementConfig, OccupyConfig, TransferMode};
pub use core::{IncrementResult, Incrementer};
pub use error::{DsUtilError, Result};
pub use gpu::{MatrixSpec, Occupier};
pub use progress::ProgressReporter;

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use dsutil::prelude::*;
    //! ```

    pub use crate::config::{IncrementConfig, OccupyConfig, TransferMode};
    pub use crate::core::{increment_directory, IncrementResult, Incrementer, RenamePlan};
    pub use crate::error::{DsUtilError, Result};
    pub use crate::fs::{increment_name, ImageRecord, ScanConfig, Scanner};
    pub use crate::gpu::{DeviceBuffer, GpuBackend, MatrixSpec, Occupier, Reservation, SimulatedBackend};
    pub use crate::progress::ProgressReporter;
}
