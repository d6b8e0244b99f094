//! GPU device access and memory reservation.
//!
//! - [`device`]: backends, device buffers and device listing
//! - [`occupier`]: fills and holds a large matrix on a device

pub mod device;
pub mod occupier;

pub use device::{list_devices, DeviceBuffer, DeviceInfo, GpuBackend, SimulatedBackend, SimulatedBuffer};
#[cfg(feature = "cuda")]
pub use device::{CudaBackend, CudaBuffer};
pub use occupier::{fill_normal, MatrixSpec, OccupyReport, Occupier, Reservation, FILL_BLOCK};
