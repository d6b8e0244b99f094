//! GPU devices and device buffers.
//!
//! [`GpuBackend`] hands out [`DeviceBuffer`]s of `f32`. With the `cuda`
//! feature, [`CudaBackend`] uses cudarc on a real device; the
//! [`SimulatedBackend`] keeps the buffer in host memory under a fixed
//! capacity so the occupier can run without a GPU.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{DsUtilError, Result};

/// Information about a single GPU device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device ordinal.
    pub ordinal: usize,

    /// Device name (e.g., "NVIDIA GeForce GTX 1070").
    pub name: String,

    /// Total memory in bytes.
    pub total_bytes: u64,

    /// Free memory in bytes (at query time).
    pub free_bytes: u64,
}

impl DeviceInfo {
    /// One-line description for listings.
    pub fn describe(&self) -> String {
        format!(
            "[{}] {}: {} free of {}",
            self.ordinal,
            self.name,
            humansize::format_size(self.free_bytes, humansize::BINARY),
            humansize::format_size(self.total_bytes, humansize::BINARY)
        )
    }
}

/// A device-resident `f32` buffer. Dropping it releases the memory.
pub trait DeviceBuffer {
    /// Number of `f32` elements.
    fn len(&self) -> usize;

    /// Copy `data` from the host into the buffer starting at element `offset`.
    fn write(&mut self, offset: usize, data: &[f32]) -> Result<()>;

    /// Wait until all queued copies have landed.
    fn synchronize(&self) -> Result<()> {
        Ok(())
    }

    /// Whether the buffer holds no elements.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size in bytes.
    fn byte_size(&self) -> u64 {
        (self.len() * std::mem::size_of::<f32>()) as u64
    }
}

/// Something that can allocate device buffers.
pub trait GpuBackend {
    /// Buffer type handed out by [`GpuBackend::alloc`].
    type Buffer: DeviceBuffer;

    /// Query name and memory of the device.
    fn info(&self) -> Result<DeviceInfo>;

    /// Allocate `elements` zeroed `f32` values on the device.
    fn alloc(&self, elements: usize) -> Result<Self::Buffer>;
}

fn check_range(ordinal: usize, len: usize, offset: usize, data: &[f32]) -> Result<()> {
    match offset.checked_add(data.len()) {
        Some(end) if end <= len => Ok(()),
        _ => Err(DsUtilError::device(
            ordinal,
            format!("write of {} elements at {} exceeds buffer of {}", data.len(), offset, len),
        )),
    }
}

/// Host-memory stand-in for a device with a fixed capacity.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    ordinal: usize,
    capacity: u64,
    used: Arc<AtomicU64>,
}

impl SimulatedBackend {
    /// Create a simulated device with `capacity` bytes.
    pub fn new(ordinal: usize, capacity: u64) -> Self {
        Self {
            ordinal,
            capacity,
            used: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Bytes currently held by live buffers.
    pub fn used_bytes(&self) -> u64 {
        self.used.load(Ordering::SeqCst)
    }
}

impl GpuBackend for SimulatedBackend {
    type Buffer = SimulatedBuffer;

    fn info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            ordinal: self.ordinal,
            name: "Simulated device".to_string(),
            total_bytes: self.capacity,
            free_bytes: self.capacity.saturating_sub(self.used_bytes()),
        })
    }

    fn alloc(&self, elements: usize) -> Result<SimulatedBuffer> {
        let bytes = elements
            .checked_mul(std::mem::size_of::<f32>())
            .ok_or_else(|| DsUtilError::device(self.ordinal, "allocation size overflows"))? as u64;

        let mut current = self.used.load(Ordering::SeqCst);
        loop {
            let next = current.saturating_add(bytes);
            if next > self.capacity {
                return Err(DsUtilError::device(
                    self.ordinal,
                    format!("out of memory allocating {} bytes", bytes),
                ));
            }
            match self.used.compare_exchange(current, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => break,
                Err(actual) => current = actual,
            }
        }

        debug!(device = self.ordinal, bytes, "Allocated simulated buffer");
        Ok(SimulatedBuffer {
            ordinal: self.ordinal,
            data: vec![0.0; elements],
            used: Arc::clone(&self.used),
        })
    }
}

/// Buffer of a [`SimulatedBackend`].
#[derive(Debug)]
pub struct SimulatedBuffer {
    ordinal: usize,
    data: Vec<f32>,
    used: Arc<AtomicU64>,
}

impl SimulatedBuffer {
    /// Contents of the buffer.
    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

impl DeviceBuffer for SimulatedBuffer {
    fn len(&self) -> usize {
        self.data.len()
    }

    fn write(&mut self, offset: usize, data: &[f32]) -> Result<()> {
        check_range(self.ordinal, self.data.len(), offset, data)?;
        self.data[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

impl Drop for SimulatedBuffer {
    fn drop(&mut self) {
        self.used.fetch_sub(self.byte_size(), Ordering::SeqCst);
    }
}

#[cfg(feature = "cuda")]
pub use cuda::{CudaBackend, CudaBuffer};

#[cfg(feature = "cuda")]
mod cuda {
    use std::sync::Arc;

    use cudarc::driver::{CudaContext, CudaSlice, CudaStream};

    use super::{check_range, DeviceBuffer, DeviceInfo, GpuBackend};
    use crate::error::{DsUtilError, Result};

    /// A CUDA device driven through cudarc.
    pub struct CudaBackend {
        ordinal: usize,
        ctx: Arc<CudaContext>,
        stream: Arc<CudaStream>,
    }

    impl CudaBackend {
        /// Open the device with the given ordinal.
        pub fn new(ordinal: usize) -> Result<Self> {
            let ctx = CudaContext::new(ordinal).map_err(|e| DsUtilError::device(ordinal, e.to_string()))?;
            let stream = ctx.default_stream();
            Ok(Self { ordinal, ctx, stream })
        }

        /// Number of visible CUDA devices.
        pub fn device_count() -> Result<usize> {
            CudaContext::device_count()
                .map(|n| n.max(0) as usize)
                .map_err(|e| DsUtilError::device(0, e.to_string()))
        }
    }

    impl GpuBackend for CudaBackend {
        type Buffer = CudaBuffer;

        fn info(&self) -> Result<DeviceInfo> {
            let err = |e: cudarc::driver::DriverError| DsUtilError::device(self.ordinal, e.to_string());

            let name = self.ctx.name().map_err(err)?;
            self.ctx.bind_to_thread().map_err(err)?;
            let (free, total) = cudarc::driver::result::mem_get_info().map_err(err)?;

            Ok(DeviceInfo {
                ordinal: self.ordinal,
                name,
                total_bytes: total as u64,
                free_bytes: free as u64,
            })
        }

        fn alloc(&self, elements: usize) -> Result<CudaBuffer> {
            let slice = self
                .stream
                .alloc_zeros::<f32>(elements)
                .map_err(|e| DsUtilError::device(self.ordinal, e.to_string()))?;

            Ok(CudaBuffer {
                ordinal: self.ordinal,
                stream: Arc::clone(&self.stream),
                slice,
            })
        }
    }

    /// Device memory owned by a [`CudaBackend`] allocation.
    pub struct CudaBuffer {
        ordinal: usize,
        stream: Arc<CudaStream>,
        slice: CudaSlice<f32>,
    }

    impl DeviceBuffer for CudaBuffer {
        fn len(&self) -> usize {
            self.slice.len()
        }

        fn write(&mut self, offset: usize, data: &[f32]) -> Result<()> {
            check_range(self.ordinal, self.slice.len(), offset, data)?;
            let mut view = self.slice.slice_mut(offset..offset + data.len());
            self.stream
                .memcpy_htod(data, &mut view)
                .map_err(|e| DsUtilError::device(self.ordinal, e.to_string()))
        }

        fn synchronize(&self) -> Result<()> {
            self.stream
                .synchronize()
                .map_err(|e| DsUtilError::device(self.ordinal, e.to_string()))
        }
    }
}

/// List visible devices.
///
/// With the `cuda` feature enabled, queries every CUDA device.
/// Without it, returns an empty list (CPU-only build).
pub fn list_devices() -> Result<Vec<DeviceInfo>> {
    #[cfg(feature = "cuda")]
    {
        let count = CudaBackend::device_count()?;
        info!(count, "Found CUDA devices");
        (0..count).map(|ordinal| CudaBackend::new(ordinal)?.info()).collect()
    }

    #[cfg(not(feature = "cuda"))]
    {
        info!("CUDA not enabled, no devices to list");
        Ok(Vec::new())
    }
}
