//! GPU memory occupier.
//!
//! Stages a seeded standard-normal `f32` matrix on the host one chunk at a
//! time and uploads it into a single device buffer, which stays allocated
//! for as long as the returned [`Reservation`] lives.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, trace};

use crate::config::{OccupyConfig, DEFAULT_MATRIX_DIM};
use crate::error::{DsUtilError, Result};
use crate::gpu::device::{DeviceBuffer, DeviceInfo, GpuBackend};
use crate::progress::ProgressReporter;

/// Elements generated from one RNG stream.
///
/// Block `i` always covers elements `[i * FILL_BLOCK, (i + 1) * FILL_BLOCK)`,
/// so the matrix content depends only on the seed.
pub const FILL_BLOCK: usize = 1 << 16;

/// Shape of the matrix to place on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixSpec {
    /// Row count.
    pub rows: usize,
    /// Column count.
    pub cols: usize,
}

impl MatrixSpec {
    /// Create a matrix shape.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Number of `f32` elements.
    pub fn elements(&self) -> Result<usize> {
        self.rows
            .checked_mul(self.cols)
            .ok_or_else(|| DsUtilError::config(format!("{}x{} matrix is too large", self.rows, self.cols)))
    }

    /// Size in bytes of the `f32` matrix.
    pub fn byte_size(&self) -> Result<u64> {
        let elements = self.elements()?;
        elements
            .checked_mul(std::mem::size_of::<f32>())
            .map(|b| b as u64)
            .ok_or_else(|| DsUtilError::config(format!("{}x{} matrix is too large", self.rows, self.cols)))
    }
}

impl Default for MatrixSpec {
    fn default() -> Self {
        Self::new(DEFAULT_MATRIX_DIM, DEFAULT_MATRIX_DIM)
    }
}

/// Fill `out` with standard-normal values for global elements starting at `first`.
///
/// `first` must be a multiple of [`FILL_BLOCK`].
pub fn fill_normal(out: &mut [f32], seed: u64, first: usize) {
    debug_assert_eq!(first % FILL_BLOCK, 0);
    let first_block = (first / FILL_BLOCK) as u64;

    out.par_chunks_mut(FILL_BLOCK)
        .enumerate()
        .for_each(|(i, block)| {
            let mut rng = StdRng::seed_from_u64(block_seed(seed, first_block + i as u64));
            for value in block.iter_mut() {
                *value = rng.sample(StandardNormal);
            }
        });
}

fn block_seed(seed: u64, block: u64) -> u64 {
    seed ^ block.wrapping_mul(0x9E37_79B9_7F4A_7C15)
}

/// Allocates and fills the device buffer.
pub struct Occupier<B: GpuBackend> {
    backend: B,
    config: OccupyConfig,
    progress: Option<ProgressReporter>,
}

impl<B: GpuBackend> Occupier<B> {
    /// Create an occupier for `backend`.
    pub fn new(backend: B, config: OccupyConfig) -> Self {
        Self {
            backend,
            config,
            progress: None,
        }
    }

    /// Set progress reporter.
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Upload chunk size, rounded up to whole fill blocks.
    fn chunk_elements(&self) -> usize {
        let blocks = self.config.chunk_elements.div_ceil(FILL_BLOCK).max(1);
        blocks * FILL_BLOCK
    }

    /// Allocate the buffer, fill it and return the live reservation.
    pub fn occupy(&self) -> Result<Reservation<B::Buffer>> {
        let start_time = Instant::now();
        let elements = self.config.matrix.elements()?;
        let required = self.config.matrix.byte_size()?;

        let device = self.backend.info()?;
        info!(
            device = device.ordinal,
            name = %device.name,
            free = device.free_bytes,
            required,
            "Occupying device memory"
        );

        if self.config.check_free_memory && device.free_bytes < required {
            return Err(DsUtilError::InsufficientDeviceMemory {
                ordinal: device.ordinal,
                required,
                available: device.free_bytes,
            });
        }

        if let Some(progress) = &self.progress {
            progress.set_status(&format!("Allocating {} on {}", humansize::format_size(required, humansize::BINARY), device.name));
        }
        let mut buffer = self.backend.alloc(elements)?;

        let chunk = self.chunk_elements().min(elements.max(1));
        let mut host = vec![0.0f32; chunk];

        if let Some(progress) = &self.progress {
            progress.set_total_items(elements.div_ceil(chunk) as u64);
            progress.set_total_bytes(required);
            progress.set_status("Uploading random matrix");
        }

        let mut offset = 0;
        while offset < elements {
            let len = chunk.min(elements - offset);
            let staged = &mut host[..len];
            fill_normal(staged, self.config.seed, offset);
            buffer.write(offset, staged)?;
            trace!(offset, len, "Uploaded chunk");

            if let Some(progress) = &self.progress {
                progress.increment_items(1);
                progress.increment_bytes((len * std::mem::size_of::<f32>()) as u64);
            }
            offset += len;
        }
        buffer.synchronize()?;

        let upload_duration = start_time.elapsed();
        if let Some(progress) = &self.progress {
            progress.finish_success(&format!("Holding {}", humansize::format_size(buffer.byte_size(), humansize::BINARY)));
        }
        info!(bytes = buffer.byte_size(), elapsed = ?upload_duration, "Device buffer ready");

        Ok(Reservation {
            buffer,
            device,
            matrix: self.config.matrix,
            seed: self.config.seed,
            upload_duration,
        })
    }
}

/// A filled device buffer; memory is released when this is dropped.
pub struct Reservation<D: DeviceBuffer> {
    buffer: D,
    device: DeviceInfo,
    matrix: MatrixSpec,
    seed: u64,
    upload_duration: Duration,
}

impl<D: DeviceBuffer> Reservation<D> {
    /// Size of the device buffer in bytes.
    pub fn byte_size(&self) -> u64 {
        self.buffer.byte_size()
    }

    /// The device buffer.
    pub fn buffer(&self) -> &D {
        &self.buffer
    }

    /// Device the buffer lives on, as seen before allocating.
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Block the calling thread for `duration` while keeping the buffer.
    pub fn hold(&self, duration: Duration) {
        info!(duration = %humantime::format_duration(duration), "Holding device memory");
        std::thread::sleep(duration);
    }

    /// Serializable summary.
    pub fn report(&self) -> OccupyReport {
        OccupyReport {
            device: self.device.clone(),
            matrix: self.matrix,
            seed: self.seed,
            bytes: self.byte_size(),
            upload_duration: self.upload_duration,
        }
    }
}

/// Summary of an occupier run.
#[derive(Debug, Clone, Serialize)]
pub struct OccupyReport {
    /// Device info before allocation.
    pub device: DeviceInfo,
    /// Matrix shape.
    pub matrix: MatrixSpec,
    /// Seed of the host values.
    pub seed: u64,
    /// Bytes held on the device.
    pub bytes: u64,
    /// Time to allocate, fill and upload.
    pub upload_duration: Duration,
}

impl OccupyReport {
    /// Print summary to console
    pub fn print_summary(&self) {
        println!("\n=== Device Reservation ===");
        println!("Device:          [{}] {}", self.device.ordinal, self.device.name);
        println!("Matrix:          {} x {} f32", self.matrix.rows, self.matrix.cols);
        println!("Bytes held:      {} ({})", self.bytes, humansize::format_size(self.bytes, humansize::BINARY));
        println!("Seed:            {}", self.seed);
        println!("Upload time:     {:.2?}", self.upload_duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::device::SimulatedBackend;

    fn small_config(rows: usize, cols: usize) -> OccupyConfig {
        OccupyConfig {
            matrix: MatrixSpec::new(rows, cols),
            chunk_elements: FILL_BLOCK,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_matrix_size() {
        let spec = MatrixSpec::default();
        assert_eq!(spec.elements().unwrap(), 1_600_000_000);
        assert_eq!(spec.byte_size().unwrap(), 40000 * 40000 * 4);
    }

    #[test]
    fn test_matrix_overflow() {
        assert!(MatrixSpec::new(usize::MAX, 2).elements().is_err());
    }

    #[test]
    fn test_occupy_simulated() {
        let backend = SimulatedBackend::new(0, 1 << 20);
        let occupier = Occupier::new(backend.clone(), small_config(100, 50));

        let reservation = occupier.occupy().unwrap();

        assert_eq!(reservation.byte_size(), 100 * 50 * 4);
        assert_eq!(backend.used_bytes(), 100 * 50 * 4);
        assert!(reservation.buffer().data().iter().any(|v| *v != 0.0));

        drop(reservation);
        assert_eq!(backend.used_bytes(), 0);
    }

    #[test]
    fn test_insufficient_memory_checked_before_alloc() {
        let backend = SimulatedBackend::new(2, 1000);
        let occupier = Occupier::new(backend.clone(), small_config(100, 100));

        let err = occupier.occupy().err().unwrap();

        assert!(matches!(
            err,
            DsUtilError::InsufficientDeviceMemory { ordinal: 2, required: 40_000, available: 1000 }
        ));
        assert_eq!(backend.used_bytes(), 0);
    }

    #[test]
    fn test_allocation_failure_without_check() {
        let backend = SimulatedBackend::new(0, 1000);
        let config = OccupyConfig {
            check_free_memory: false,
            ..small_config(100, 100)
        };

        let err = Occupier::new(backend, config).occupy().err().unwrap();
        assert!(matches!(err, DsUtilError::DeviceError { .. }));
    }

    #[test]
    fn test_content_independent_of_chunking() {
        let rows = 3;
        let cols = FILL_BLOCK + 17;

        let one = Occupier::new(SimulatedBackend::new(0, 1 << 24), small_config(rows, cols))
            .occupy()
            .unwrap();
        let config = OccupyConfig {
            chunk_elements: 4 * FILL_BLOCK,
            ..small_config(rows, cols)
        };
        let other = Occupier::new(SimulatedBackend::new(0, 1 << 24), config)
            .occupy()
            .unwrap();

        assert_eq!(one.buffer().data(), other.buffer().data());
    }

    #[test]
    fn test_seed_changes_content() {
        let a = Occupier::new(SimulatedBackend::new(0, 1 << 20), small_config(10, 10))
            .occupy()
            .unwrap();
        let config = OccupyConfig {
            seed: 6,
            ..small_config(10, 10)
        };
        let b = Occupier::new(SimulatedBackend::new(0, 1 << 20), config)
            .occupy()
            .unwrap();

        assert_ne!(a.buffer().data(), b.buffer().data());
    }

    #[test]
    fn test_values_look_standard_normal() {
        let mut values = vec![0.0f32; 4 * FILL_BLOCK];
        fill_normal(&mut values, 5, 0);

        let n = values.len() as f64;
        let mean = values.iter().map(|v| *v as f64).sum::<f64>() / n;
        let var = values.iter().map(|v| (*v as f64 - mean).powi(2)).sum::<f64>() / n;

        assert!(mean.abs() < 0.02, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "variance {var}");
    }

    #[test]
    fn test_hold_keeps_buffer_allocated() {
        let backend = SimulatedBackend::new(0, 1 << 20);
        let reservation = Occupier::new(backend.clone(), small_config(8, 8)).occupy().unwrap();

        let start = Instant::now();
        reservation.hold(Duration::from_millis(20));

        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(backend.used_bytes(), 256);
        drop(reservation);
        assert_eq!(backend.used_bytes(), 0);
    }

    #[test]
    fn test_report() {
        let reservation = Occupier::new(SimulatedBackend::new(0, 1 << 20), small_config(4, 4))
            .occupy()
            .unwrap();
        let report = reservation.report();

        assert_eq!(report.bytes, 64);
        assert_eq!(report.seed, 5);
        assert_eq!(report.device.name, "Simulated device");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["matrix"]["rows"], 4);
    }
}
