//! Configuration settings for dsutil
//!
//! Defines the CLI arguments, defaults and the runtime configuration
//! for the incrementer and the GPU occupier.

use crate::gpu::MatrixSpec;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Offset added to test-set names when none is given
pub const DEFAULT_OFFSET: i64 = 55680;

/// Seed used for the occupier's host-side matrix
pub const DEFAULT_SEED: u64 = 5;

/// Side length of the default occupier matrix
pub const DEFAULT_MATRIX_DIM: usize = 40_000;

/// dsutil - dataset merge and GPU memory reservation utilities
#[derive(Parser, Debug, Clone)]
#[command(name = "dsutil")]
#[command(author = "dsutil developers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Merge numbered image sets and reserve GPU memory")]
#[command(long_about = r#"
dsutil bundles two small dataset utilities.

  increment   Copy every image of a test set into a merged directory,
              adding a fixed offset to its numeric file name so it does
              not collide with the training set.
  occupy-gpu  Allocate a large f32 matrix on a GPU and hold it.
  devices     List visible GPU devices and their memory.

Examples:
  dsutil increment --Test_DIR ./test --Together_DIR ./together
  dsutil increment --Train_DIR ./train --offset-from-train --verify
  dsutil occupy-gpu --device 1 --hold 2h
"#)]
pub struct CliArgs {
    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Hide progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Output format for reports
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub output_format: OutputFormat,

    /// Log file path (JSON lines)
    #[arg(long, value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Copy test-set images into the merged set with offset names
    #[command(name = "increment")]
    Increment(IncrementArgs),

    /// Allocate and hold a random f32 matrix on a GPU
    #[command(name = "occupy-gpu")]
    OccupyGpu(OccupyArgs),

    /// List GPU devices
    #[command(name = "devices")]
    Devices {
        /// Describe a simulated device of this capacity instead (e.g. 8G)
        #[arg(long, value_name = "SIZE")]
        simulate: Option<String>,
    },
}

/// Arguments of the `increment` subcommand
#[derive(Args, Debug, Clone)]
pub struct IncrementArgs {
    /// Path to the training set directory
    #[arg(long = "Train_DIR", visible_alias = "train-dir", default_value = "./train", value_name = "DIR")]
    pub train_dir: PathBuf,

    /// Path to the test set directory (files to rename)
    #[arg(long = "Test_DIR", visible_alias = "test-dir", default_value = "./test", value_name = "DIR")]
    pub test_dir: PathBuf,

    /// Path to the merged output directory
    #[arg(long = "Together_DIR", visible_alias = "together-dir", default_value = "./together", value_name = "DIR")]
    pub together_dir: PathBuf,

    /// Number added to every numeric file name
    #[arg(long, default_value_t = DEFAULT_OFFSET, allow_hyphen_values = true, value_name = "N")]
    pub offset: i64,

    /// Derive the offset from the highest number in the training set
    #[arg(long, conflicts_with = "offset")]
    pub offset_from_train: bool,

    /// How output files are produced
    #[arg(long, value_enum, default_value = "copy")]
    pub mode: TransferMode,

    /// Decode every output and compare its pixels with the input
    #[arg(long)]
    pub verify: bool,

    /// Refuse to overwrite existing files in the output directory
    #[arg(long)]
    pub no_clobber: bool,

    /// Include hidden files
    #[arg(long)]
    pub include_hidden: bool,

    /// File pattern to include (glob)
    #[arg(long, value_name = "PATTERN")]
    pub include: Vec<String>,

    /// File pattern to exclude (glob)
    #[arg(long, value_name = "PATTERN")]
    pub exclude: Vec<String>,

    /// Show what would be renamed without writing
    #[arg(short = 'n', long)]
    pub dry_run: bool,
}

/// Arguments of the `occupy-gpu` subcommand
#[derive(Args, Debug, Clone)]
pub struct OccupyArgs {
    /// Device ordinal
    #[arg(short, long, default_value = "0", value_name = "N")]
    pub device: usize,

    /// Matrix rows
    #[arg(long, default_value_t = DEFAULT_MATRIX_DIM, value_name = "N")]
    pub rows: usize,

    /// Matrix columns
    #[arg(long, default_value_t = DEFAULT_MATRIX_DIM, value_name = "N")]
    pub cols: usize,

    /// Seed for the host-side random values
    #[arg(long, default_value_t = DEFAULT_SEED, value_name = "N")]
    pub seed: u64,

    /// Host staging chunk size (e.g. 64M)
    #[arg(long, default_value = "64M", value_name = "SIZE")]
    pub chunk: String,

    /// Keep the allocation for this long (e.g. 90s, 2h); release on exit if omitted
    #[arg(long, value_name = "DURATION")]
    pub hold: Option<humantime::Duration>,

    /// Simulate a device of this capacity instead of CUDA (e.g. 8G); the whole matrix is then held in host memory
    #[arg(long, value_name = "SIZE")]
    pub simulate: Option<String>,

    /// Skip the free-memory check before allocating
    #[arg(long)]
    pub no_check: bool,
}

/// How the incrementer produces output files
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    /// Validate that the input decodes, then copy its bytes unchanged
    #[default]
    Copy,
    /// Decode and re-encode in the format implied by the extension
    Reencode,
}

impl TransferMode {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Reencode => "re-encode",
        }
    }
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Runtime configuration of the incrementer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncrementConfig {
    /// Training set directory (only read with `offset_from_train`)
    pub train_dir: PathBuf,
    /// Source directory
    pub test_dir: PathBuf,
    /// Target directory
    pub together_dir: PathBuf,
    /// Offset added to each numeric basename
    pub offset: i64,
    /// Replace `offset` with highest training number + 1
    pub offset_from_train: bool,
    /// Output production mode
    pub mode: TransferMode,
    /// Verify pixels after writing
    pub verify: bool,
    /// Refuse to overwrite targets
    pub no_clobber: bool,
    /// Include hidden files
    pub include_hidden: bool,
    /// Include patterns
    pub include_patterns: Vec<String>,
    /// Exclude patterns
    pub exclude_patterns: Vec<String>,
    /// Dry run mode
    pub dry_run: bool,
}

impl Default for IncrementConfig {
    fn default() -> Self {
        Self {
            train_dir: PathBuf::from("./train"),
            test_dir: PathBuf::from("./test"),
            together_dir: PathBuf::from("./together"),
            offset: DEFAULT_OFFSET,
            offset_from_train: false,
            mode: TransferMode::Copy,
            verify: false,
            no_clobber: false,
            include_hidden: false,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            dry_run: false,
        }
    }
}

impl IncrementConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &IncrementArgs) -> Self {
        Self {
            train_dir: args.train_dir.clone(),
            test_dir: args.test_dir.clone(),
            together_dir: args.together_dir.clone(),
            offset: args.offset,
            offset_from_train: args.offset_from_train,
            mode: args.mode,
            verify: args.verify,
            no_clobber: args.no_clobber,
            include_hidden: args.include_hidden,
            include_patterns: args.include.clone(),
            exclude_patterns: args.exclude.clone(),
            dry_run: args.dry_run,
        }
    }
}

/// Runtime configuration of the GPU occupier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupyConfig {
    /// Device ordinal
    pub device: usize,
    /// Matrix shape
    pub matrix: MatrixSpec,
    /// Seed for host-side values
    pub seed: u64,
    /// Elements staged and uploaded per chunk
    pub chunk_elements: usize,
    /// How long to keep the allocation
    pub hold: Option<Duration>,
    /// Capacity of a simulated device, if any
    pub simulate: Option<u64>,
    /// Compare free device memory with the buffer size before allocating
    pub check_free_memory: bool,
}

impl Default for OccupyConfig {
    fn default() -> Self {
        Self {
            device: 0,
            matrix: MatrixSpec::default(),
            seed: DEFAULT_SEED,
            chunk_elements: 16 * 1024 * 1024, // 64MB of f32
            hold: None,
            simulate: None,
            check_free_memory: true,
        }
    }
}

impl OccupyConfig {
    /// Create config from CLI arguments
    pub fn from_cli(args: &OccupyArgs) -> Result<Self, String> {
        let chunk_bytes = parse_size(&args.chunk).map_err(|e| format!("Invalid chunk size: {}", e))?;
        let chunk_elements = (chunk_bytes as usize) / std::mem::size_of::<f32>();
        if chunk_elements == 0 {
            return Err(format!("Chunk size '{}' holds no f32 values", args.chunk));
        }
        if args.rows == 0 || args.cols == 0 {
            return Err("Matrix dimensions must be non-zero".to_string());
        }

        let simulate = args
            .simulate
            .as_ref()
            .map(|s| parse_size(s))
            .transpose()
            .map_err(|e| format!("Invalid simulated capacity: {}", e))?;

        Ok(Self {
            device: args.device,
            matrix: MatrixSpec::new(args.rows, args.cols),
            seed: args.seed,
            chunk_elements,
            hold: args.hold.as_ref().map(|d| **d),
            simulate,
            check_free_memory: !args.no_check,
        })
    }
}

/// Parse human-readable size string to bytes
pub fn parse_size(size: &str) -> Result<u64, String> {
    let size = size.trim().to_uppercase();

    if size.is_empty() {
        return Err("Empty size string".to_string());
    }

    let (num_str, multiplier) = if size.ends_with("TB") || size.ends_with('T') {
        (size.trim_end_matches(['T', 'B']), 1024u64 * 1024 * 1024 * 1024)
    } else if size.ends_with("GB") || size.ends_with('G') {
        (size.trim_end_matches(['G', 'B']), 1024u64 * 1024 * 1024)
    } else if size.ends_with("MB") || size.ends_with('M') {
        (size.trim_end_matches(['M', 'B']), 1024u64 * 1024)
    } else if size.ends_with("KB") || size.ends_with('K') {
        (size.trim_end_matches(['K', 'B']), 1024u64)
    } else if size.ends_with('B') {
        (size.trim_end_matches('B'), 1u64)
    } else {
        (size.as_str(), 1u64)
    };

    let num: f64 = num_str
        .trim()
        .parse()
        .map_err(|_| format!("Invalid number: {}", num_str))?;

    if num < 0.0 {
        return Err(format!("Negative size: {}", num_str));
    }

    Ok((num * multiplier as f64) as u64)
}
