//! dsutil CLI - dataset merge and GPU memory reservation
//!
//! Renames a numbered test set into a merged directory, or holds a large
//! buffer on a GPU.

use clap::Parser;
use dsutil::config::{
    parse_size, CliArgs, Commands, IncrementArgs, IncrementConfig, OccupyArgs, OccupyConfig, OutputFormat,
};
use dsutil::core::Incrementer;
use dsutil::error::{DsUtilError, IoResultExt, Result};
use dsutil::gpu::{list_devices, GpuBackend, Occupier, SimulatedBackend};
use dsutil::progress::ProgressReporter;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    if let Err(e) = init_logging(&args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    let exit_code = exit_code(run(&args));
    std::process::exit(exit_code);
}

/// 0 on success, 1 on any error after printing it
fn exit_code(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn init_logging(args: &CliArgs) -> Result<()> {
    let default_level = match args.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if let Some(path) = &args.log_file {
        let file = std::fs::File::create(path).with_path(path)?;
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    Ok(())
}

fn run(args: &CliArgs) -> Result<()> {
    match &args.command {
        Commands::Increment(inc) => cmd_increment(args, inc),
        Commands::OccupyGpu(occ) => cmd_occupy(args, occ),
        Commands::Devices { simulate } => cmd_devices(args, simulate.as_deref()),
    }
}

fn progress_for(args: &CliArgs, unit: &str) -> ProgressReporter {
    if args.quiet {
        ProgressReporter::disabled()
    } else if args.no_progress || args.output_format == OutputFormat::Json {
        ProgressReporter::hidden(unit)
    } else {
        ProgressReporter::new(unit)
    }
}

fn cmd_increment(args: &CliArgs, inc: &IncrementArgs) -> Result<()> {
    let config = IncrementConfig::from_cli(inc);

    if args.verbose > 0 && args.output_format == OutputFormat::Text {
        print_increment_config(&config);
    }

    if config.dry_run && args.output_format == OutputFormat::Text && !args.quiet {
        println!("=== Dry Run Mode ===");
        println!("No files will be written.");
    }

    let engine = Incrementer::new(config).with_progress(progress_for(args, "images"));
    let result = engine.execute()?;

    match args.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text if !args.quiet => result.print_summary(),
        OutputFormat::Text => {}
    }

    Ok(())
}

fn cmd_occupy(args: &CliArgs, occ: &OccupyArgs) -> Result<()> {
    let config = OccupyConfig::from_cli(occ).map_err(DsUtilError::ConfigError)?;

    match config.simulate {
        Some(capacity) => occupy_with(args, SimulatedBackend::new(config.device, capacity), config),
        None => occupy_cuda(args, config),
    }
}

#[cfg(feature = "cuda")]
fn occupy_cuda(args: &CliArgs, config: OccupyConfig) -> Result<()> {
    let backend = dsutil::gpu::CudaBackend::new(config.device)?;
    occupy_with(args, backend, config)
}

#[cfg(not(feature = "cuda"))]
fn occupy_cuda(_args: &CliArgs, _config: OccupyConfig) -> Result<()> {
    Err(DsUtilError::UnsupportedOperation(
        "built without CUDA support; rebuild with `--features cuda` or pass --simulate".to_string(),
    ))
}

fn occupy_with<B: GpuBackend>(args: &CliArgs, backend: B, config: OccupyConfig) -> Result<()> {
    let hold = config.hold;
    let occupier = Occupier::new(backend, config).with_progress(progress_for(args, "chunks"));
    let reservation = occupier.occupy()?;

    let report = reservation.report();
    match args.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text if !args.quiet => report.print_summary(),
        OutputFormat::Text => {}
    }

    if let Some(duration) = hold {
        if !args.quiet && args.output_format == OutputFormat::Text {
            println!("Holding for {}...", humantime::format_duration(duration));
        }
        reservation.hold(duration);
    }

    Ok(())
}

fn cmd_devices(args: &CliArgs, simulate: Option<&str>) -> Result<()> {
    let devices = match simulate {
        Some(size) => {
            let capacity = parse_size(size).map_err(DsUtilError::ConfigError)?;
            vec![SimulatedBackend::new(0, capacity).info()?]
        }
        None => list_devices()?,
    };

    match args.output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&devices)?),
        OutputFormat::Text => {
            if devices.is_empty() {
                println!("No GPU devices found.");
            }
            for device in &devices {
                println!("{}", device.describe());
            }
        }
    }

    Ok(())
}

fn print_increment_config(config: &IncrementConfig) {
    println!("=== Configuration ===");
    println!("Train dir:    {:?}", config.train_dir);
    println!("Test dir:     {:?}", config.test_dir);
    println!("Together dir: {:?}", config.together_dir);
    if config.offset_from_train {
        println!("Offset:       highest training number + 1");
    } else {
        println!("Offset:       {}", config.offset);
    }
    println!("Mode:         {}", config.mode.name());
    println!("Verify:       {}", config.verify);
    println!("No clobber:   {}", config.no_clobber);
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn run_with(argv: &[&str]) -> Result<()> {
        let mut full = vec!["dsutil", "-q"];
        full.extend_from_slice(argv);
        run(&CliArgs::parse_from(full))
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(Ok(())), 0);
        assert_eq!(exit_code(Err(DsUtilError::NotFound("test".into()))), 1);
    }

    #[test]
    fn test_increment_missing_test_dir_fails() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        let together = dir.path().join("together");

        let result = run_with(&[
            "increment",
            "--Test_DIR",
            missing.to_str().unwrap(),
            "--Together_DIR",
            together.to_str().unwrap(),
        ]);

        assert!(matches!(result, Err(DsUtilError::NotFound(_))));
        assert_eq!(exit_code(result), 1);
        assert!(!together.exists());
    }

    #[test]
    fn test_increment_non_numeric_fails() {
        let dir = TempDir::new().unwrap();
        let test = dir.path().join("test");
        std::fs::create_dir(&test).unwrap();
        std::fs::write(test.join("frame_a.png"), b"x").unwrap();

        let result = run_with(&[
            "increment",
            "--test-dir",
            test.to_str().unwrap(),
            "--together-dir",
            dir.path().join("together").to_str().unwrap(),
        ]);

        assert_eq!(exit_code(result), 1);
    }

    #[test]
    fn test_occupy_insufficient_memory_fails() {
        let result = run_with(&["occupy-gpu", "--rows", "100", "--cols", "100", "--simulate", "1K"]);

        assert!(matches!(result, Err(DsUtilError::InsufficientDeviceMemory { .. })));
    }

    #[test]
    fn test_occupy_simulated_holds() {
        let start = Instant::now();

        let result = run_with(&[
            "occupy-gpu",
            "--rows",
            "64",
            "--cols",
            "64",
            "--simulate",
            "1M",
            "--hold",
            "50ms",
        ]);

        assert_eq!(exit_code(result), 0);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_occupy_without_cuda_is_unsupported() {
        let result = run_with(&["occupy-gpu", "--rows", "4", "--cols", "4"]);

        assert!(matches!(result, Err(DsUtilError::UnsupportedOperation(_))));
    }
}
