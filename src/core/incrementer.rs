//! Test-set merge engine
//!
//! Scans the test set, plans one target name per image (number + offset,
//! same extension), then reads, writes and optionally verifies each
//! image in numeric order.

use crate::config::{IncrementConfig, TransferMode};
use crate::error::{DsUtilError, IoResultExt, Result};
use crate::fs::{read_image, verify_pixels, write_image, ImageRecord, ScanConfig, Scanner};
use crate::fs::naming::{increment_name, shift_number};
use crate::progress::ProgressReporter;
use console::style;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One planned rename
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenamePlan {
    /// Input file
    pub source: PathBuf,
    /// Output file
    pub target: PathBuf,
    /// Number parsed from the input name
    pub number: i64,
    /// Number used for the output name
    pub new_number: i64,
    /// Input size in bytes
    pub size: u64,
}

/// All renames of one run, computed before anything is written
#[derive(Debug, Clone, Serialize)]
pub struct IncrementPlan {
    /// Offset that will be applied
    pub offset: i64,
    /// Renames in processing order
    pub renames: Vec<RenamePlan>,
    /// Subdirectories of the source that were ignored
    pub dirs_skipped: usize,
    /// Combined size of the planned inputs
    pub total_size: u64,
}

/// Outcome of an incrementer run
#[derive(Debug, Clone, Serialize)]
pub struct IncrementResult {
    /// Offset that was applied
    pub offset: i64,
    /// How outputs were produced
    pub mode: TransferMode,
    /// Files written
    pub files_renamed: u64,
    /// Combined size of the inputs
    pub bytes_planned: u64,
    /// Bytes written
    pub bytes_written: u64,
    /// Outputs whose pixels were checked
    pub verified: u64,
    /// Subdirectories of the source that were ignored
    pub dirs_skipped: usize,
    /// Existing targets that were overwritten
    pub overwritten: u64,
    /// Every planned rename, in processing order
    pub planned: Vec<RenamePlan>,
    /// Whether nothing was written
    pub dry_run: bool,
    /// Total duration
    pub duration: Duration,
}

impl IncrementResult {
    /// Print summary to console
    pub fn print_summary(&self) {
        if self.dry_run {
            println!("\n=== Planned Renames (dry run) ===");
            for plan in &self.planned {
                println!("  {} -> {}", plan.source.display(), plan.target.display());
            }
        }

        println!("\n=== Increment Summary ===");
        println!("Offset:          {}", self.offset);
        println!("Mode:            {}", self.mode.name());
        println!("Files planned:   {}", self.planned.len());
        println!("Files written:   {}", self.files_renamed);
        println!("Input size:      {}", humansize::format_size(self.bytes_planned, humansize::BINARY));
        println!("Bytes written:   {}", humansize::format_size(self.bytes_written, humansize::BINARY));
        if self.verified > 0 {
            println!("Verified:        {}", self.verified);
        }
        if self.overwritten > 0 {
            println!("Overwritten:     {}", self.overwritten);
        }
        if self.dirs_skipped > 0 {
            println!("Dirs skipped:    {}", self.dirs_skipped);
        }
        println!("Duration:        {:.2?}", self.duration);
    }
}

/// Merges a numbered test set into a target directory
pub struct Incrementer {
    /// Configuration
    config: IncrementConfig,
    /// Progress reporter
    progress: Option<ProgressReporter>,
}

impl Incrementer {
    /// Create a new incrementer
    pub fn new(config: IncrementConfig) -> Self {
        Self {
            config,
            progress: None,
        }
    }

    /// Set progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Some(progress);
        self
    }

    fn scanner(&self) -> Result<Scanner> {
        Scanner::new(ScanConfig {
            include_hidden: self.config.include_hidden,
            include_patterns: self.config.include_patterns.clone(),
            exclude_patterns: self.config.exclude_patterns.clone(),
        })
    }

    /// Offset to apply: the configured one, or highest training number + 1
    pub fn resolve_offset(&self) -> Result<i64> {
        if !self.config.offset_from_train {
            return Ok(self.config.offset);
        }

        let scan = self.scanner()?.scan(&self.config.train_dir)?;
        let offset = match scan.highest_number() {
            Some(highest) => shift_number(highest, 1)?,
            None => 0,
        };
        info!(
            train_dir = %self.config.train_dir.display(),
            offset,
            "Derived offset from training set"
        );
        Ok(offset)
    }

    /// Compute every target path without touching the target directory
    pub fn plan(&self) -> Result<IncrementPlan> {
        let offset = self.resolve_offset()?;
        let scan = self.scanner()?.scan(&self.config.test_dir)?;
        let records = scan.records()?;

        let mut seen: HashMap<PathBuf, PathBuf> = HashMap::with_capacity(records.len());
        let mut plans = Vec::with_capacity(records.len());

        for record in records {
            let plan = self.plan_one(&record, offset)?;
            if let Some(first) = seen.insert(plan.target.clone(), plan.source.clone()) {
                return Err(DsUtilError::TargetCollision {
                    first,
                    second: plan.source,
                    target: plan.target,
                });
            }
            debug!("Planned {} -> {}", plan.source.display(), plan.target.display());
            plans.push(plan);
        }

        Ok(IncrementPlan {
            offset,
            renames: plans,
            dirs_skipped: scan.dirs_skipped,
            total_size: scan.total_size,
        })
    }

    fn plan_one(&self, record: &ImageRecord, offset: i64) -> Result<RenamePlan> {
        let new_number = shift_number(record.number, offset)?;
        let target = self.config.together_dir.join(increment_name(&record.path, offset)?);

        Ok(RenamePlan {
            source: record.path.clone(),
            target,
            number: record.number,
            new_number,
            size: record.size,
        })
    }

    /// Execute the merge
    pub fn execute(&self) -> Result<IncrementResult> {
        let start_time = Instant::now();

        self.check_directories()?;
        self.announce(format!("Input path is: {}", self.config.test_dir.display()), |s| {
            style(s).yellow().to_string()
        });

        let plan = self.plan()?;
        info!(files = plan.renames.len(), offset = plan.offset, "Planned renames");
        if let (Some(first), Some(last)) = (plan.renames.first(), plan.renames.last()) {
            self.announce(
                format!(
                    "Images: {} files, {} .. {}",
                    plan.renames.len(),
                    first.source.display(),
                    last.source.display()
                ),
                |s| style(s).blue().to_string(),
            );
        }

        let mut result = IncrementResult {
            offset: plan.offset,
            mode: self.config.mode,
            files_renamed: 0,
            bytes_planned: plan.total_size,
            bytes_written: 0,
            verified: 0,
            dirs_skipped: plan.dirs_skipped,
            overwritten: 0,
            planned: plan.renames,
            dry_run: self.config.dry_run,
            duration: Duration::ZERO,
        };

        if self.config.dry_run || result.planned.is_empty() {
            result.duration = start_time.elapsed();
            return Ok(result);
        }

        std::fs::create_dir_all(&self.config.together_dir).with_path(&self.config.together_dir)?;

        if let Some(progress) = &self.progress {
            progress.set_total_items(result.planned.len() as u64);
            progress.set_total_bytes(result.bytes_planned);
        }

        for plan in &result.planned {
            match self.transfer(plan) {
                Ok(outcome) => {
                    result.files_renamed += 1;
                    result.bytes_written += outcome.bytes;
                    result.verified += outcome.verified as u64;
                    result.overwritten += outcome.overwrote as u64;
                    if let Some(progress) = &self.progress {
                        progress.increment_items(1);
                        progress.increment_bytes(plan.size);
                    }
                }
                Err(e) => {
                    if let Some(progress) = &self.progress {
                        progress.finish_error(&format!("Failed on {}", plan.source.display()));
                    }
                    return Err(e);
                }
            }
        }

        if let Some(progress) = &self.progress {
            progress.finish_success(&format!("Wrote {} files", result.files_renamed));
        }

        result.duration = start_time.elapsed();
        info!(
            files = result.files_renamed,
            bytes = result.bytes_written,
            "Increment complete"
        );
        Ok(result)
    }

    /// Reject a target directory that is the source itself
    fn check_directories(&self) -> Result<()> {
        let source = &self.config.test_dir;
        let target = &self.config.together_dir;

        if source.exists() && target.exists() {
            let source_abs = source.canonicalize().with_path(source)?;
            let target_abs = target.canonicalize().with_path(target)?;
            if source_abs == target_abs {
                return Err(DsUtilError::SameSourceAndTarget(source_abs));
            }
        }
        Ok(())
    }

    fn transfer(&self, plan: &RenamePlan) -> Result<TransferOutcome> {
        if let Some(progress) = &self.progress {
            progress.set_current_file(&plan.source.to_string_lossy());
        }
        let overwrote = plan.target.exists();
        if overwrote {
            if self.config.no_clobber {
                return Err(DsUtilError::TargetExists(plan.target.clone()));
            }
            warn!("Overwriting {}", plan.target.display());
        }

        self.announce(format!("Image path being read is: {}", plan.source.display()), |s| {
            style(s).green().to_string()
        });
        let image = read_image(&plan.source)?;

        self.announce(format!("Saving path is: {}", plan.target.display()), |s| {
            style(s).red().to_string()
        });
        let bytes = write_image(&image, &plan.source, &plan.target, self.config.mode)?;

        let verified = if self.config.verify {
            verify_pixels(&image, &plan.source, &plan.target)?;
            true
        } else {
            false
        };

        Ok(TransferOutcome {
            bytes,
            verified,
            overwrote,
        })
    }

    /// Colored user-facing line, above the bars or on stderr when they are hidden
    fn announce(&self, line: String, paint: impl Fn(String) -> String) {
        debug!("{}", line);
        if let Some(progress) = &self.progress {
            progress.println(paint(line));
        }
    }
}

struct TransferOutcome {
    bytes: u64,
    verified: bool,
    overwrote: bool,
}

/// Merge `test_dir` into `together_dir` with the given offset
pub fn increment_directory(test_dir: &Path, together_dir: &Path, offset: i64) -> Result<IncrementResult> {
    let config = IncrementConfig {
        test_dir: test_dir.to_path_buf(),
        together_dir: together_dir.to_path_buf(),
        offset,
        ..Default::default()
    };
    Incrementer::new(config).execute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::image_io::tests::write_png;
    use tempfile::TempDir;

    fn create_test_set(dir: &Path, numbers: &[i64]) {
        for (i, n) in numbers.iter().enumerate() {
            write_png(&dir.join(format!("{}.png", n)), i as u8);
        }
    }

    #[test]
    fn test_merge_default_offset() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_set(src.path(), &[0, 42, 1000]);

        let result = increment_directory(src.path(), dst.path(), 55680).unwrap();

        assert_eq!(result.files_renamed, 3);
        assert!(dst.path().join("55680.png").exists());
        assert!(dst.path().join("55722.png").exists());
        assert!(dst.path().join("56680.png").exists());
        assert_eq!(
            std::fs::read(src.path().join("42.png")).unwrap(),
            std::fs::read(dst.path().join("55722.png")).unwrap()
        );
    }

    #[test]
    fn test_pixels_unchanged_with_verification() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_set(src.path(), &[1, 2]);

        for mode in [TransferMode::Copy, TransferMode::Reencode] {
            let config = IncrementConfig {
                test_dir: src.path().to_path_buf(),
                together_dir: dst.path().to_path_buf(),
                offset: 10,
                mode,
                verify: true,
                ..Default::default()
            };
            let result = Incrementer::new(config).execute().unwrap();
            assert_eq!(result.verified, 2);
        }

        let a = read_image(&src.path().join("1.png")).unwrap();
        let b = read_image(&dst.path().join("11.png")).unwrap();
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn test_empty_source_succeeds() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();

        let result = increment_directory(src.path(), dst.path(), 55680).unwrap();

        assert_eq!(result.files_renamed, 0);
        assert_eq!(std::fs::read_dir(dst.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_non_numeric_fails_before_writing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_set(src.path(), &[1, 2]);
        write_png(&src.path().join("frame_a.png"), 9);

        let err = increment_directory(src.path(), dst.path(), 55680).unwrap_err();

        assert!(matches!(err, DsUtilError::NonNumericBasename { .. }));
        assert_eq!(std::fs::read_dir(dst.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_rerun_is_identical() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_set(src.path(), &[5, 6]);

        let first = increment_directory(src.path(), dst.path(), 100).unwrap();
        let bytes_first = std::fs::read(dst.path().join("105.png")).unwrap();
        let second = increment_directory(src.path(), dst.path(), 100).unwrap();
        let bytes_second = std::fs::read(dst.path().join("105.png")).unwrap();

        assert_eq!(first.planned, second.planned);
        assert_eq!(bytes_first, bytes_second);
        assert_eq!(second.overwritten, 2);
    }

    #[test]
    fn test_no_clobber_refuses_existing_target() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_set(src.path(), &[5]);
        std::fs::write(dst.path().join("105.png"), b"keep me").unwrap();

        let config = IncrementConfig {
            test_dir: src.path().to_path_buf(),
            together_dir: dst.path().to_path_buf(),
            offset: 100,
            no_clobber: true,
            ..Default::default()
        };
        let err = Incrementer::new(config).execute().unwrap_err();

        assert!(matches!(err, DsUtilError::TargetExists(_)));
        assert_eq!(std::fs::read(dst.path().join("105.png")).unwrap(), b"keep me");
    }

    #[test]
    fn test_unreadable_image_fails() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::write(src.path().join("3.png"), b"garbage").unwrap();

        let err = increment_directory(src.path(), dst.path(), 1).unwrap_err();
        assert!(matches!(err, DsUtilError::ImageRead { .. }));
    }

    #[test]
    fn test_collision_detected() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        write_png(&src.path().join("7.png"), 1);
        write_png(&src.path().join("007.png"), 2);

        let err = increment_directory(src.path(), dst.path(), 1).unwrap_err();
        assert!(matches!(err, DsUtilError::TargetCollision { .. }));
    }

    #[test]
    fn test_same_directory_rejected() {
        let src = TempDir::new().unwrap();
        create_test_set(src.path(), &[1]);

        let err = increment_directory(src.path(), src.path(), 1).unwrap_err();
        assert!(matches!(err, DsUtilError::SameSourceAndTarget(_)));
    }

    #[test]
    fn test_offset_from_train() {
        let train = TempDir::new().unwrap();
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_set(train.path(), &[0, 1, 2, 55679]);
        std::fs::write(train.path().join("labels.txt"), b"not numbered").unwrap();
        create_test_set(src.path(), &[0]);

        let config = IncrementConfig {
            train_dir: train.path().to_path_buf(),
            test_dir: src.path().to_path_buf(),
            together_dir: dst.path().to_path_buf(),
            offset_from_train: true,
            ..Default::default()
        };
        let result = Incrementer::new(config).execute().unwrap();

        assert_eq!(result.offset, 55680);
        assert!(dst.path().join("55680.png").exists());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let target = dst.path().join("merged");
        create_test_set(src.path(), &[1, 2, 3]);

        let config = IncrementConfig {
            test_dir: src.path().to_path_buf(),
            together_dir: target.clone(),
            dry_run: true,
            ..Default::default()
        };
        let result = Incrementer::new(config).execute().unwrap();

        assert_eq!(result.planned.len(), 3);
        assert_eq!(result.files_renamed, 0);
        assert_eq!(result.planned[0].target, target.join("55681.png"));
        assert!(!target.exists());
    }

    #[test]
    fn test_creates_missing_target_directory() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let target = dst.path().join("together");
        create_test_set(src.path(), &[4]);

        increment_directory(src.path(), &target, 1).unwrap();

        assert!(target.join("5.png").exists());
    }

    #[test]
    fn test_plan_targets_use_increment_name() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        for name in ["+5.png", "-0.png", "12.PNG", "3.jpeg"] {
            std::fs::write(src.path().join(name), b"x").unwrap();
        }

        let config = IncrementConfig {
            test_dir: src.path().to_path_buf(),
            together_dir: dst.path().to_path_buf(),
            offset: 10,
            ..Default::default()
        };
        let plan = Incrementer::new(config).plan().unwrap();

        assert_eq!(plan.renames.len(), 4);
        assert_eq!(plan.total_size, 4);
        for rename in &plan.renames {
            let expected = increment_name(&rename.source, 10).unwrap();
            assert_eq!(rename.target, dst.path().join(&expected));
            assert_eq!(rename.new_number, rename.number + 10);
        }
        let names: Vec<_> = plan
            .renames
            .iter()
            .map(|r| r.target.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["10.png", "13.jpeg", "15.png", "22.PNG"]);
    }

    #[test]
    fn test_result_reports_input_size() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        create_test_set(src.path(), &[1, 2]);
        let expected: u64 = ["1.png", "2.png"]
            .iter()
            .map(|n| std::fs::metadata(src.path().join(n)).unwrap().len())
            .sum();

        let result = increment_directory(src.path(), dst.path(), 1).unwrap();

        assert_eq!(result.bytes_planned, expected);
        assert_eq!(result.bytes_written, expected);
    }
}
