//! Progress bars for renaming runs and device uploads
//!
//! A status spinner sits above two bars: one counting work items (images
//! for the incrementer, upload chunks for the occupier) and one counting
//! bytes. Announcement lines go above the bars, or to stderr when the
//! bars are hidden.

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Widest status message before the path is shortened from the left
const STATUS_WIDTH: usize = 60;

/// Where announcement lines end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineTarget {
    /// Printed above the bars
    Bars,
    /// Bars hidden, lines on stderr
    Stderr,
    /// Nothing is printed
    Silent,
}

/// Progress reporter for renaming runs and device uploads
pub struct ProgressReporter {
    multi: MultiProgress,
    status: ProgressBar,
    items: ProgressBar,
    bytes: ProgressBar,
    lines: LineTarget,
}

fn styled(template: &str, progress_chars: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(progress_chars)
}

impl ProgressReporter {
    /// Create a reporter whose item bar counts `unit` (e.g. "images", "chunks")
    pub fn new(unit: &str) -> Self {
        let multi = MultiProgress::new();

        let status = multi.add(ProgressBar::new_spinner());
        status.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {wide_msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        let items = multi.add(ProgressBar::new(0));
        items.set_style(styled(
            "{prefix:>7.bold.dim} {wide_bar:.cyan/blue} {pos}/{len} ({percent}%)",
            "#>-",
        ));
        items.set_prefix(unit.to_string());

        let bytes = multi.add(ProgressBar::new(0));
        bytes.set_style(styled(
            "{prefix:>7.bold.dim} {wide_bar:.green/white} {binary_bytes}/{binary_total_bytes} {binary_bytes_per_sec} eta {eta}",
            "=> ",
        ));
        bytes.set_prefix("data");

        Self {
            multi,
            status,
            items,
            bytes,
            lines: LineTarget::Bars,
        }
    }

    /// Reporter without bars; announcement lines still go to stderr
    pub fn hidden(unit: &str) -> Self {
        let mut reporter = Self::new(unit);
        reporter.multi.set_draw_target(ProgressDrawTarget::hidden());
        reporter.lines = LineTarget::Stderr;
        reporter
    }

    /// Reporter that prints nothing at all (quiet mode)
    pub fn disabled() -> Self {
        let mut reporter = Self::hidden("items");
        reporter.lines = LineTarget::Silent;
        reporter
    }

    /// Set the number of items (images or chunks)
    pub fn set_total_items(&self, total: u64) {
        self.items.set_length(total);
    }

    /// Set the number of bytes to move
    pub fn set_total_bytes(&self, total: u64) {
        self.bytes.set_length(total);
    }

    /// Count finished items
    pub fn increment_items(&self, count: u64) {
        self.items.inc(count);
    }

    /// Count moved bytes
    pub fn increment_bytes(&self, bytes: u64) {
        self.bytes.inc(bytes);
    }

    /// Show a phase message in the status line
    pub fn set_status(&self, msg: &str) {
        self.status.set_message(msg.to_string());
    }

    /// Show the file being processed, keeping the end of long paths
    pub fn set_current_file(&self, path: &str) {
        self.status.set_message(shorten_left(path, STATUS_WIDTH));
    }

    /// Print an announcement line
    pub fn println(&self, line: impl AsRef<str>) {
        match self.lines {
            LineTarget::Bars => {
                let _ = self.multi.println(line);
            }
            LineTarget::Stderr => eprintln!("{}", line.as_ref()),
            LineTarget::Silent => {}
        }
    }

    /// Complete all bars with a success message
    pub fn finish_success(&self, message: &str) {
        self.status.finish_with_message(format!("✓ {}", message));
        self.items.finish();
        self.bytes.finish();
    }

    /// Stop all bars where they are with an error message
    pub fn finish_error(&self, message: &str) {
        self.status.finish_with_message(format!("✗ {}", message));
        self.items.abandon();
        self.bytes.abandon();
    }
}

fn shorten_left(path: &str, width: usize) -> String {
    let count = path.chars().count();
    if count <= width {
        return path.to_string();
    }
    let keep = width.saturating_sub(3);
    let start = path
        .char_indices()
        .nth(count - keep)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("...{}", &path[start..])
}
