//! Numeric file names
//!
//! Splits a file name into stem and extension and shifts numeric stems
//! by an offset. The split is on the last dot, ignoring leading dots,
//! so `a.tar.gz` has stem `a.tar` and `.png` has no extension.

use crate::error::{DsUtilError, Result};
use std::path::Path;

/// Split a file name into `(stem, extension)`; the extension keeps its dot
pub fn split_name(file_name: &str) -> (&str, &str) {
    let first_real = file_name.find(|c| c != '.');
    match (file_name.rfind('.'), first_real) {
        (Some(dot), Some(start)) if dot > start => (&file_name[..dot], &file_name[dot..]),
        _ => (file_name, ""),
    }
}

/// Parse a stem as a signed decimal integer
pub fn parse_number(stem: &str) -> Option<i64> {
    stem.parse::<i64>().ok()
}

/// Add `offset` to a number, reporting overflow
pub fn shift_number(number: i64, offset: i64) -> Result<i64> {
    number
        .checked_add(offset)
        .ok_or(DsUtilError::OffsetOverflow { number, offset })
}

/// Compute the incremented file name for `path`
///
/// `42.png` with offset 55680 becomes `55722.png`. Leading zeros are not
/// kept because the stem is treated as an integer.
pub fn increment_name(path: &Path, offset: i64) -> Result<String> {
    let (number, extension) = parse_numbered(path)?;
    Ok(format!("{}{}", shift_number(number, offset)?, extension))
}

/// Numeric stem and extension of `path`'s file name
pub(crate) fn parse_numbered(path: &Path) -> Result<(i64, &str)> {
    let file_name = file_name_str(path)?;
    let (stem, extension) = split_name(file_name);

    let number = parse_number(stem).ok_or_else(|| DsUtilError::NonNumericBasename {
        path: path.to_path_buf(),
        stem: stem.to_string(),
    })?;
    Ok((number, extension))
}

/// Borrow the final path component as UTF-8
fn file_name_str(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DsUtilError::NonNumericBasename {
            path: path.to_path_buf(),
            stem: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        })
}
