//! Image reading, writing and pixel comparison
//!
//! Inputs are always decoded so unreadable files fail the run with the
//! decoder's own error. Outputs are either byte copies of the input or
//! re-encoded from the decoded pixels.

use crate::config::TransferMode;
use crate::error::{DsUtilError, IoResultExt, Result};
use image::{DynamicImage, ImageError, ImageReader};
use std::path::Path;

/// Decode an image, guessing the format from its contents
pub fn read_image(path: &Path) -> Result<DynamicImage> {
    let image_read = |source: ImageError| DsUtilError::ImageRead {
        path: path.to_path_buf(),
        source,
    };

    ImageReader::open(path)
        .map_err(|e| image_read(ImageError::IoError(e)))?
        .with_guessed_format()
        .map_err(|e| image_read(ImageError::IoError(e)))?
        .decode()
        .map_err(image_read)
}

/// Write `image` (decoded from `source`) to `target`, returning bytes written
pub fn write_image(image: &DynamicImage, source: &Path, target: &Path, mode: TransferMode) -> Result<u64> {
    match mode {
        TransferMode::Copy => std::fs::copy(source, target).with_path(target),
        TransferMode::Reencode => {
            image.save(target).map_err(|source| DsUtilError::ImageWrite {
                path: target.to_path_buf(),
                source,
            })?;
            Ok(std::fs::metadata(target).with_path(target)?.len())
        }
    }
}

/// Decode `target` and check it holds the same pixels as `expected`
pub fn verify_pixels(expected: &DynamicImage, source: &Path, target: &Path) -> Result<()> {
    let actual = read_image(target)?;

    let mismatch = |reason: String| DsUtilError::PixelMismatch {
        source_path: source.to_path_buf(),
        target_path: target.to_path_buf(),
        reason,
    };

    let expected_dims = (expected.width(), expected.height());
    let actual_dims = (actual.width(), actual.height());
    if expected_dims != actual_dims {
        return Err(mismatch(format!("dimensions {:?} != {:?}", expected_dims, actual_dims)));
    }
    if expected.color() != actual.color() {
        return Err(mismatch(format!("color type {:?} != {:?}", expected.color(), actual.color())));
    }
    if expected.as_bytes() != actual.as_bytes() {
        return Err(mismatch("pixel data differs".to_string()));
    }

    Ok(())
}
