use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};

/// Write a small RGB PNG with a bright square in the middle.
pub fn write_test_png(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    let image = RgbImage::from_fn(32, 32, |x, y| {
        if (12..20).contains(&x) && (12..20).contains(&y) {
            Rgb([220, 220, 220])
        } else {
            Rgb([20, 20, 20])
        }
    });
    image.save(&path).expect("write test png");
    path
}

/// Encode the same test image as PNG bytes, as an upload would carry them.
pub fn test_png_bytes(dir: &Path) -> Vec<u8> {
    let path = write_test_png(dir, "upload_source.png");
    std::fs::read(path).expect("read test png")
}
