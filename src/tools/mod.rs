//! Image loading helpers shared by `scantool` and the benchmarks

use crate::error::Result;
use crate::models::Frame;
use image::GenericImageView;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

fn max_dim_from_env() -> Option<u32> {
    match env::var("SCAN_MAX_DIM") {
        Ok(value) => match value.trim().parse::<u32>() {
            Ok(0) => None,
            Ok(v) => Some(v),
            Err(_) => None,
        },
        Err(_) => None,
    }
}

/// Load an image file as a frame stamped with the current time
///
/// Images larger than `SCAN_MAX_DIM` on their long side are downscaled first.
pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<Frame> {
    let img = image::open(path)?;
    let rgba = match max_dim_from_env() {
        Some(max_dim) if img.dimensions().0.max(img.dimensions().1) > max_dim => img
            .resize(max_dim, max_dim, image::imageops::FilterType::Triangle)
            .to_rgba8(),
        _ => img.to_rgba8(),
    };
    let (width, height) = rgba.dimensions();
    Frame::from_rgba(width, height, rgba.into_raw(), Instant::now())
}

/// Default dataset root from `SCAN_DATASET_ROOT`
pub fn dataset_root_from_env() -> PathBuf {
    env::var("SCAN_DATASET_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("benches/images"))
}

/// Sorted image paths below `root`, optionally truncated
pub fn dataset_iter<P: AsRef<Path>>(root: P, limit: Option<usize>) -> impl Iterator<Item = PathBuf> {
    let mut images = collect_images(root.as_ref());
    images.sort();
    if let Some(limit) = limit {
        images.truncate(limit);
    }
    images.into_iter()
}

/// Expected payload stored next to an image as `<stem>.txt`
///
/// The first line that is neither blank nor a `#` comment is the payload.
pub fn expected_payload<P: AsRef<Path>>(image_path: P) -> Option<String> {
    let content = fs::read_to_string(image_path.as_ref().with_extension("txt")).ok()?;
    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn collect_images(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return if is_image(root) {
            vec![root.to_path_buf()]
        } else {
            Vec::new()
        };
    }

    let mut stack = vec![root.to_path_buf()];
    let mut images = Vec::new();

    while let Some(dir) = stack.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => continue,
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if is_image(&path) {
                images.push(path);
            }
        }
    }

    images
}
