//! Per-file metadata used to rank duplicates.
//!
//! The [`StatsReader`] collaborator never fails outward: an unreadable or
//! undecodable file yields zeroed stats (with whatever modification time the
//! filesystem can still provide) and a log line, so a single broken file
//! never sinks a whole scan.

mod keeper;

pub use keeper::KeeperPolicy;
pub(crate) use keeper::path_key;

use serde::{Deserialize, Serialize};
use std::io::BufReader;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileStats {
    pub width: u32,
    pub height: u32,
    pub pixels: u64,
    /// Number of embedded metadata (EXIF) fields.
    pub metadata_fields: u32,
    /// Modification time, unix seconds.
    pub modified: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpness: Option<f64>,
}

pub trait StatsReader: Send + Sync {
    /// Collect stats for one file. Never fails outward.
    fn stats(&self, path: &Path, want_sharpness: bool) -> FileStats;
}

/// Reads stats from image files on disk.
pub struct ImageStatsReader;

impl StatsReader for ImageStatsReader {
    fn stats(&self, path: &Path, want_sharpness: bool) -> FileStats {
        let modified = fs_mtime(path);

        let (width, height) = match image::image_dimensions(path) {
            Ok(dims) => dims,
            Err(e) => {
                warn!("failed to read dimensions of {:?}: {}", path, e);
                return FileStats {
                    modified,
                    ..FileStats::default()
                };
            }
        };

        let sharpness = if want_sharpness {
            sharpness_score(path)
        } else {
            None
        };

        FileStats {
            width,
            height,
            pixels: width as u64 * height as u64,
            metadata_fields: metadata_field_count(path),
            modified,
            sharpness,
        }
    }
}

fn fs_mtime(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn metadata_field_count(path: &Path) -> u32 {
    let Ok(file) = std::fs::File::open(path) else {
        return 0;
    };
    let mut reader = BufReader::new(file);
    match exif::Reader::new().read_from_container(&mut reader) {
        Ok(meta) => meta.fields().count() as u32,
        // Most PNGs and stripped JPEGs simply carry no EXIF container.
        Err(_) => 0,
    }
}

/// Variance of a 3x3 Laplacian over a downscaled grayscale rendition.
/// Higher means sharper. `None` when the file cannot be decoded.
fn sharpness_score(path: &Path) -> Option<f64> {
    let img = match image::open(path) {
        Ok(img) => img,
        Err(e) => {
            warn!("failed to decode {:?} for sharpness: {}", path, e);
            return None;
        }
    };
    let gray = img.thumbnail(256, 256).into_luma8();
    let (w, h) = gray.dimensions();
    if w < 3 || h < 3 {
        return Some(0.0);
    }

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut count = 0.0f64;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let center = gray.get_pixel(x, y)[0] as f64;
            let lap = gray.get_pixel(x - 1, y)[0] as f64
                + gray.get_pixel(x + 1, y)[0] as f64
                + gray.get_pixel(x, y - 1)[0] as f64
                + gray.get_pixel(x, y + 1)[0] as f64
                - 4.0 * center;
            sum += lap;
            sum_sq += lap * lap;
            count += 1.0;
        }
    }
    let mean = sum / count;
    Some(sum_sq / count - mean * mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        let img = ImageBuffer::from_pixel(width, height, Rgb::<u8>([128, 64, 32]));
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn reads_dimensions_of_real_image() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "img.png", 6, 4);

        let stats = ImageStatsReader.stats(&path, false);
        assert_eq!(stats.width, 6);
        assert_eq!(stats.height, 4);
        assert_eq!(stats.pixels, 24);
        assert!(stats.modified > 0);
        assert!(stats.sharpness.is_none());
    }

    #[test]
    fn undecodable_file_yields_zeroed_stats_with_mtime() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("broken.png");
        std::fs::write(&path, b"not an image").unwrap();

        let stats = ImageStatsReader.stats(&path, true);
        assert_eq!(stats.width, 0);
        assert_eq!(stats.height, 0);
        assert_eq!(stats.pixels, 0);
        assert_eq!(stats.metadata_fields, 0);
        assert!(stats.modified > 0);
    }

    #[test]
    fn missing_file_yields_fully_zeroed_stats() {
        let stats = ImageStatsReader.stats(Path::new("/no/such/file.png"), false);
        assert_eq!(stats, FileStats::default());
    }

    #[test]
    fn sharpness_present_only_when_requested() {
        let tmp = TempDir::new().unwrap();
        let path = write_png(tmp.path(), "img.png", 16, 16);

        let without = ImageStatsReader.stats(&path, false);
        assert!(without.sharpness.is_none());

        let with = ImageStatsReader.stats(&path, true);
        // A flat image has zero Laplacian variance.
        assert_eq!(with.sharpness, Some(0.0));
    }

    #[test]
    fn textured_image_is_sharper_than_flat() {
        let tmp = TempDir::new().unwrap();
        let flat = write_png(tmp.path(), "flat.png", 32, 32);

        let noisy_path = tmp.path().join("noisy.png");
        let noisy = ImageBuffer::from_fn(32, 32, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb::<u8>([255, 255, 255])
            } else {
                Rgb::<u8>([0, 0, 0])
            }
        });
        noisy.save(&noisy_path).unwrap();

        let flat_score = ImageStatsReader.stats(&flat, true).sharpness.unwrap();
        let noisy_score = ImageStatsReader.stats(&noisy_path, true).sharpness.unwrap();
        assert!(noisy_score > flat_score);
    }
}
