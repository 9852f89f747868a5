//! 告警帧图片落盘

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Local;
use image::ImageOutputFormat;
use log::debug;

use super::{ImageRef, ImageStore};
use crate::core::config::ServiceConfig;
use crate::core::error::{ScanError, ScanResult};
use crate::core::video::Frame;

const JPEG_QUALITY: u8 = 90;

pub struct FileImageStore {
    dir: PathBuf,
    url_path: String,
    public_base_url: String,
}

impl FileImageStore {
    pub fn new(dir: &Path, url_path: &str, public_base_url: &str) -> ScanResult<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            url_path: url_path.trim_end_matches('/').to_string(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> ScanResult<Self> {
        let root = config
            .storage_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "uploads".to_string());
        Self::new(
            &config.flagged_frames_dir(),
            &format!("/{}/flagged_frames", root),
            &config.public_base_url,
        )
    }

    fn encode_jpeg(frame: &Frame) -> ScanResult<Vec<u8>> {
        let img = frame.to_rgb_image()?;
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, ImageOutputFormat::Jpeg(JPEG_QUALITY))?;
        Ok(buffer.into_inner())
    }
}

impl ImageStore for FileImageStore {
    fn save_frame_image(&self, frame: &Frame, ordinal: u64) -> ScanResult<ImageRef> {
        let stamp = Local::now().format("%Y%m%d_%H%M%S%6f");
        let filename = format!("frame_{}_{}.jpg", ordinal, stamp);

        let jpeg = Self::encode_jpeg(frame)?;
        let path = self.dir.join(&filename);
        std::fs::write(&path, &jpeg)
            .map_err(|e| ScanError::Storage(format!("write {:?}: {}", path, e)))?;
        debug!("💾 Saved flagged frame {} ({} bytes)", filename, jpeg.len());

        let relative_path = format!("{}/{}", self.url_path, filename);
        Ok(ImageRef {
            url: format!("{}{}", self.public_base_url, relative_path),
            relative_path,
        })
    }
}

/// Keeps no pixels; hands out deterministic references. Used for dry runs.
#[derive(Default)]
pub struct MemoryImageStore {
    saved: Mutex<Vec<u64>>,
}

impl MemoryImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn saved_ordinals(&self) -> Vec<u64> {
        self.saved.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl ImageStore for MemoryImageStore {
    fn save_frame_image(&self, _frame: &Frame, ordinal: u64) -> ScanResult<ImageRef> {
        self.saved
            .lock()
            .map_err(|e| ScanError::Storage(format!("image store lock poisoned: {}", e)))?
            .push(ordinal);
        let relative_path = format!("/memory/frame_{:06}.jpg", ordinal);
        Ok(ImageRef {
            url: format!("memory://{}", relative_path),
            relative_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(frame_number: u64) -> Frame {
        Frame::new(16, 8, vec![200u8; 16 * 8 * 4], 0, frame_number)
    }

    #[test]
    fn test_file_store_writes_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            FileImageStore::new(&dir.path().join("flagged"), "/uploads/flagged_frames/", "http://host:5000/")
                .unwrap();

        let image_ref = store.save_frame_image(&test_frame(40), 40).unwrap();
        assert!(image_ref.relative_path.starts_with("/uploads/flagged_frames/frame_40_"));
        assert!(image_ref.relative_path.ends_with(".jpg"));
        assert_eq!(
            image_ref.url,
            format!("http://host:5000{}", image_ref.relative_path)
        );

        let filename = image_ref.relative_path.rsplit('/').next().unwrap();
        let written = image::open(dir.path().join("flagged").join(filename)).unwrap();
        assert_eq!((written.width(), written.height()), (16, 8));
    }

    #[test]
    fn test_file_store_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            storage_dir: dir.path().join("uploads"),
            ..Default::default()
        };
        let store = FileImageStore::from_config(&config).unwrap();
        let image_ref = store.save_frame_image(&test_frame(1), 1).unwrap();
        assert!(image_ref
            .url
            .starts_with("http://localhost:5000/uploads/flagged_frames/frame_1_"));
        assert!(config.flagged_frames_dir().is_dir());
    }

    #[test]
    fn test_bad_frame_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileImageStore::new(dir.path(), "/f", "http://h").unwrap();
        let broken = Frame::new(16, 16, vec![0u8; 4], 0, 1);
        assert!(store.save_frame_image(&broken, 1).is_err());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_memory_store_records_ordinals() {
        let store = MemoryImageStore::new();
        let image_ref = store.save_frame_image(&test_frame(20), 20).unwrap();
        store.save_frame_image(&test_frame(60), 60).unwrap();
        assert_eq!(image_ref.url, "memory:///memory/frame_000020.jpg");
        assert_eq!(store.saved_ordinals(), vec![20, 60]);
    }
}
