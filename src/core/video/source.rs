//! 视频帧来源 - 解码与句柄释放

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::frame::{Frame, RawFrame};
use crate::core::error::{ScanError, ScanResult};

const FRAME_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "bmp"];

/// 视频元数据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub filename: String,
    pub fps: u32,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoInfo {
    pub fn duration_seconds(&self) -> f64 {
        if self.fps == 0 {
            0.0
        } else {
            self.total_frames as f64 / self.fps as f64
        }
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

pub trait VideoSource {
    fn info(&self) -> &VideoInfo;

    /// `Ok(None)` marks end of stream.
    fn next_frame(&mut self) -> ScanResult<Option<Frame>>;
}

enum Pending {
    Decoded(Frame),
    Raw(RawFrame),
}

/// Frames already decoded by the host (or raw I420 planes still to convert).
pub struct MemorySource {
    info: VideoInfo,
    frames: VecDeque<Pending>,
}

impl MemorySource {
    pub fn new(info: VideoInfo, frames: Vec<Frame>) -> Self {
        Self {
            info,
            frames: frames.into_iter().map(Pending::Decoded).collect(),
        }
    }

    pub fn from_raw_frames(info: VideoInfo, frames: Vec<RawFrame>) -> Self {
        Self {
            info,
            frames: frames.into_iter().map(Pending::Raw).collect(),
        }
    }

    /// Uniform grey frames, numbered 1..=count.
    pub fn blank(filename: &str, count: u64, width: u32, height: u32, fps: u32) -> Self {
        let step_ms = 1000 / u64::from(fps.max(1));
        let frames = (1..=count)
            .map(|n| {
                let data = vec![128u8; width as usize * height as usize * 4];
                Frame::new(width, height, data, (n - 1) * step_ms, n)
            })
            .collect();
        let info = VideoInfo {
            filename: filename.to_string(),
            fps,
            total_frames: count,
            width,
            height,
        };
        Self::new(info, frames)
    }
}

impl VideoSource for MemorySource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> ScanResult<Option<Frame>> {
        match self.frames.pop_front() {
            Some(Pending::Decoded(frame)) => Ok(Some(frame)),
            Some(Pending::Raw(raw)) => raw.to_rgba().map(Some),
            None => Ok(None),
        }
    }
}

/// A directory of extracted still frames, played back in file-name order.
pub struct FrameDirSource {
    info: VideoInfo,
    files: VecDeque<PathBuf>,
    next_number: u64,
}

impl FrameDirSource {
    pub fn open(dir: &Path, fps: u32) -> ScanResult<Self> {
        let open_err = |reason: String| ScanError::VideoOpen {
            path: dir.to_path_buf(),
            reason,
        };

        if !dir.is_dir() {
            return Err(open_err("not a directory".to_string()));
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| open_err(e.to_string()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && Self::is_frame_file(path))
            .collect();
        files.sort();

        let first = files
            .first()
            .ok_or_else(|| open_err("no frame images found".to_string()))?;
        let (width, height) =
            image::image_dimensions(first).map_err(|e| open_err(e.to_string()))?;

        let filename = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        info!(
            "📂 FrameDirSource: {} frames ({}x{}) from {:?}",
            files.len(),
            width,
            height,
            dir
        );

        Ok(Self {
            info: VideoInfo {
                filename,
                fps,
                total_frames: files.len() as u64,
                width,
                height,
            },
            files: files.into(),
            next_number: 1,
        })
    }

    fn is_frame_file(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
    }
}

impl VideoSource for FrameDirSource {
    fn info(&self) -> &VideoInfo {
        &self.info
    }

    fn next_frame(&mut self) -> ScanResult<Option<Frame>> {
        let Some(path) = self.files.pop_front() else {
            return Ok(None);
        };

        let img = image::open(&path)
            .map_err(|e| ScanError::FrameDecode(format!("{:?}: {}", path, e)))?
            .to_rgba8();
        let (width, height) = img.dimensions();

        let number = self.next_number;
        self.next_number += 1;
        let timestamp_ms = (number - 1) * 1000 / u64::from(self.info.fps.max(1));

        Ok(Some(Frame::new(width, height, img.into_raw(), timestamp_ms, number)))
    }
}

/// 视频句柄 - 离开作用域即释放，错误路径同样生效
pub struct VideoHandle<S: VideoSource> {
    source: S,
    frames_read: u64,
}

impl<S: VideoSource> VideoHandle<S> {
    pub fn new(source: S) -> Self {
        let info = source.info();
        info!(
            "🎬 Video opened: {} ({}, {} fps, {} frames)",
            info.filename,
            info.resolution(),
            info.fps,
            info.total_frames
        );
        Self {
            source,
            frames_read: 0,
        }
    }

    pub fn info(&self) -> &VideoInfo {
        self.source.info()
    }

    pub fn read_frame(&mut self) -> ScanResult<Option<Frame>> {
        let frame = self.source.next_frame()?;
        if frame.is_some() {
            self.frames_read += 1;
        }
        Ok(frame)
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }
}

impl<S: VideoSource> Drop for VideoHandle<S> {
    fn drop(&mut self) {
        info!(
            "🗑️ Video released: {} after {} frames",
            self.source.info().filename,
            self.frames_read
        );
        debug!("video handle dropped");
    }
}
