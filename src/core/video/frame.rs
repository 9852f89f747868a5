use std::time::Duration;

use image::RgbImage;

use crate::core::error::{ScanError, ScanResult};

/// 解码后的视频帧
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGBA
    pub timestamp: Duration,
    /// 1-based position in the stream
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp: Duration::from_millis(timestamp_ms),
            frame_number,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = Vec::with_capacity(self.pixel_count() * 3);
        for chunk in self.data.chunks_exact(4) {
            rgb.extend_from_slice(&chunk[..3]);
        }
        rgb
    }

    pub fn to_rgb_image(&self) -> ScanResult<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.to_rgb()).ok_or_else(|| {
            ScanError::FrameDecode(format!(
                "frame {} has {} bytes, expected {}x{} RGBA",
                self.frame_number,
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }
}

/// 宿主解码器传入的 I420 原始帧
#[derive(Debug)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub y_plane: Vec<u8>,
    pub u_plane: Vec<u8>,
    pub v_plane: Vec<u8>,
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl RawFrame {
    pub fn to_rgba(&self) -> ScanResult<Frame> {
        let w = self.width as usize;
        let h = self.height as usize;
        let chroma = w.div_ceil(2) * h.div_ceil(2);
        if self.y_plane.len() < w * h || self.u_plane.len() < chroma || self.v_plane.len() < chroma
        {
            return Err(ScanError::FrameDecode(format!(
                "raw frame {} planes too short for {}x{}",
                self.frame_number, self.width, self.height
            )));
        }

        let mut rgba = vec![0u8; w * h * 4];
        for y in 0..h {
            for x in 0..w {
                let y_idx = y * w + x;
                let uv_idx = (y / 2) * w.div_ceil(2) + x / 2;

                let luma = self.y_plane[y_idx] as f32;
                let u = self.u_plane[uv_idx] as f32 - 128.0;
                let v = self.v_plane[uv_idx] as f32 - 128.0;

                let out = y_idx * 4;
                rgba[out] = (luma + 1.402 * v).clamp(0.0, 255.0) as u8;
                rgba[out + 1] = (luma - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8;
                rgba[out + 2] = (luma + 1.772 * u).clamp(0.0, 255.0) as u8;
                rgba[out + 3] = 255;
            }
        }

        Ok(Frame::new(
            self.width,
            self.height,
            rgba,
            self.timestamp_ms,
            self.frame_number,
        ))
    }
}
