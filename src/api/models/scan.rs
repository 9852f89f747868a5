use serde::{Deserialize, Serialize};

use crate::core::config::ScanConfig;
use crate::core::video::VideoInfo;
use crate::scanner::{ModelInfo, ScanOutcome};

/// 一次扫描的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub model: ModelInfo,
    #[serde(default)]
    pub config: ScanConfig,
    #[serde(default)]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoSummary {
    pub filename: String,
    pub total_frames: u64,
    pub fps: u32,
    pub duration_seconds: f64,
    /// "WxH"
    pub resolution: String,
}

impl From<&VideoInfo> for VideoSummary {
    fn from(info: &VideoInfo) -> Self {
        Self {
            filename: info.filename.clone(),
            total_frames: info.total_frames,
            fps: info.fps,
            duration_seconds: info.duration_seconds(),
            resolution: info.resolution(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingInfo {
    pub processed_frames: u64,
    pub frame_stride: i64,
    pub total_detections: u64,
    pub saved_frames: u64,
    pub saved_detections: u64,
    pub skipped_normal: u64,
    pub skipped_duplicates: u64,
    pub skipped_consecutive: u64,
    pub duplicate_ratio: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub id: i64,
    pub name: String,
    pub version: String,
}

/// 扫描结果摘要
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanReport {
    pub run_id: u64,
    pub video_info: VideoSummary,
    pub processing_info: ProcessingInfo,
    pub model_info: ModelSummary,
}

impl ScanReport {
    pub fn new(outcome: &ScanOutcome, config: &ScanConfig, model: &ModelInfo) -> Self {
        let stats = &outcome.stats;
        Self {
            run_id: outcome.run_id,
            video_info: VideoSummary::from(&outcome.video),
            processing_info: ProcessingInfo {
                processed_frames: stats.processed_frames,
                frame_stride: config.frame_stride,
                total_detections: stats.total_detections,
                saved_frames: stats.saved_frames,
                saved_detections: stats.saved_detections,
                skipped_normal: stats.skipped_normal,
                skipped_duplicates: stats.skipped_duplicates,
                skipped_consecutive: stats.skipped_consecutive,
                duplicate_ratio: stats.duplicate_ratio(),
            },
            model_info: ModelSummary {
                id: model.id,
                name: model.name.clone(),
                version: model.version.clone(),
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
