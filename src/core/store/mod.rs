//! 持久化网关 - 检测记录、帧记录、检测框记录以及告警帧图片

pub mod images;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::ScanResult;
use crate::core::labels::FraudLabel;
use crate::core::video::Frame;

pub use images::{FileImageStore, MemoryImageStore};
pub use memory::InMemoryRunStore;

pub type RunId = u64;
pub type FrameId = u64;
pub type BoxId = u64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRun {
    pub id: RunId,
    pub model_id: i64,
    pub time_detect: DateTime<Utc>,
    pub description: String,
    pub confidence_threshold: f32,
    pub frame_skip: i64,
    pub similarity_threshold: f32,
    pub video_url: Option<String>,
    /// Insertion order is processing order.
    pub frames: Vec<FrameRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameRecord {
    pub id: FrameId,
    pub run_id: RunId,
    pub image_url: String,
    pub bounding_boxes: Vec<BoundingBoxRecord>,
}

/// `x_center`/`y_center` hold the top-left corner, not the centre. Existing consumers read
/// them that way, so the naming stays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundingBoxRecord {
    pub id: BoxId,
    pub frame_id: FrameId,
    pub fraud_label: Option<FraudLabel>,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

impl BoundingBoxRecord {
    pub fn to_xyxy(&self) -> (f32, f32, f32, f32) {
        (
            self.x_center,
            self.y_center,
            self.x_center + self.width,
            self.y_center + self.height,
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewRun {
    pub model_id: i64,
    pub time_detect: DateTime<Utc>,
    pub description: String,
    pub confidence_threshold: f32,
    pub frame_skip: i64,
    pub similarity_threshold: f32,
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewBoundingBox {
    pub fraud_label: Option<FraudLabel>,
    pub x_center: f32,
    pub y_center: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub relative_path: String,
    pub url: String,
}

pub trait RunStore: Send + Sync {
    fn create_run(&self, run: NewRun) -> ScanResult<RunId>;
    fn create_frame(&self, run_id: RunId, image: &ImageRef) -> ScanResult<FrameId>;
    fn create_bounding_box(&self, frame_id: FrameId, bbox: NewBoundingBox) -> ScanResult<BoxId>;
    fn update_run_description(&self, run_id: RunId, description: &str) -> ScanResult<()>;
    fn get_run(&self, run_id: RunId) -> ScanResult<Option<DetectionRun>>;
}

pub trait ImageStore: Send + Sync {
    fn save_frame_image(&self, frame: &Frame, ordinal: u64) -> ScanResult<ImageRef>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_record_reconstructs_corners() {
        let record = BoundingBoxRecord {
            id: 1,
            frame_id: 1,
            fraud_label: None,
            x_center: 10.5,
            y_center: 20.0,
            width: 30.25,
            height: 5.0,
            confidence: 0.9,
        };
        let (x1, y1, x2, y2) = record.to_xyxy();
        assert_eq!((x1, y1), (10.5, 20.0));
        assert!((x2 - 40.75).abs() < 1e-5);
        assert!((y2 - 25.0).abs() < 1e-5);
    }

    #[test]
    fn test_box_record_serializes_legacy_field_names() {
        let record = BoundingBoxRecord {
            id: 3,
            frame_id: 2,
            fraud_label: None,
            x_center: 1.0,
            y_center: 2.0,
            width: 3.0,
            height: 4.0,
            confidence: 0.5,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["xCenter"], 1.0);
        assert_eq!(json["yCenter"], 2.0);
        assert_eq!(json["frameId"], 2);
        assert!(json["fraudLabel"].is_null());
    }
}
