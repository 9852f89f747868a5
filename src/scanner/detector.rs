//! 目标检测适配层 - 模型本身视为不透明的外部能力

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use serde::{Deserialize, Serialize};

use super::geometry::BBox;
use crate::core::error::{ScanError, ScanResult};
use crate::core::video::Frame;

/// Class name of benign detections.
pub const NORMAL_CLASS: &str = "normal";

/// One unfiltered prediction on one sampled frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDetection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: Option<BBox>,
}

impl RawDetection {
    pub fn new(class_id: u32, class_name: &str, confidence: f32, bbox: Option<BBox>) -> Self {
        Self {
            class_id,
            class_name: class_name.to_string(),
            confidence,
            bbox,
        }
    }

    pub fn is_normal(&self) -> bool {
        self.class_name.eq_ignore_ascii_case(NORMAL_CLASS)
    }
}

pub trait Detector: Send + Sync {
    fn detect(&self, frame: &Frame, confidence_floor: f32) -> ScanResult<Vec<RawDetection>>;
}

/// Output row of a loaded model, before class names are attached.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelBox {
    pub class_id: u32,
    pub confidence: f32,
    pub xyxy: Option<[f32; 4]>,
}

/// A loaded detection model (YOLO or similar).
pub trait ObjectModel: Send + Sync {
    fn predict(&self, frame: &Frame, confidence_floor: f32) -> ScanResult<Vec<ModelBox>>;

    fn class_names(&self) -> &[String];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: i64,
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub weights_path: Option<PathBuf>,
}

impl ModelInfo {
    pub fn verify(&self) -> ScanResult<()> {
        match &self.weights_path {
            Some(path) if !path.is_file() => Err(ScanError::ModelFileMissing(path.clone())),
            _ => Ok(()),
        }
    }
}

pub struct ModelDetector<M: ObjectModel> {
    model: M,
}

impl<M: ObjectModel> ModelDetector<M> {
    pub fn new(model: M) -> Self {
        Self { model }
    }

    fn class_name(&self, class_id: u32) -> String {
        self.model
            .class_names()
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", class_id))
    }
}

impl<M: ObjectModel> Detector for ModelDetector<M> {
    fn detect(&self, frame: &Frame, confidence_floor: f32) -> ScanResult<Vec<RawDetection>> {
        let boxes = self.model.predict(frame, confidence_floor)?;
        let detections: Vec<RawDetection> = boxes
            .into_iter()
            .filter(|b| b.confidence >= confidence_floor)
            .map(|b| RawDetection {
                class_id: b.class_id,
                class_name: self.class_name(b.class_id),
                confidence: b.confidence,
                bbox: b.xyxy.map(|[x1, y1, x2, y2]| BBox::new(x1, y1, x2, y2)),
            })
            .collect();

        debug!(
            "frame {}: {} detections above {:.2}",
            frame.frame_number,
            detections.len(),
            confidence_floor
        );
        Ok(detections)
    }
}

type Script = Box<dyn Fn(u64) -> ScanResult<Vec<RawDetection>> + Send + Sync>;

/// Deterministic detector driven by the frame number.
pub struct ScriptedDetector {
    script: Script,
    calls: AtomicU64,
}

impl ScriptedDetector {
    pub fn new() -> Self {
        Self::with_script(|_| Ok(Vec::new()))
    }

    pub fn with_script<F>(script: F) -> Self
    where
        F: Fn(u64) -> ScanResult<Vec<RawDetection>> + Send + Sync + 'static,
    {
        Self {
            script: Box::new(script),
            calls: AtomicU64::new(0),
        }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(u64) -> Vec<RawDetection> + Send + Sync + 'static,
    {
        Self::with_script(move |n| Ok(pattern(n)))
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Default for ScriptedDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for ScriptedDetector {
    fn detect(&self, frame: &Frame, confidence_floor: f32) -> ScanResult<Vec<RawDetection>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let detections = (self.script)(frame.frame_number)?;
        Ok(detections
            .into_iter()
            .filter(|d| d.confidence >= confidence_floor)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedModel {
        names: Vec<String>,
        rows: Vec<ModelBox>,
    }

    impl ObjectModel for FixedModel {
        fn predict(&self, _frame: &Frame, _confidence_floor: f32) -> ScanResult<Vec<ModelBox>> {
            Ok(self.rows.clone())
        }

        fn class_names(&self) -> &[String] {
            &self.names
        }
    }

    struct BrokenModel;

    impl ObjectModel for BrokenModel {
        fn predict(&self, _frame: &Frame, _confidence_floor: f32) -> ScanResult<Vec<ModelBox>> {
            Err(ScanError::Detector("device lost".into()))
        }

        fn class_names(&self) -> &[String] {
            &[]
        }
    }

    fn frame(n: u64) -> Frame {
        Frame::new(2, 2, vec![0u8; 16], 0, n)
    }

    #[test]
    fn test_model_detector_maps_rows() {
        let detector = ModelDetector::new(FixedModel {
            names: vec!["normal".into(), "fake_logo".into()],
            rows: vec![
                ModelBox {
                    class_id: 1,
                    confidence: 0.92,
                    xyxy: Some([10.0, 20.0, 5.0, 20.0]),
                },
                ModelBox {
                    class_id: 0,
                    confidence: 0.4,
                    xyxy: None,
                },
                ModelBox {
                    class_id: 7,
                    confidence: 0.81,
                    xyxy: None,
                },
            ],
        });

        let detections = detector.detect(&frame(1), 0.5).unwrap();
        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].class_name, "fake_logo");
        // degenerate boxes pass through untouched
        assert_eq!(detections[0].bbox, Some(BBox::new(10.0, 20.0, 5.0, 20.0)));
        assert_eq!(detections[1].class_name, "class_7");
        assert!(detections[1].bbox.is_none());
    }

    #[test]
    fn test_model_errors_propagate() {
        let detector = ModelDetector::new(BrokenModel);
        assert!(matches!(
            detector.detect(&frame(1), 0.5),
            Err(ScanError::Detector(_))
        ));
    }

    #[test]
    fn test_normal_sentinel_is_case_insensitive() {
        assert!(RawDetection::new(0, "Normal", 0.9, None).is_normal());
        assert!(RawDetection::new(0, "NORMAL", 0.9, None).is_normal());
        assert!(!RawDetection::new(1, "abnormal", 0.9, None).is_normal());
    }

    #[test]
    fn test_scripted_detector() {
        let detector = ScriptedDetector::with_pattern(|n| {
            if n % 2 == 0 {
                vec![
                    RawDetection::new(1, "fraud", 0.9, None),
                    RawDetection::new(1, "fraud", 0.3, None),
                ]
            } else {
                vec![]
            }
        });

        assert_eq!(detector.detect(&frame(2), 0.5).unwrap().len(), 1);
        assert!(detector.detect(&frame(3), 0.5).unwrap().is_empty());
        assert_eq!(detector.calls(), 2);
    }

    #[test]
    fn test_model_info_verify() {
        let dir = tempfile::tempdir().unwrap();
        let weights = dir.path().join("best.onnx");

        let mut info = ModelInfo {
            id: 1,
            name: "fraud-yolo".into(),
            version: "v3".into(),
            weights_path: Some(weights.clone()),
        };
        assert!(matches!(info.verify(), Err(ScanError::ModelFileMissing(_))));

        std::fs::write(&weights, b"weights").unwrap();
        assert!(info.verify().is_ok());

        info.weights_path = None;
        assert!(info.verify().is_ok());
    }
}
