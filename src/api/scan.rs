//! 视频异常扫描入口

use std::path::Path;

use log::info;

use crate::api::models::scan::{ScanReport, ScanRequest};
use crate::core::config::ServiceConfig;
use crate::core::error::ScanResult;
use crate::core::labels::{resolver_from_config, LabelResolver};
use crate::core::store::{FileImageStore, ImageStore, InMemoryRunStore, RunStore};
use crate::core::video::{FrameDirSource, VideoSource};
use crate::scanner::{Detector, ScanContext, ScanController};

/// 视频扫描器 - 持有落库、截图存储与标签解析
///
/// 每次 `run_scan` 都创建独立的控制器，同一个扫描器可被多个线程共享。
pub struct VideoScanner {
    runs: Box<dyn RunStore>,
    images: Box<dyn ImageStore>,
    labels: Box<dyn LabelResolver>,
    config: ServiceConfig,
}

impl VideoScanner {
    pub fn new(
        runs: Box<dyn RunStore>,
        images: Box<dyn ImageStore>,
        labels: Box<dyn LabelResolver>,
        config: ServiceConfig,
    ) -> Self {
        crate::init_logging();
        info!("🎬 VideoScanner: created");
        Self {
            runs,
            images,
            labels,
            config,
        }
    }

    /// Flagged frames on disk, labels from the configured service, runs kept in memory.
    pub fn from_config(config: ServiceConfig) -> ScanResult<Self> {
        let images = FileImageStore::from_config(&config)?;
        let labels = resolver_from_config(&config);
        Ok(Self::new(
            Box::new(InMemoryRunStore::new()),
            Box::new(images),
            labels,
            config,
        ))
    }

    /// Scan one already opened video. Configuration and model are checked before any
    /// frame is read; the source is released whatever the result.
    pub fn run_scan<S: VideoSource>(
        &self,
        request: &ScanRequest,
        source: S,
        detector: &dyn Detector,
    ) -> ScanResult<ScanReport> {
        Self::check_request(request)?;
        self.scan_source(request, source, detector)
    }

    /// Scan a directory of extracted frames played back at the configured frame rate.
    pub fn scan_frame_dir(
        &self,
        request: &ScanRequest,
        dir: &Path,
        detector: &dyn Detector,
    ) -> ScanResult<ScanReport> {
        Self::check_request(request)?;
        let source = FrameDirSource::open(dir, self.config.frames_fps)?;
        self.scan_source(request, source, detector)
    }

    fn check_request(request: &ScanRequest) -> ScanResult<()> {
        request.config.validate()?;
        request.model.verify()
    }

    fn scan_source<S: VideoSource>(
        &self,
        request: &ScanRequest,
        source: S,
        detector: &dyn Detector,
    ) -> ScanResult<ScanReport> {
        info!(
            "🔍 Scanning {} with model {} {}",
            source.info().filename,
            request.model.name,
            request.model.version
        );

        let ctx = ScanContext {
            detector,
            labels: self.labels.as_ref(),
            store: self.runs.as_ref(),
            images: self.images.as_ref(),
        };
        let mut controller = ScanController::new(request.config.clone(), ctx)?
            .with_progress_every(self.config.progress_every);
        let outcome = controller.scan(source, request.model.id, request.video_url.clone())?;

        Ok(ScanReport::new(&outcome, &request.config, &request.model))
    }

    pub fn runs(&self) -> &dyn RunStore {
        self.runs.as_ref()
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

impl Drop for VideoScanner {
    fn drop(&mut self) {
        info!("🗑️ VideoScanner: released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ScanError;
    use crate::core::labels::CatalogLabelResolver;
    use crate::core::store::MemoryImageStore;
    use crate::core::video::MemorySource;
    use crate::core::ScanConfig;
    use crate::scanner::{BBox, ModelInfo, RawDetection, ScriptedDetector};
    use image::{Rgb, RgbImage};

    fn memory_scanner() -> VideoScanner {
        VideoScanner::new(
            Box::new(InMemoryRunStore::new()),
            Box::new(MemoryImageStore::new()),
            Box::new(CatalogLabelResolver::with_defaults()),
            ServiceConfig::default(),
        )
    }

    fn request(stride: i64) -> ScanRequest {
        ScanRequest {
            model: ModelInfo {
                id: 9,
                name: "fraud-yolo".into(),
                version: "v1".into(),
                weights_path: None,
            },
            config: ScanConfig {
                frame_stride: stride,
                ..ScanConfig::default()
            },
            video_url: Some("http://localhost:5000/uploads/videos/a.mp4".into()),
        }
    }

    fn logo(x: f32) -> RawDetection {
        RawDetection::new(0, "fake_logo", 0.92, Some(BBox::new(x, 10.0, x + 80.0, 90.0)))
    }

    #[test]
    fn test_run_scan_report() {
        let scanner = memory_scanner();
        let detector = ScriptedDetector::with_pattern(|n| match n {
            20 | 40 => vec![logo(10.0)],
            60 => vec![logo(400.0)],
            _ => vec![],
        });

        let report = scanner
            .run_scan(
                &request(20),
                MemorySource::blank("a.mp4", 100, 4, 4, 25),
                &detector,
            )
            .unwrap();

        assert_eq!(report.video_info.total_frames, 100);
        assert_eq!(report.video_info.duration_seconds, 4.0);
        assert_eq!(report.processing_info.processed_frames, 5);
        assert_eq!(report.processing_info.saved_frames, 2);
        // frame 40 repeats frame 20, frame 100 repeats the empty frame 80
        assert_eq!(report.processing_info.skipped_duplicates, 2);
        assert_eq!(report.model_info.id, 9);

        let run = scanner.runs().get_run(report.run_id).unwrap().unwrap();
        assert_eq!(run.frames.len(), 2);
        assert_eq!(
            run.frames[0].bounding_boxes[0]
                .fraud_label
                .as_ref()
                .map(|l| l.name.as_str()),
            Some("Fake Logo")
        );
        assert_eq!(run.video_url.as_deref(), Some("http://localhost:5000/uploads/videos/a.mp4"));
        assert!(run.description.starts_with("Smart video detection: a.mp4 - Processed 5/100"));
    }

    #[test]
    fn test_missing_model_rejected_before_scan() {
        let scanner = memory_scanner();
        let detector = ScriptedDetector::new();
        let mut req = request(20);
        req.model.weights_path = Some("/nonexistent/weights.onnx".into());

        let err = scanner
            .run_scan(&req, MemorySource::blank("a.mp4", 10, 2, 2, 30), &detector)
            .unwrap_err();
        assert!(matches!(err, ScanError::ModelFileMissing(_)));
        assert_eq!(detector.calls(), 0);
        assert!(scanner.runs().get_run(1).unwrap().is_none());
    }

    #[test]
    fn test_invalid_stride_rejected() {
        let scanner = memory_scanner();
        let detector = ScriptedDetector::new();
        let err = scanner
            .run_scan(&request(-5), MemorySource::blank("a.mp4", 10, 2, 2, 30), &detector)
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(scanner.runs().get_run(1).unwrap().is_none());
    }

    #[test]
    fn test_scan_frame_dir_writes_flagged_jpegs() {
        let frames = tempfile::tempdir().unwrap();
        for i in 1..=4 {
            RgbImage::from_pixel(32, 24, Rgb([i * 40, 0, 0]))
                .save(frames.path().join(format!("{:03}.png", i)))
                .unwrap();
        }
        let storage = tempfile::tempdir().unwrap();
        let config = ServiceConfig {
            storage_dir: storage.path().join("uploads"),
            ..ServiceConfig::default()
        };
        let scanner = VideoScanner::from_config(config).unwrap();

        let detector = ScriptedDetector::with_pattern(|n| {
            if n == 2 {
                vec![logo(0.0)]
            } else {
                vec![]
            }
        });
        let report = scanner
            .scan_frame_dir(&request(2), frames.path(), &detector)
            .unwrap();
        assert_eq!(report.processing_info.saved_frames, 1);

        let run = scanner.runs().get_run(report.run_id).unwrap().unwrap();
        let url = &run.frames[0].image_url;
        assert!(url.starts_with("http://localhost:5000/uploads/flagged_frames/frame_2_"));

        let written: Vec<_> = std::fs::read_dir(storage.path().join("uploads/flagged_frames"))
            .unwrap()
            .collect();
        assert_eq!(written.len(), 1);
    }

    #[test]
    fn test_scan_frame_dir_checks_request_before_opening() {
        let scanner = memory_scanner();
        let err = scanner
            .scan_frame_dir(&request(0), Path::new("/nonexistent/frames"), &ScriptedDetector::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::InvalidConfig(_)));
    }

    #[test]
    fn test_scan_frame_dir_missing_dir() {
        let scanner = memory_scanner();
        let err = scanner
            .scan_frame_dir(&request(1), Path::new("/nonexistent/frames"), &ScriptedDetector::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::VideoOpen { .. }));
    }
}
