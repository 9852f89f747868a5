//! 视频异常检测扫描核心
//!
//! 处理流程：
//! 1. 按步长抽帧 - 只有 counter % stride == 0 的帧进入检测
//! 2. 相邻采样帧相似则跳过，不落库
//! 3. 过滤 normal 类别，解析告警标签
//! 4. 与最近一次保存结果相同则跳过
//! 5. 保存截图、帧记录与检测框

pub mod controller;
pub mod decimator;
pub mod detector;
pub mod geometry;
pub mod similarity;
pub mod state_machine;

pub use controller::{FrameOutcome, ScanContext, ScanController, ScanOutcome, ScanStats};
pub use decimator::FrameDecimator;
pub use detector::{
    Detector, ModelBox, ModelDetector, ModelInfo, ObjectModel, RawDetection, ScriptedDetector,
    NORMAL_CLASS,
};
pub use geometry::{iou, BBox};
pub use similarity::{frames_similar, results_same, BoxRegion, ResultEntry, SavedHistory};
pub use state_machine::{ScanEvent, ScanState, StateMachine};
