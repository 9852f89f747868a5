//! 相似度判定 - 相邻采样帧比较 + 与最近一次保存结果比较

use std::cmp::Ordering;
use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::detector::RawDetection;
use super::geometry::{iou, BBox};
use crate::core::labels::FraudLabel;
use crate::core::store::NewBoundingBox;

/// Confidence tolerance for the saved-result comparison. Not tunable.
pub const SAME_CONFIDENCE_TOLERANCE: f32 = 0.05;
/// Minimum IoU for the saved-result comparison. Not tunable.
pub const SAME_MIN_IOU: f32 = 0.90;
pub const SAVED_HISTORY_CAPACITY: usize = 10;

/// Box as stored: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl From<BBox> for BoxRegion {
    fn from(b: BBox) -> Self {
        Self {
            x: b.x1,
            y: b.y1,
            width: b.x2 - b.x1,
            height: b.y2 - b.y1,
        }
    }
}

/// An abnormal detection that survived filtering, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub label: Option<FraudLabel>,
    pub region: Option<BoxRegion>,
}

impl ResultEntry {
    pub fn from_detection(det: &RawDetection, label: Option<FraudLabel>) -> Self {
        Self {
            class_id: det.class_id,
            class_name: det.class_name.clone(),
            confidence: det.confidence,
            label,
            region: det.bbox.map(BoxRegion::from),
        }
    }

    /// Missing regions compare as an all-zero box.
    pub fn comparison_box(&self) -> BBox {
        self.region
            .map(|r| BBox::from_xywh(r.x, r.y, r.width, r.height))
            .unwrap_or(BBox::new(0.0, 0.0, 0.0, 0.0))
    }

    pub fn to_new_box(&self) -> NewBoundingBox {
        let r = self.region.unwrap_or(BoxRegion {
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
        });
        NewBoundingBox {
            fraud_label: self.label.clone(),
            x_center: r.x,
            y_center: r.y,
            width: r.width,
            height: r.height,
            confidence: self.confidence,
        }
    }
}

fn by_confidence(a: f32, b: f32) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}

/// Class id ascending, confidence descending.
fn sorted_raw(dets: &[RawDetection]) -> Vec<&RawDetection> {
    let mut sorted: Vec<&RawDetection> = dets.iter().collect();
    sorted.sort_by(|a, b| {
        a.class_id
            .cmp(&b.class_id)
            .then_with(|| by_confidence(b.confidence, a.confidence))
    });
    sorted
}

/// Class id ascending, confidence ascending.
fn sorted_entries(entries: &[ResultEntry]) -> Vec<&ResultEntry> {
    let mut sorted: Vec<&ResultEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| {
        a.class_id
            .cmp(&b.class_id)
            .then_with(|| by_confidence(a.confidence, b.confidence))
    });
    sorted
}

/// Did nothing visibly change between two consecutive sampled frames?
///
/// Works on raw detections, benign classes included. Pairs are matched after sorting by
/// class id ascending then confidence descending.
pub fn frames_similar(prev: &[RawDetection], curr: &[RawDetection], threshold: f32) -> bool {
    if prev.len() != curr.len() {
        return false;
    }
    if prev.is_empty() {
        return true;
    }

    let max_conf_diff = 1.0 - threshold;
    sorted_raw(prev).iter().zip(sorted_raw(curr).iter()).all(|(p, c)| {
        if p.class_id != c.class_id {
            return false;
        }
        if (p.confidence - c.confidence).abs() > max_conf_diff {
            return false;
        }
        match (&p.bbox, &c.bbox) {
            (Some(pb), Some(cb)) => pb.iou(cb) >= threshold,
            _ => true,
        }
    })
}

/// Is the filtered result about to be saved identical to a previously saved one?
///
/// Pairs are matched after sorting by class id then confidence, both ascending.
pub fn results_same(saved: &[ResultEntry], curr: &[ResultEntry]) -> bool {
    if saved.len() != curr.len() {
        return false;
    }

    sorted_entries(saved).iter().zip(sorted_entries(curr).iter()).all(|(s, c)| {
        s.class_id == c.class_id
            && (s.confidence - c.confidence).abs() <= SAME_CONFIDENCE_TOLERANCE
            && iou(&s.comparison_box(), &c.comparison_box()) >= SAME_MIN_IOU
    })
}

/// 最近保存的结果集，最多保留 10 组
#[derive(Debug, Default)]
pub struct SavedHistory {
    entries: VecDeque<Vec<ResultEntry>>,
}

impl SavedHistory {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::with_capacity(SAVED_HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, results: Vec<ResultEntry>) {
        if self.entries.len() == SAVED_HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(results);
    }

    pub fn last(&self) -> Option<&[ResultEntry]> {
        self.entries.back().map(Vec::as_slice)
    }

    pub fn is_consecutive_duplicate(&self, results: &[ResultEntry]) -> bool {
        self.last()
            .map(|last| results_same(last, results))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
