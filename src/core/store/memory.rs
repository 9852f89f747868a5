use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use log::debug;

use super::{
    BoundingBoxRecord, BoxId, DetectionRun, FrameId, FrameRecord, ImageRef, NewBoundingBox,
    NewRun, RunId, RunStore,
};
use crate::core::error::{ScanError, ScanResult};

#[derive(Default)]
struct Tables {
    runs: BTreeMap<RunId, DetectionRun>,
    frame_owner: HashMap<FrameId, RunId>,
    next_run: RunId,
    next_frame: FrameId,
    next_box: BoxId,
}

impl Tables {
    fn frame_mut(&mut self, frame_id: FrameId) -> Option<&mut FrameRecord> {
        let run_id = *self.frame_owner.get(&frame_id)?;
        self.runs
            .get_mut(&run_id)?
            .frames
            .iter_mut()
            .find(|f| f.id == frame_id)
    }
}

/// 内存版记录存储，测试与单机模式使用
#[derive(Default)]
pub struct InMemoryRunStore {
    tables: Mutex<Tables>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> ScanResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|e| ScanError::Storage(format!("run store lock poisoned: {}", e)))
    }

    pub fn list_runs(&self) -> ScanResult<Vec<DetectionRun>> {
        Ok(self.lock()?.runs.values().cloned().collect())
    }

    /// Removes a frame together with its bounding boxes.
    pub fn delete_frame(&self, frame_id: FrameId) -> ScanResult<bool> {
        let mut tables = self.lock()?;
        let Some(run_id) = tables.frame_owner.remove(&frame_id) else {
            return Ok(false);
        };
        if let Some(run) = tables.runs.get_mut(&run_id) {
            run.frames.retain(|f| f.id != frame_id);
        }
        Ok(true)
    }

    pub fn delete_run(&self, run_id: RunId) -> ScanResult<bool> {
        let mut tables = self.lock()?;
        let Some(run) = tables.runs.remove(&run_id) else {
            return Ok(false);
        };
        for frame in &run.frames {
            tables.frame_owner.remove(&frame.id);
        }
        Ok(true)
    }

    pub fn snapshot_json(&self) -> ScanResult<String> {
        let runs = self.list_runs()?;
        Ok(serde_json::to_string_pretty(&runs)?)
    }
}

impl RunStore for InMemoryRunStore {
    fn create_run(&self, run: NewRun) -> ScanResult<RunId> {
        let mut tables = self.lock()?;
        tables.next_run += 1;
        let id = tables.next_run;
        tables.runs.insert(
            id,
            DetectionRun {
                id,
                model_id: run.model_id,
                time_detect: run.time_detect,
                description: run.description,
                confidence_threshold: run.confidence_threshold,
                frame_skip: run.frame_skip,
                similarity_threshold: run.similarity_threshold,
                video_url: run.video_url,
                frames: Vec::new(),
            },
        );
        debug!("created run {}", id);
        Ok(id)
    }

    fn create_frame(&self, run_id: RunId, image: &ImageRef) -> ScanResult<FrameId> {
        let mut tables = self.lock()?;
        if !tables.runs.contains_key(&run_id) {
            return Err(ScanError::Storage(format!("run {} does not exist", run_id)));
        }
        tables.next_frame += 1;
        let id = tables.next_frame;
        tables.frame_owner.insert(id, run_id);
        if let Some(run) = tables.runs.get_mut(&run_id) {
            run.frames.push(FrameRecord {
                id,
                run_id,
                image_url: image.url.clone(),
                bounding_boxes: Vec::new(),
            });
        }
        Ok(id)
    }

    fn create_bounding_box(&self, frame_id: FrameId, bbox: NewBoundingBox) -> ScanResult<BoxId> {
        let mut tables = self.lock()?;
        let id = tables.next_box + 1;
        let frame = tables
            .frame_mut(frame_id)
            .ok_or_else(|| ScanError::Storage(format!("frame {} does not exist", frame_id)))?;
        frame.bounding_boxes.push(BoundingBoxRecord {
            id,
            frame_id,
            fraud_label: bbox.fraud_label,
            x_center: bbox.x_center,
            y_center: bbox.y_center,
            width: bbox.width,
            height: bbox.height,
            confidence: bbox.confidence,
        });
        tables.next_box = id;
        Ok(id)
    }

    fn update_run_description(&self, run_id: RunId, description: &str) -> ScanResult<()> {
        let mut tables = self.lock()?;
        let run = tables
            .runs
            .get_mut(&run_id)
            .ok_or_else(|| ScanError::Storage(format!("run {} does not exist", run_id)))?;
        run.description = description.to_string();
        Ok(())
    }

    fn get_run(&self, run_id: RunId) -> ScanResult<Option<DetectionRun>> {
        Ok(self.lock()?.runs.get(&run_id).cloned())
    }
}
