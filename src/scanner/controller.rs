//! 扫描控制器 - 抽帧、检测、两级相似度去重、落库
//!
//! 每个实例只服务一次检测任务，运行期状态（上一采样帧的原始检测、最近保存的结果集）
//! 全部由实例独占，多路并发扫描各自创建实例即可。

use chrono::Utc;
use log::{debug, error, info};
use serde::Serialize;

use super::decimator::FrameDecimator;
use super::detector::{Detector, RawDetection};
use super::similarity::{frames_similar, ResultEntry, SavedHistory};
use super::state_machine::{ScanState, StateMachine};
use crate::core::config::ScanConfig;
use crate::core::error::{ScanError, ScanResult};
use crate::core::labels::LabelResolver;
use crate::core::store::{FrameId, ImageStore, NewRun, RunId, RunStore};
use crate::core::video::{Frame, VideoHandle, VideoInfo, VideoSource};

const DEFAULT_PROGRESS_EVERY: u64 = 100;

/// Collaborators a scan calls into.
#[derive(Clone, Copy)]
pub struct ScanContext<'a> {
    pub detector: &'a dyn Detector,
    pub labels: &'a dyn LabelResolver,
    pub store: &'a dyn RunStore,
    pub images: &'a dyn ImageStore,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    NotSampled,
    FrameSimilar,
    NoAbnormal,
    ConsecutiveDuplicate,
    Saved { frame_id: FrameId, boxes: usize },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanStats {
    pub frame_count: u64,
    pub processed_frames: u64,
    pub total_detections: u64,
    pub saved_frames: u64,
    pub saved_detections: u64,
    /// objects, not frames
    pub skipped_normal: u64,
    pub skipped_duplicates: u64,
    pub skipped_consecutive: u64,
}

impl ScanStats {
    pub fn duplicate_ratio(&self) -> f64 {
        if self.processed_frames == 0 {
            0.0
        } else {
            self.skipped_duplicates as f64 / self.processed_frames as f64
        }
    }

    pub fn describe(&self, video: &VideoInfo) -> String {
        format!(
            "Smart video detection: {} - Processed {}/{} frames, found {} objects, \
             saved {} abnormal objects, skipped {} normal objects, \
             skipped {} duplicate frames, skipped {} consecutive similar frames",
            video.filename,
            self.processed_frames,
            video.total_frames,
            self.total_detections,
            self.saved_detections,
            self.skipped_normal,
            self.skipped_duplicates,
            self.skipped_consecutive
        )
    }
}

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub run_id: RunId,
    pub video: VideoInfo,
    pub stats: ScanStats,
}

pub struct ScanController<'a> {
    config: ScanConfig,
    decimator: FrameDecimator,
    ctx: ScanContext<'a>,
    state: StateMachine,
    run_id: Option<RunId>,
    previous_raw: Vec<RawDetection>,
    history: SavedHistory,
    frame_counter: u64,
    stats: ScanStats,
    progress_every: u64,
}

impl<'a> ScanController<'a> {
    pub fn new(config: ScanConfig, ctx: ScanContext<'a>) -> ScanResult<Self> {
        config.validate()?;
        let decimator = FrameDecimator::new(config.frame_stride)?;
        Ok(Self {
            config,
            decimator,
            ctx,
            state: StateMachine::new(),
            run_id: None,
            previous_raw: Vec::new(),
            history: SavedHistory::new(),
            frame_counter: 0,
            stats: ScanStats::default(),
            progress_every: DEFAULT_PROGRESS_EVERY,
        })
    }

    pub fn with_progress_every(mut self, every: u64) -> Self {
        self.progress_every = every.max(1);
        self
    }

    /// Drives a whole video: creates the run record, feeds every frame, writes the summary.
    /// The video handle is released on every exit path.
    pub fn scan<S: VideoSource>(
        &mut self,
        source: S,
        model_id: i64,
        video_url: Option<String>,
    ) -> ScanResult<ScanOutcome> {
        let mut video = VideoHandle::new(source);
        let info = video.info().clone();

        let run_id = self.begin(NewRun {
            model_id,
            time_detect: Utc::now(),
            description: format!(
                "Smart video detection: {} - {} frames, FPS: {}",
                info.filename, info.total_frames, info.fps
            ),
            confidence_threshold: self.config.confidence_floor,
            frame_skip: self.config.frame_stride,
            similarity_threshold: self.config.similarity_threshold,
            video_url,
        })?;

        loop {
            let frame = match video.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    self.abort(&e);
                    return Err(e);
                }
            };
            self.process_frame(&frame)?;
        }
        drop(video);

        let stats = self.finish(&info)?;
        Ok(ScanOutcome {
            run_id,
            video: info,
            stats,
        })
    }

    pub fn begin(&mut self, run: NewRun) -> ScanResult<RunId> {
        if *self.state.current_state() != ScanState::Idle {
            return Err(ScanError::InvalidState(
                "scan controller is single-use".to_string(),
            ));
        }

        let run_id = match self.ctx.store.create_run(run) {
            Ok(id) => id,
            Err(e) => {
                self.abort(&e);
                return Err(e);
            }
        };
        self.state.start()?;
        self.run_id = Some(run_id);
        self.previous_raw.clear();
        self.history.clear();
        self.frame_counter = 0;
        self.stats = ScanStats::default();

        info!(
            "🚀 Run {} started (stride {}, floor {:.2}, similarity {:.2})",
            run_id,
            self.decimator.stride(),
            self.config.confidence_floor,
            self.config.similarity_threshold
        );
        Ok(run_id)
    }

    pub fn process_frame(&mut self, frame: &Frame) -> ScanResult<FrameOutcome> {
        let run_id = match (self.state.is_running(), self.run_id) {
            (true, Some(id)) => id,
            _ => {
                return Err(ScanError::InvalidState(format!(
                    "cannot process frames while {:?}",
                    self.state.current_state()
                )))
            }
        };

        match self.step(run_id, frame) {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.abort(&e);
                Err(e)
            }
        }
    }

    fn step(&mut self, run_id: RunId, frame: &Frame) -> ScanResult<FrameOutcome> {
        self.frame_counter += 1;
        self.stats.frame_count = self.frame_counter;
        if !self.decimator.is_eligible(self.frame_counter) {
            return Ok(FrameOutcome::NotSampled);
        }

        self.stats.processed_frames += 1;
        if self.stats.processed_frames % self.progress_every == 0 {
            self.log_progress();
        }

        let raw = self
            .ctx
            .detector
            .detect(frame, self.config.confidence_floor)?;
        self.stats.total_detections += raw.len() as u64;

        // previous_raw stays untouched: a similar frame counts as "nothing happened"
        if frames_similar(&self.previous_raw, &raw, self.config.similarity_threshold) {
            self.stats.skipped_duplicates += 1;
            debug!("frame {}: similar to previous sample", self.frame_counter);
            return Ok(FrameOutcome::FrameSimilar);
        }

        let filtered: Vec<ResultEntry> = raw
            .iter()
            .filter(|d| !d.is_normal())
            .map(|d| ResultEntry::from_detection(d, self.ctx.labels.resolve(d.class_id)))
            .collect();
        self.stats.skipped_normal += (raw.len() - filtered.len()) as u64;

        if filtered.is_empty() {
            self.previous_raw = raw;
            return Ok(FrameOutcome::NoAbnormal);
        }

        if self.history.is_consecutive_duplicate(&filtered) {
            self.stats.skipped_consecutive += 1;
            debug!("frame {}: same as last saved result", self.frame_counter);
            self.previous_raw = raw;
            return Ok(FrameOutcome::ConsecutiveDuplicate);
        }

        let image = self
            .ctx
            .images
            .save_frame_image(frame, self.frame_counter)?;
        let frame_id = self.ctx.store.create_frame(run_id, &image)?;
        for entry in &filtered {
            self.ctx
                .store
                .create_bounding_box(frame_id, entry.to_new_box())?;
        }

        let boxes = filtered.len();
        self.stats.saved_frames += 1;
        self.stats.saved_detections += boxes as u64;
        debug!(
            "💾 frame {}: saved {} abnormal objects as frame record {}",
            self.frame_counter, boxes, frame_id
        );

        self.history.push(filtered);
        self.previous_raw = raw;
        Ok(FrameOutcome::Saved { frame_id, boxes })
    }

    /// End of stream: record the summary on the run and mark it completed.
    pub fn finish(&mut self, video: &VideoInfo) -> ScanResult<ScanStats> {
        let run_id = match (self.state.is_running(), self.run_id) {
            (true, Some(id)) => id,
            _ => {
                return Err(ScanError::InvalidState(format!(
                    "cannot finish while {:?}",
                    self.state.current_state()
                )))
            }
        };

        let description = self.stats.describe(video);
        if let Err(e) = self.ctx.store.update_run_description(run_id, &description) {
            self.abort(&e);
            return Err(e);
        }
        self.state.complete()?;

        info!("✅ Run {} completed: {}", run_id, description);
        Ok(self.stats.clone())
    }

    fn abort(&mut self, err: &ScanError) {
        error!(
            "❌ Run {:?} aborted at frame {}: {}",
            self.run_id, self.frame_counter, err
        );
        if !self.state.current_state().is_terminal() {
            let _ = self.state.fail(&err.to_string());
        }
    }

    fn log_progress(&self) {
        info!(
            "📊 Processed {} frames, saved {} detections, skipped {} normal objects, \
             skipped {} duplicates, skipped {} consecutive similar frames",
            self.stats.processed_frames,
            self.stats.saved_detections,
            self.stats.skipped_normal,
            self.stats.skipped_duplicates,
            self.stats.skipped_consecutive
        );
    }

    pub fn state(&self) -> &ScanState {
        self.state.current_state()
    }

    pub fn stats(&self) -> &ScanStats {
        &self.stats
    }

    pub fn run_id(&self) -> Option<RunId> {
        self.run_id
    }

    pub fn saved_history_len(&self) -> usize {
        self.history.len()
    }
}
