//! 扫描参数与服务配置

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{ScanError, ScanResult};

/// Per-run tuning, submitted together with the video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    #[serde(alias = "confidence_threshold", alias = "confidenceThreshold")]
    pub confidence_floor: f32,
    #[serde(alias = "frame_skip", alias = "frameSkip")]
    pub frame_stride: i64,
    #[serde(alias = "similarityThreshold")]
    pub similarity_threshold: f32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            confidence_floor: 0.8,
            frame_stride: 20,
            similarity_threshold: 0.75,
        }
    }
}

impl ScanConfig {
    pub fn from_json5_str(raw: &str) -> ScanResult<Self> {
        let config: Self =
            json5::from_str(raw).map_err(|e| ScanError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ScanResult<()> {
        if self.frame_stride < 1 {
            return Err(ScanError::InvalidConfig(format!(
                "frame_stride must be >= 1, got {}",
                self.frame_stride
            )));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(ScanError::InvalidConfig(format!(
                "confidence_floor must be within [0, 1], got {}",
                self.confidence_floor
            )));
        }
        if !(self.similarity_threshold > 0.0 && self.similarity_threshold <= 1.0) {
            return Err(ScanError::InvalidConfig(format!(
                "similarity_threshold must be within (0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Process-wide settings for the collaborators around the scan loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub storage_dir: PathBuf,
    pub public_base_url: String,
    pub label_service_url: Option<String>,
    pub label_api_key: Option<String>,
    pub label_cache_ttl_secs: u64,
    pub label_timeout_secs: u64,
    pub frames_fps: u32,
    pub progress_every: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("uploads"),
            public_base_url: "http://localhost:5000".to_string(),
            label_service_url: None,
            label_api_key: None,
            label_cache_ttl_secs: 3600,
            label_timeout_secs: 10,
            frames_fps: 30,
            progress_every: 100,
        }
    }
}

impl ServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("SCAN_STORAGE_DIR") {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("SCAN_PUBLIC_BASE_URL") {
            config.public_base_url = url;
        }
        config.label_service_url = lookup("FRAUD_LABEL_SERVICE_URL").filter(|v| !v.is_empty());
        config.label_api_key = lookup("FRAUD_LABEL_API_KEY").filter(|v| !v.is_empty());
        if let Some(ttl) = lookup("FRAUD_LABEL_CACHE_TTL").and_then(|v| v.parse().ok()) {
            config.label_cache_ttl_secs = ttl;
        }

        config
    }

    pub fn from_json5_str(raw: &str) -> ScanResult<Self> {
        json5::from_str(raw).map_err(|e| ScanError::InvalidConfig(e.to_string()))
    }

    pub fn from_file(path: &Path) -> ScanResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json5_str(&raw)
    }

    pub fn flagged_frames_dir(&self) -> PathBuf {
        self.storage_dir.join("flagged_frames")
    }
}
