use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Invalid scan configuration: {0}")]
    InvalidConfig(String),
    #[error("Cannot open video {path:?}: {reason}")]
    VideoOpen { path: PathBuf, reason: String },
    #[error("Frame decode failed: {0}")]
    FrameDecode(String),
    #[error("Model file not found: {0:?}")]
    ModelFileMissing(PathBuf),
    #[error("Detector failed: {0}")]
    Detector(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Invalid scan state: {0}")]
    InvalidState(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ScanError {
    /// Errors raised before the scan loop starts; nothing has been persisted.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ScanError::InvalidConfig(_) | ScanError::VideoOpen { .. } | ScanError::ModelFileMissing(_)
        )
    }
}

pub type ScanResult<T> = Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(ScanError::InvalidConfig("stride".into()).is_configuration());
        assert!(ScanError::ModelFileMissing(PathBuf::from("best.pt")).is_configuration());
        assert!(ScanError::VideoOpen {
            path: PathBuf::from("a.mp4"),
            reason: "missing".into(),
        }
        .is_configuration());

        assert!(!ScanError::Detector("cuda oom".into()).is_configuration());
        assert!(!ScanError::Storage("disk full".into()).is_configuration());
    }

    #[test]
    fn test_error_messages() {
        let err = ScanError::Detector("boom".into());
        assert_eq!(err.to_string(), "Detector failed: boom");

        let err = ScanError::InvalidConfig("frame_stride must be >= 1, got 0".into());
        assert!(err.to_string().contains("frame_stride"));
    }
}
