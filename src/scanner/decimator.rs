use std::num::NonZeroU64;

use crate::core::error::{ScanError, ScanResult};

/// Picks which frames get inferred: those whose 1-based ordinal is a multiple of the stride.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecimator {
    stride: NonZeroU64,
}

impl FrameDecimator {
    pub fn new(stride: i64) -> ScanResult<Self> {
        u64::try_from(stride)
            .ok()
            .and_then(NonZeroU64::new)
            .map(|stride| Self { stride })
            .ok_or_else(|| {
                ScanError::InvalidConfig(format!("frame_stride must be >= 1, got {}", stride))
            })
    }

    pub fn stride(&self) -> u64 {
        self.stride.get()
    }

    pub fn is_eligible(&self, counter: u64) -> bool {
        counter % self.stride.get() == 0
    }
}
