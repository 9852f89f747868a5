pub mod frame;
pub mod source;

pub use frame::{Frame, RawFrame};
pub use source::{FrameDirSource, MemorySource, VideoHandle, VideoInfo, VideoSource};
