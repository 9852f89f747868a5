pub mod config;
pub mod error;
pub mod labels;
pub mod store;
pub mod video;

pub use config::{ScanConfig, ServiceConfig};
pub use error::{ScanError, ScanResult};
