pub mod config;
pub mod constants;
pub mod encoding;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod schema;
pub mod stages;

pub use config::{FileLayout, PipelineConfig};
pub use error::{ErrorKind, EtlError, Result};
