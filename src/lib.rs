pub mod acquisition;
pub mod config;
pub mod error;
pub mod feedback;
pub mod live;
pub mod model;
pub mod processing;
pub mod recording;
pub mod training;
pub mod utils;
pub mod visualization;

pub use error::{PipelineError, Result};
