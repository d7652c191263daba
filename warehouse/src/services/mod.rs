pub mod pipeline;

pub use pipeline::{LogDataReport, PipelineService, RunReport, SongDataReport};
