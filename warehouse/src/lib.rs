pub mod models;
pub mod processor;
pub mod schema;
pub mod services;
pub mod storage;
pub mod utils;

pub use services::PipelineService;
