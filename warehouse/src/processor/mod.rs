pub mod activity;
pub mod catalog;
pub mod config;
pub mod facts;
pub mod shard;
mod table;

pub use activity::{ActivityOutput, ActivityReport, ActivityTransformer, time_row};
pub use catalog::{CatalogOutput, CatalogReport, CatalogTransformer};
pub use config::ProcessorOptions;
pub use facts::{FactBuilder, FactOutput, FactReport, surrogate_id};
pub use shard::{JoinKind, Sharded};
pub use table::{ParquetTableRegistry, TableRegistry};
