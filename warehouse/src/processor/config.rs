use common::config::{JoinKeyNormalization, PipelineSettings, UserDedupPolicy, WeekdayConvention};
use common::{Error, Result};

/// Knobs shared by the transformers and the fact builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorOptions {
    pub shard_count: usize,
    pub weekday_convention: WeekdayConvention,
    pub user_dedup: UserDedupPolicy,
    pub join_normalization: JoinKeyNormalization,
}

impl ProcessorOptions {
    pub fn from_settings(settings: &PipelineSettings) -> Result<Self> {
        if settings.shard_count == 0 {
            return Err(Error::InvalidInput(
                "pipeline.shard_count must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            shard_count: settings.shard_count,
            weekday_convention: settings.weekday_convention,
            user_dedup: settings.user_dedup,
            join_normalization: settings.join_normalization,
        })
    }

    pub fn with_shard_count(mut self, shard_count: usize) -> Self {
        self.shard_count = shard_count.max(1);
        self
    }
}

impl Default for ProcessorOptions {
    fn default() -> Self {
        Self {
            shard_count: 4,
            weekday_convention: WeekdayConvention::default(),
            user_dedup: UserDedupPolicy::default(),
            join_normalization: JoinKeyNormalization::default(),
        }
    }
}
