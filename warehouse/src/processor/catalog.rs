use super::config::ProcessorOptions;
use super::shard::Sharded;
use crate::models::{Artist, CatalogRecord, CoercedRecord, CoercionIssue, Song};
use crate::schema::{SourceSchema, get_source_schema};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogReport {
    pub records: usize,
    pub songs: usize,
    pub artists: usize,
    /// Values set to null because they did not fit their column, per field.
    pub coercion_warnings: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct CatalogOutput {
    pub songs: Vec<Song>,
    pub artists: Vec<Artist>,
    pub report: CatalogReport,
}

/// Derives the songs and artists dimensions from song metadata records.
pub struct CatalogTransformer {
    options: ProcessorOptions,
}

impl CatalogTransformer {
    pub fn new(options: ProcessorOptions) -> Self {
        Self { options }
    }

    pub fn transform(&self, records: Sharded<Value>) -> CatalogOutput {
        let shard_count = self.options.shard_count;
        let schema = get_source_schema(SourceSchema::SongData);

        let coerced = records.map(|value| CoercedRecord::from_json(schema.clone(), &value));
        let coercion_warnings = tally_issues(coerced.shards().iter().flatten().flat_map(|r| r.issues()));
        log_issues("song_data", &coercion_warnings);

        let catalog = coerced.map(|record| CatalogRecord::from_coerced(&record));
        let records = catalog.len();

        let songs = catalog.clone().map(|r| r.song()).distinct(shard_count).into_vec();
        let artists = catalog.map(|r| r.artist()).distinct(shard_count).into_vec();

        let report = CatalogReport {
            records,
            songs: songs.len(),
            artists: artists.len(),
            coercion_warnings,
        };
        info!(
            records = report.records,
            songs = report.songs,
            artists = report.artists,
            "Song data transformed"
        );

        CatalogOutput {
            songs,
            artists,
            report,
        }
    }
}

pub(crate) fn tally_issues<'a>(
    issues: impl Iterator<Item = &'a CoercionIssue>,
) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for issue in issues {
        *counts.entry(issue.field.clone()).or_insert(0) += 1;
    }
    counts
}

pub(crate) fn log_issues(source: &str, counts: &BTreeMap<String, usize>) {
    for (field, count) in counts {
        warn!(
            source,
            field = %field,
            count,
            "Values did not match the declared column type and were read as null"
        );
    }
}
