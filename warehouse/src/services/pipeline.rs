use crate::models::{Artist, Song, TableRow, TimeRow};
use crate::processor::{
    ActivityReport, ActivityTransformer, CatalogReport, CatalogTransformer, FactBuilder,
    FactReport, ParquetTableRegistry, ProcessorOptions,
};
use crate::storage::{
    GlobPattern, JsonLinesReader, PartitionedWriter, RecordReader, StorageLocation,
    StorageManager, TableWriter, WriteSummary,
};
use common::config::{PipelineSettings, Settings};
use common::{Error, Result};
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct SongDataReport {
    pub catalog: CatalogReport,
    pub writes: Vec<WriteSummary>,
}

#[derive(Debug, Clone)]
pub struct LogDataReport {
    pub activity: ActivityReport,
    pub facts: FactReport,
    pub writes: Vec<WriteSummary>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub song_data: SongDataReport,
    pub log_data: LogDataReport,
}

/// Runs the two phases of the warehouse build: song data into songs and
/// artists, then log data into users, time and songplays.
pub struct PipelineService {
    input: StorageLocation,
    output: StorageLocation,
    reader: Box<dyn RecordReader>,
    writer: Box<dyn TableWriter>,
    options: ProcessorOptions,
    song_data_pattern: GlobPattern,
    log_data_pattern: GlobPattern,
}

impl PipelineService {
    pub fn new(settings: &Settings) -> Result<Self> {
        let storage = StorageManager::new(settings);
        let input = storage.location(&settings.storage.input_url)?;
        let output = storage.location(&settings.storage.output_url)?;
        Self::with_storage(&settings.pipeline, input, output)
    }

    pub fn with_storage(
        pipeline: &PipelineSettings,
        input: StorageLocation,
        output: StorageLocation,
    ) -> Result<Self> {
        Ok(Self {
            input,
            output,
            reader: Box::new(JsonLinesReader::new(pipeline.read_concurrency)),
            writer: Box::new(PartitionedWriter::new(pipeline.max_rows_per_file)),
            options: ProcessorOptions::from_settings(pipeline)?,
            song_data_pattern: GlobPattern::new(&pipeline.song_data_pattern)?,
            log_data_pattern: GlobPattern::new(&pipeline.log_data_pattern)?,
        })
    }

    pub fn output(&self) -> &StorageLocation {
        &self.output
    }

    pub async fn run(&self) -> Result<RunReport> {
        let song_data = self.process_song_data().await?;
        let log_data = self.process_log_data().await?;
        Ok(RunReport {
            song_data,
            log_data,
        })
    }

    pub async fn process_song_data(&self) -> Result<SongDataReport> {
        let started = Instant::now();
        info!(input = %self.input.url(), pattern = self.song_data_pattern.as_str(), "Processing song data");

        let records = self.reader.read(&self.input, &self.song_data_pattern).await?;
        let options = self.options;
        let catalog = run_blocking(move || CatalogTransformer::new(options).transform(records)).await?;

        let writes = vec![
            self.write_table(&catalog.songs).await?,
            self.write_table(&catalog.artists).await?,
        ];

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Song data phase complete");
        Ok(SongDataReport {
            catalog: catalog.report,
            writes,
        })
    }

    pub async fn process_log_data(&self) -> Result<LogDataReport> {
        let started = Instant::now();
        info!(input = %self.input.url(), pattern = self.log_data_pattern.as_str(), "Processing log data");

        let records = self.reader.read(&self.input, &self.log_data_pattern).await?;
        let options = self.options;
        let activity = run_blocking(move || ActivityTransformer::new(options).transform(records)).await?;

        let mut writes = vec![
            self.write_table(&activity.users).await?,
            self.write_table(&activity.time).await?,
        ];

        let registry = ParquetTableRegistry::new(self.output.clone())?;
        let songs = registry.read_rows::<Song>().await?;
        let artists = registry.read_rows::<Artist>().await?;
        let time = registry.read_rows::<TimeRow>().await?;
        if songs.is_empty() {
            warn!(output = %self.output.url(), "No songs found; every songplay will be unmatched");
        }

        let events = activity.events;
        let facts =
            run_blocking(move || FactBuilder::new(options).build(events, songs, artists, time))
                .await??;

        writes.push(self.write_table(&facts.songplays).await?);

        info!(elapsed_ms = started.elapsed().as_millis() as u64, "Log data phase complete");
        Ok(LogDataReport {
            activity: activity.report,
            facts: facts.report,
            writes,
        })
    }

    async fn write_table<T: TableRow>(&self, rows: &[T]) -> Result<WriteSummary> {
        let batch = T::to_record_batch(rows)?;
        self.writer.write(T::TABLE, batch, &self.output).await
    }
}

/// Runs CPU-bound shard work off the async runtime.
async fn run_blocking<F, R>(f: F) -> Result<R>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Other(format!("Transform task failed: {}", e)))
}
