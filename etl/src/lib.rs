use anyhow::{Context, Result};
use common::config::{LogFormat, LoggingSettings, Settings};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use warehouse::PipelineService;

/// Which part of the warehouse build to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Song data, then log data.
    All,
    SongData,
    LogData,
}

impl Phase {
    pub fn from_subcommand(name: &str) -> Option<Self> {
        match name {
            "etl" => Some(Self::All),
            "song-data" => Some(Self::SongData),
            "log-data" => Some(Self::LogData),
            _ => None,
        }
    }
}

pub async fn run_phase(config_path: &str, phase: Phase) -> Result<()> {
    let settings = Settings::new(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    init_tracing(&settings.logging);

    let service = PipelineService::new(&settings).context("Failed to set up storage")?;

    match phase {
        Phase::All => {
            let report = service.run().await.context("Warehouse build failed")?;
            info!(
                songs = report.song_data.catalog.songs,
                artists = report.song_data.catalog.artists,
                users = report.log_data.activity.users,
                time_rows = report.log_data.activity.time_rows,
                songplays = report.log_data.facts.events,
                unmatched = report.log_data.facts.unmatched,
                "Warehouse build finished"
            );
        }
        Phase::SongData => {
            service
                .process_song_data()
                .await
                .context("Song data phase failed")?;
        }
        Phase::LogData => {
            service
                .process_log_data()
                .await
                .context("Log data phase failed")?;
        }
    }

    Ok(())
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_tracing(logging: &LoggingSettings) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    // Ignore the error if a subscriber is already installed
    let _ = match logging.format {
        LogFormat::Json => tracing::subscriber::set_global_default(registry.with(fmt::layer().json())),
        LogFormat::Pretty => tracing::subscriber::set_global_default(registry.with(fmt::layer())),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_subcommand() {
        assert_eq!(Phase::from_subcommand("etl"), Some(Phase::All));
        assert_eq!(Phase::from_subcommand("song-data"), Some(Phase::SongData));
        assert_eq!(Phase::from_subcommand("log-data"), Some(Phase::LogData));
        assert_eq!(Phase::from_subcommand("serve"), None);
    }

    #[tokio::test]
    async fn test_missing_config_is_reported() {
        let err = run_phase("does/not/exist.toml", Phase::All).await.unwrap_err();
        assert!(err.to_string().contains("does/not/exist.toml"));
    }
}
