use super::catalog::{log_issues, tally_issues};
use super::config::ProcessorOptions;
use super::shard::Sharded;
use crate::models::{ActivityRecord, CoercedRecord, PlayEvent, TimeRow, User};
use crate::schema::{SourceSchema, get_source_schema};
use chrono::{DateTime, Datelike, Timelike, Utc};
use common::config::{UserDedupPolicy, WeekdayConvention};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivityReport {
    pub records: usize,
    pub non_song_plays: usize,
    /// NextSong records dropped because `ts` was missing or not numeric.
    pub dropped_invalid_ts: usize,
    pub events: usize,
    pub users: usize,
    pub time_rows: usize,
    pub coercion_warnings: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct ActivityOutput {
    pub events: Sharded<PlayEvent>,
    pub users: Vec<User>,
    pub time: Vec<TimeRow>,
    pub report: ActivityReport,
}

/// Turns activity log records into song-play events plus the users and time
/// dimensions.
pub struct ActivityTransformer {
    options: ProcessorOptions,
}

impl ActivityTransformer {
    pub fn new(options: ProcessorOptions) -> Self {
        Self { options }
    }

    pub fn transform(&self, records: Sharded<Value>) -> ActivityOutput {
        let schema = get_source_schema(SourceSchema::LogData);

        let coerced = records.map(|value| CoercedRecord::from_json(schema.clone(), &value));
        let coercion_warnings = tally_issues(coerced.shards().iter().flatten().flat_map(|r| r.issues()));
        log_issues("log_data", &coercion_warnings);

        let activity = coerced.map(|record| ActivityRecord::from_coerced(&record));
        let records = activity.len();

        let song_plays = activity.filter(ActivityRecord::is_song_play);
        let non_song_plays = records - song_plays.len();
        let retained = song_plays.len();

        let events = song_plays.filter_map(|record| match record.start_time() {
            Ok(start_time) => Some(record.into_play_event(start_time)),
            Err(e) => {
                debug!(user_id = ?record.user_id, session_id = ?record.session_id, "Dropping song play: {}", e);
                None
            }
        });
        let dropped_invalid_ts = retained - events.len();
        if dropped_invalid_ts > 0 {
            warn!(
                dropped = dropped_invalid_ts,
                "Song plays without a usable ts were dropped from every table"
            );
        }

        let users = self.users(&events);
        let time = self.time(&events);

        let report = ActivityReport {
            records,
            non_song_plays,
            dropped_invalid_ts,
            events: events.len(),
            users: users.len(),
            time_rows: time.len(),
            coercion_warnings,
        };
        info!(
            records = report.records,
            events = report.events,
            non_song_plays = report.non_song_plays,
            dropped_invalid_ts = report.dropped_invalid_ts,
            users = report.users,
            time_rows = report.time_rows,
            "Log data transformed"
        );

        ActivityOutput {
            events,
            users,
            time,
            report,
        }
    }

    fn users(&self, events: &Sharded<PlayEvent>) -> Vec<User> {
        let shard_count = self.options.shard_count;
        let seen = events.clone().map(|event| (event.user, event.start_time));

        match self.options.user_dedup {
            // Events without a user id have nothing to key a user row on.
            UserDedupPolicy::LatestLevel => seen
                .filter(|(user, _)| user.user_id.is_some())
                .reduce_by_key(
                    shard_count,
                    |(user, _)| user.user_id.clone(),
                    |candidate, current| candidate.1 > current.1,
                )
                .map(|(user, _)| user)
                .into_vec(),
            UserDedupPolicy::ExactRow => seen
                .map(|(user, _)| user)
                .distinct(shard_count)
                .into_vec(),
        }
    }

    fn time(&self, events: &Sharded<PlayEvent>) -> Vec<TimeRow> {
        let convention = self.options.weekday_convention;
        events
            .clone()
            .map(|event| event.start_time)
            .distinct(self.options.shard_count)
            .map(|start_time| time_row(start_time, convention))
            .into_vec()
    }
}

/// Breaks a UTC instant into the time dimension columns.
pub fn time_row(start_time: DateTime<Utc>, convention: WeekdayConvention) -> TimeRow {
    let weekday = match convention {
        WeekdayConvention::SundayFirst => start_time.weekday().number_from_sunday(),
        WeekdayConvention::MondayFirst => start_time.weekday().number_from_monday(),
    };

    TimeRow {
        start_time,
        hour: start_time.hour() as i32,
        day: start_time.day() as i32,
        week: start_time.iso_week().week() as i32,
        month: start_time.month() as i32,
        year: start_time.year(),
        weekday: weekday as i32,
    }
}
