//! Builds the songplays fact table.
//!
//! Events are matched to the song catalog on (title, artist name), then to the
//! time dimension on `start_time`. Every event yields exactly one songplay;
//! a catalog miss only leaves `song_id` and `artist_id` null.

use super::config::ProcessorOptions;
use super::shard::{JoinKind, Sharded};
use crate::models::{Artist, PlayEvent, Song, Songplay, TimeRow};
use common::config::JoinKeyNormalization;
use common::{Error, Result};
use tracing::info;

const SHARD_BITS: u32 = 33;
const MAX_SHARDS: usize = 1 << 30;
const MAX_ROWS_PER_SHARD: usize = 1 << SHARD_BITS;

/// Surrogate key for the `local`-th row of shard `shard`: the shard index in
/// the upper 31 bits and the row number in the lower 33.
pub fn surrogate_id(shard: usize, local: usize) -> Result<i64> {
    if shard >= MAX_SHARDS {
        return Err(Error::InvariantViolation(format!(
            "shard index {} does not fit a songplay_id",
            shard
        )));
    }
    if local >= MAX_ROWS_PER_SHARD {
        return Err(Error::InvariantViolation(format!(
            "shard {} holds more than {} songplays",
            shard, MAX_ROWS_PER_SHARD
        )));
    }
    Ok(((shard as i64) << SHARD_BITS) | local as i64)
}

pub fn normalize_key(value: &str, mode: JoinKeyNormalization) -> String {
    match mode {
        JoinKeyNormalization::Exact => value.to_string(),
        JoinKeyNormalization::Relaxed => value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase(),
    }
}

fn match_key(
    title: Option<&str>,
    artist_name: Option<&str>,
    mode: JoinKeyNormalization,
) -> Option<(String, String)> {
    Some((normalize_key(title?, mode), normalize_key(artist_name?, mode)))
}

/// A catalog song together with its artist's name.
#[derive(Debug, Clone)]
struct SongLookup {
    song_id: Option<String>,
    title: Option<String>,
    artist_id: Option<String>,
    artist_name: Option<String>,
}

#[derive(Debug, Clone)]
struct MatchedEvent {
    event: PlayEvent,
    song_id: Option<String>,
    artist_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FactReport {
    pub events: usize,
    pub matched: usize,
    pub unmatched: usize,
}

#[derive(Debug, Clone)]
pub struct FactOutput {
    pub songplays: Vec<Songplay>,
    pub report: FactReport,
}

pub struct FactBuilder {
    options: ProcessorOptions,
}

impl FactBuilder {
    pub fn new(options: ProcessorOptions) -> Self {
        Self { options }
    }

    pub fn build(
        &self,
        events: Sharded<PlayEvent>,
        songs: Vec<Song>,
        artists: Vec<Artist>,
        time: Vec<TimeRow>,
    ) -> Result<FactOutput> {
        let shard_count = self.options.shard_count;
        if shard_count > MAX_SHARDS {
            return Err(Error::InvalidInput(format!(
                "shard_count {} exceeds the songplay_id layout",
                shard_count
            )));
        }
        let mode = self.options.join_normalization;
        let event_count = events.len();

        let lookup = self.song_lookup(songs, artists);

        let matched = events.join(
            lookup,
            shard_count,
            JoinKind::LeftOuter,
            |e| match_key(e.song.as_deref(), e.artist.as_deref(), mode),
            |l| match_key(l.title.as_deref(), l.artist_name.as_deref(), mode),
            |event, song| MatchedEvent {
                event,
                song_id: song.and_then(|s| s.song_id.clone()),
                artist_id: song.and_then(|s| s.artist_id.clone()),
            },
        );
        let matched_count = matched
            .shards()
            .iter()
            .flatten()
            .filter(|m| m.song_id.is_some() || m.artist_id.is_some())
            .count();

        let dated = matched
            .join(
                Sharded::from_vec(time, shard_count),
                shard_count,
                JoinKind::Inner,
                |m| Some(m.event.start_time),
                |t| Some(t.start_time),
                |m, t| t.map(|t| (m, t.year, t.month)),
            )
            .filter_map(|row| row);

        if dated.len() != event_count {
            return Err(Error::InvariantViolation(format!(
                "{} song plays matched {} time rows; every start_time needs exactly one",
                event_count,
                dated.len()
            )));
        }

        let songplays = dated
            .map_shards(|shard, rows| {
                rows.into_iter()
                    .enumerate()
                    .map(|(local, (m, year, month))| -> Result<Songplay> {
                        Ok(Songplay {
                            songplay_id: surrogate_id(shard, local)?,
                            start_time: m.event.start_time,
                            year,
                            month,
                            user_id: m.event.user.user_id,
                            level: m.event.user.level,
                            song_id: m.song_id,
                            artist_id: m.artist_id,
                            session_id: m.event.session_id,
                            location: m.event.location,
                            user_agent: m.event.user_agent,
                        })
                    })
                    .collect::<Vec<_>>()
            })
            .into_vec()
            .into_iter()
            .collect::<Result<Vec<Songplay>>>()?;

        let report = FactReport {
            events: event_count,
            matched: matched_count,
            unmatched: event_count - matched_count,
        };
        info!(
            events = report.events,
            matched = report.matched,
            unmatched = report.unmatched,
            "Songplays built"
        );

        Ok(FactOutput { songplays, report })
    }

    /// One entry per (title, artist name); among catalog rows sharing that
    /// pair the smallest (song_id, artist_id) wins.
    fn song_lookup(&self, songs: Vec<Song>, artists: Vec<Artist>) -> Sharded<SongLookup> {
        let shard_count = self.options.shard_count;
        let mode = self.options.join_normalization;

        Sharded::from_vec(songs, shard_count)
            .join(
                Sharded::from_vec(artists, shard_count),
                shard_count,
                JoinKind::Inner,
                |s| s.artist_id.clone(),
                |a| a.artist_id.clone(),
                |song, artist| SongLookup {
                    song_id: song.song_id,
                    title: song.title,
                    artist_id: song.artist_id,
                    artist_name: artist.and_then(|a| a.name.clone()),
                },
            )
            .filter(|l| l.title.is_some() && l.artist_name.is_some())
            .reduce_by_key(
                shard_count,
                |l| match_key(l.title.as_deref(), l.artist_name.as_deref(), mode),
                |candidate, current| {
                    (&candidate.song_id, &candidate.artist_id) < (&current.song_id, &current.artist_id)
                },
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::User;
    use crate::processor::activity::time_row;
    use crate::utils::arrow::timestamp_from_millis;
    use common::config::WeekdayConvention;
    use std::collections::HashSet;

    fn song(song_id: &str, title: &str, artist_id: &str) -> Song {
        Song {
            song_id: Some(song_id.to_string()),
            title: Some(title.to_string()),
            artist_id: Some(artist_id.to_string()),
            year: Some(2003),
            duration: Some(215.5),
        }
    }

    fn artist(artist_id: &str, name: &str) -> Artist {
        Artist {
            artist_id: Some(artist_id.to_string()),
            name: Some(name.to_string()),
            location: None,
            latitude: None,
            longitude: None,
        }
    }

    fn event(ts: i64, song: &str, artist: &str) -> PlayEvent {
        PlayEvent {
            start_time: timestamp_from_millis(ts).unwrap(),
            user: User {
                user_id: Some("26".to_string()),
                first_name: Some("Ryan".to_string()),
                last_name: Some("Smith".to_string()),
                gender: Some("M".to_string()),
                level: Some("free".to_string()),
            },
            song: Some(song.to_string()),
            artist: Some(artist.to_string()),
            session_id: Some(583),
            location: Some("San Jose-Sunnyvale-Santa Clara, CA".to_string()),
            user_agent: None,
        }
    }

    fn time_for(events: &[PlayEvent]) -> Vec<TimeRow> {
        let distinct: HashSet<_> = events.iter().map(|e| e.start_time).collect();
        distinct
            .into_iter()
            .map(|t| time_row(t, WeekdayConvention::SundayFirst))
            .collect()
    }

    fn builder(options: ProcessorOptions) -> FactBuilder {
        FactBuilder::new(options.with_shard_count(3))
    }

    #[test]
    fn test_surrogate_id_layout() {
        assert_eq!(surrogate_id(0, 0).unwrap(), 0);
        assert_eq!(surrogate_id(0, 5).unwrap(), 5);
        assert_eq!(surrogate_id(1, 0).unwrap(), 1 << 33);
        assert_eq!(surrogate_id(2, 7).unwrap(), (2 << 33) | 7);
        assert!(surrogate_id(MAX_SHARDS, 0).is_err());
        assert!(surrogate_id(0, MAX_ROWS_PER_SHARD).is_err());
    }

    #[test]
    fn test_matched_and_unmatched_events() {
        let events = vec![
            event(1541121934796, "Sehr kosmisch", "Harmonia"),
            event(1541121934797, "Unknown Song", "Nobody"),
            event(1541121934798, "Sehr kosmisch", "Harmonia"),
        ];
        let time = time_for(&events);

        let output = builder(ProcessorOptions::default())
            .build(
                Sharded::from_vec(events, 2),
                vec![song("SOZCTXZ12AB0182364", "Sehr kosmisch", "ARL7K851187B99ACD2")],
                vec![artist("ARL7K851187B99ACD2", "Harmonia")],
                time,
            )
            .unwrap();

        assert_eq!(output.songplays.len(), 3);
        assert_eq!(output.report.events, 3);
        assert_eq!(output.report.matched, 2);
        assert_eq!(output.report.unmatched, 1);

        let unmatched: Vec<_> = output.songplays.iter().filter(|s| s.song_id.is_none()).collect();
        assert_eq!(unmatched.len(), 1);
        assert_eq!(unmatched[0].artist_id, None);
        assert_eq!(unmatched[0].user_id.as_deref(), Some("26"));

        for play in &output.songplays {
            assert_eq!(play.year, 2018);
            assert_eq!(play.month, 11);
        }

        let ids: HashSet<_> = output.songplays.iter().map(|s| s.songplay_id).collect();
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn test_duplicate_catalog_entries_yield_one_songplay() {
        let events = vec![event(1541121934796, "Intro", "The Band")];
        let time = time_for(&events);

        let output = builder(ProcessorOptions::default())
            .build(
                Sharded::from_vec(events, 1),
                vec![song("SOB", "Intro", "AR1"), song("SOA", "Intro", "AR2")],
                vec![artist("AR1", "The Band"), artist("AR2", "The Band")],
                time,
            )
            .unwrap();

        assert_eq!(output.songplays.len(), 1);
        assert_eq!(output.songplays[0].song_id.as_deref(), Some("SOA"));
        assert_eq!(output.songplays[0].artist_id.as_deref(), Some("AR2"));
    }

    #[test]
    fn test_relaxed_normalization() {
        let events = vec![event(1541121934796, "  sehr   KOSMISCH ", "harmonia")];
        let time = time_for(&events);
        let songs = vec![song("SOZ", "Sehr kosmisch", "AR1")];
        let artists = vec![artist("AR1", "Harmonia")];

        let exact = builder(ProcessorOptions::default())
            .build(Sharded::from_vec(events.clone(), 1), songs.clone(), artists.clone(), time.clone())
            .unwrap();
        assert_eq!(exact.report.matched, 0);

        let relaxed_options = ProcessorOptions {
            join_normalization: JoinKeyNormalization::Relaxed,
            ..ProcessorOptions::default()
        };
        let relaxed = builder(relaxed_options)
            .build(Sharded::from_vec(events, 1), songs, artists, time)
            .unwrap();
        assert_eq!(relaxed.report.matched, 1);
        assert_eq!(relaxed.songplays[0].song_id.as_deref(), Some("SOZ"));
    }

    #[test]
    fn test_missing_time_row_is_an_invariant_violation() {
        let events = vec![
            event(1541121934796, "A", "B"),
            event(1541121999999, "A", "B"),
        ];
        let time = time_for(&events[..1]);

        let result = builder(ProcessorOptions::default()).build(
            Sharded::from_vec(events, 2),
            Vec::new(),
            Vec::new(),
            time,
        );
        assert!(matches!(result, Err(Error::InvariantViolation(_))));
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(" A  b ", JoinKeyNormalization::Exact), " A  b ");
        assert_eq!(normalize_key(" A \t b ", JoinKeyNormalization::Relaxed), "a b");
    }
}
