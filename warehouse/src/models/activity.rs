use super::record::CoercedRecord;
use super::tables::User;
use crate::utils::arrow::timestamp_from_millis;
use chrono::{DateTime, Utc};
use common::{Error, Result};

/// Page value of a log line that records a song being played.
pub const NEXT_SONG_PAGE: &str = "NextSong";

/// One activity log line, typed by the explicit log data schema.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
    pub page: Option<String>,
    pub ts: Option<i64>,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
    /// `ts` was present but not a usable number.
    pub ts_malformed: bool,
}

impl ActivityRecord {
    pub fn from_coerced(record: &CoercedRecord) -> Self {
        Self {
            user_id: record.utf8("userId"),
            first_name: record.utf8("firstName"),
            last_name: record.utf8("lastName"),
            gender: record.utf8("gender"),
            level: record.utf8("level"),
            page: record.utf8("page"),
            ts: record.int64("ts"),
            song: record.utf8("song"),
            artist: record.utf8("artist"),
            session_id: record.int64("sessionId"),
            location: record.utf8("location"),
            user_agent: record.utf8("userAgent"),
            ts_malformed: record.has_issue("ts"),
        }
    }

    pub fn is_song_play(&self) -> bool {
        self.page.as_deref() == Some(NEXT_SONG_PAGE)
    }

    /// Interprets `ts` as milliseconds since the Unix epoch, in UTC.
    pub fn start_time(&self) -> Result<DateTime<Utc>> {
        match self.ts {
            Some(ts) => timestamp_from_millis(ts),
            None if self.ts_malformed => Err(Error::Conversion(
                "ts is not a numeric millisecond timestamp".to_string(),
            )),
            None => Err(Error::Conversion("ts is missing".to_string())),
        }
    }

    pub fn into_play_event(self, start_time: DateTime<Utc>) -> PlayEvent {
        PlayEvent {
            start_time,
            user: User {
                user_id: self.user_id,
                first_name: self.first_name,
                last_name: self.last_name,
                gender: self.gender,
                level: self.level,
            },
            song: self.song,
            artist: self.artist,
            session_id: self.session_id,
            location: self.location,
            user_agent: self.user_agent,
        }
    }
}

/// A retained song-play event with its derived `start_time`.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
    pub start_time: DateTime<Utc>,
    pub user: User,
    pub song: Option<String>,
    pub artist: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SourceSchema, get_source_schema};
    use chrono::{Datelike, Timelike};
    use serde_json::{Value, json};

    fn activity(value: Value) -> ActivityRecord {
        ActivityRecord::from_coerced(&CoercedRecord::from_json(
            get_source_schema(SourceSchema::LogData),
            &value,
        ))
    }

    #[test]
    fn test_log_line_fields() {
        let record = activity(json!({
            "artist": "Harmonia",
            "auth": "Logged In",
            "firstName": "Ryan",
            "gender": "M",
            "itemInSession": 0,
            "lastName": "Smith",
            "length": 655.77751,
            "level": "free",
            "location": "San Jose-Sunnyvale-Santa Clara, CA",
            "method": "PUT",
            "page": "NextSong",
            "registration": 1541016707796.0,
            "sessionId": 583,
            "song": "Sehr kosmisch",
            "status": 200,
            "ts": 1542241826796_i64,
            "userAgent": "Mozilla/5.0",
            "userId": "26"
        }));

        assert!(record.is_song_play());
        assert_eq!(record.user_id.as_deref(), Some("26"));
        assert_eq!(record.session_id, Some(583));
        assert_eq!(record.ts, Some(1542241826796));
        assert!(!record.ts_malformed);

        let event = record.into_play_event(timestamp_from_millis(1542241826796).unwrap());
        assert_eq!(event.user.first_name.as_deref(), Some("Ryan"));
        assert_eq!(event.song.as_deref(), Some("Sehr kosmisch"));
    }

    #[test]
    fn test_numeric_user_id_is_kept_as_text() {
        let record = activity(json!({ "userId": 26, "page": "Home" }));
        assert_eq!(record.user_id.as_deref(), Some("26"));
        assert!(!record.is_song_play());
    }

    #[test]
    fn test_start_time_is_utc_epoch_millis() {
        let record = activity(json!({ "page": "NextSong", "ts": 1541121934796_i64 }));
        let start_time = record.start_time().unwrap();

        assert_eq!(start_time.year(), 2018);
        assert_eq!(start_time.month(), 11);
        assert_eq!(start_time.day(), 2);
        assert_eq!(start_time.hour(), 1);
        assert_eq!(start_time.minute(), 25);
        assert_eq!(start_time.second(), 34);
        assert_eq!(start_time.timestamp_subsec_millis(), 796);
    }

    #[test]
    fn test_missing_or_malformed_ts_is_a_conversion_error() {
        let missing = activity(json!({ "page": "NextSong" }));
        let malformed = activity(json!({ "page": "NextSong", "ts": "yesterday" }));

        assert!(matches!(missing.start_time(), Err(Error::Conversion(msg)) if msg.contains("missing")));
        assert!(malformed.ts_malformed);
        assert!(matches!(malformed.start_time(), Err(Error::Conversion(msg)) if msg.contains("not a numeric")));
    }

    #[test]
    fn test_float_ts_converts_to_start_time() {
        let record = activity(json!({ "page": "NextSong", "ts": 1541121934796.0 }));

        assert!(!record.ts_malformed);
        let start_time = record.start_time().unwrap();
        assert_eq!(start_time.timestamp_millis(), 1541121934796);
        assert_eq!(start_time.hour(), 1);
    }
}
