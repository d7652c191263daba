use crate::schema::{ARTISTS_SCHEMA, SONGPLAYS_SCHEMA, SONGS_SCHEMA, TIME_SCHEMA, TIMEZONE, USERS_SCHEMA};
use crate::utils::arrow::{column, primitive_value, string_value, timestamp_from_millis};
use arrow::array::{
    ArrayRef, Float64Array, Int32Array, Int64Array, StringArray, TimestampMillisecondArray,
};
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use common::Result;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The five tables of the star schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StarTable {
    Songs,
    Artists,
    Users,
    Time,
    Songplays,
}

impl StarTable {
    pub const ALL: [StarTable; 5] = [
        Self::Songs,
        Self::Artists,
        Self::Users,
        Self::Time,
        Self::Songplays,
    ];

    /// Directory name under the output root.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Songs => "songs",
            Self::Artists => "artists",
            Self::Users => "users",
            Self::Time => "time",
            Self::Songplays => "songplays",
        }
    }

    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Songs => &["year", "artist_id"],
            Self::Artists | Self::Users => &[],
            Self::Time | Self::Songplays => &["year", "month"],
        }
    }

    pub fn schema(&self) -> SchemaRef {
        match self {
            Self::Songs => SONGS_SCHEMA.clone(),
            Self::Artists => ARTISTS_SCHEMA.clone(),
            Self::Users => USERS_SCHEMA.clone(),
            Self::Time => TIME_SCHEMA.clone(),
            Self::Songplays => SONGPLAYS_SCHEMA.clone(),
        }
    }
}

/// A row type that maps one-to-one onto a star-schema table.
pub trait TableRow: Sized + Send + Sync {
    const TABLE: StarTable;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch>;

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>>;
}

fn strings<'a, T: 'a>(rows: &'a [T], f: impl Fn(&'a T) -> &'a Option<String>) -> ArrayRef {
    Arc::new(StringArray::from(
        rows.iter().map(|r| f(r).as_deref()).collect::<Vec<Option<&str>>>(),
    ))
}

fn timestamps<T>(rows: &[T], f: impl Fn(&T) -> DateTime<Utc>) -> ArrayRef {
    Arc::new(
        TimestampMillisecondArray::from(
            rows.iter().map(|r| f(r).timestamp_millis()).collect::<Vec<i64>>(),
        )
        .with_timezone(TIMEZONE),
    )
}

#[derive(Debug, Clone)]
pub struct Song {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub year: Option<i32>,
    pub duration: Option<f64>,
}

impl Song {
    fn row_key(&self) -> (&Option<String>, &Option<String>, &Option<String>, Option<i32>, Option<u64>) {
        (
            &self.song_id,
            &self.title,
            &self.artist_id,
            self.year,
            self.duration.map(f64::to_bits),
        )
    }
}

// Rows compare floats bitwise so that exact duplicates collapse in a hash set.
impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.row_key() == other.row_key()
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.row_key().hash(state);
    }
}

impl TableRow for Song {
    const TABLE: StarTable = StarTable::Songs;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            strings(rows, |r| &r.song_id),
            strings(rows, |r| &r.title),
            strings(rows, |r| &r.artist_id),
            Arc::new(Int32Array::from(rows.iter().map(|r| r.year).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.duration).collect::<Vec<_>>())),
        ];
        Ok(RecordBatch::try_new(SONGS_SCHEMA.clone(), columns)?)
    }

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let song_id = column::<StringArray>(batch, "song_id")?;
        let title = column::<StringArray>(batch, "title")?;
        let artist_id = column::<StringArray>(batch, "artist_id")?;
        let year = column::<Int32Array>(batch, "year")?;
        let duration = column::<Float64Array>(batch, "duration")?;

        Ok((0..batch.num_rows())
            .map(|i| Song {
                song_id: string_value(song_id, i),
                title: string_value(title, i),
                artist_id: string_value(artist_id, i),
                year: primitive_value(year, i),
                duration: primitive_value(duration, i),
            })
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct Artist {
    pub artist_id: Option<String>,
    pub name: Option<String>,
    pub location: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Artist {
    fn row_key(&self) -> (&Option<String>, &Option<String>, &Option<String>, Option<u64>, Option<u64>) {
        (
            &self.artist_id,
            &self.name,
            &self.location,
            self.latitude.map(f64::to_bits),
            self.longitude.map(f64::to_bits),
        )
    }
}

impl PartialEq for Artist {
    fn eq(&self, other: &Self) -> bool {
        self.row_key() == other.row_key()
    }
}

impl Eq for Artist {}

impl Hash for Artist {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.row_key().hash(state);
    }
}

impl TableRow for Artist {
    const TABLE: StarTable = StarTable::Artists;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            strings(rows, |r| &r.artist_id),
            strings(rows, |r| &r.name),
            strings(rows, |r| &r.location),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.latitude).collect::<Vec<_>>())),
            Arc::new(Float64Array::from(rows.iter().map(|r| r.longitude).collect::<Vec<_>>())),
        ];
        Ok(RecordBatch::try_new(ARTISTS_SCHEMA.clone(), columns)?)
    }

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let artist_id = column::<StringArray>(batch, "artist_id")?;
        let name = column::<StringArray>(batch, "name")?;
        let location = column::<StringArray>(batch, "location")?;
        let latitude = column::<Float64Array>(batch, "latitude")?;
        let longitude = column::<Float64Array>(batch, "longitude")?;

        Ok((0..batch.num_rows())
            .map(|i| Artist {
                artist_id: string_value(artist_id, i),
                name: string_value(name, i),
                location: string_value(location, i),
                latitude: primitive_value(latitude, i),
                longitude: primitive_value(longitude, i),
            })
            .collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    pub user_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub gender: Option<String>,
    pub level: Option<String>,
}

impl TableRow for User {
    const TABLE: StarTable = StarTable::Users;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            strings(rows, |r| &r.user_id),
            strings(rows, |r| &r.first_name),
            strings(rows, |r| &r.last_name),
            strings(rows, |r| &r.gender),
            strings(rows, |r| &r.level),
        ];
        Ok(RecordBatch::try_new(USERS_SCHEMA.clone(), columns)?)
    }

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let user_id = column::<StringArray>(batch, "user_id")?;
        let first_name = column::<StringArray>(batch, "first_name")?;
        let last_name = column::<StringArray>(batch, "last_name")?;
        let gender = column::<StringArray>(batch, "gender")?;
        let level = column::<StringArray>(batch, "level")?;

        Ok((0..batch.num_rows())
            .map(|i| User {
                user_id: string_value(user_id, i),
                first_name: string_value(first_name, i),
                last_name: string_value(last_name, i),
                gender: string_value(gender, i),
                level: string_value(level, i),
            })
            .collect())
    }
}

/// One row of the time dimension: a distinct `start_time` broken into parts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimeRow {
    pub start_time: DateTime<Utc>,
    pub hour: i32,
    pub day: i32,
    pub week: i32,
    pub month: i32,
    pub year: i32,
    pub weekday: i32,
}

impl TableRow for TimeRow {
    const TABLE: StarTable = StarTable::Time;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let ints = |f: fn(&TimeRow) -> i32| -> ArrayRef {
            Arc::new(Int32Array::from(rows.iter().map(f).collect::<Vec<i32>>()))
        };
        let columns: Vec<ArrayRef> = vec![
            timestamps(rows, |r| r.start_time),
            ints(|r| r.hour),
            ints(|r| r.day),
            ints(|r| r.week),
            ints(|r| r.month),
            ints(|r| r.year),
            ints(|r| r.weekday),
        ];
        Ok(RecordBatch::try_new(TIME_SCHEMA.clone(), columns)?)
    }

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let start_time = column::<TimestampMillisecondArray>(batch, "start_time")?;
        let hour = column::<Int32Array>(batch, "hour")?;
        let day = column::<Int32Array>(batch, "day")?;
        let week = column::<Int32Array>(batch, "week")?;
        let month = column::<Int32Array>(batch, "month")?;
        let year = column::<Int32Array>(batch, "year")?;
        let weekday = column::<Int32Array>(batch, "weekday")?;

        (0..batch.num_rows())
            .map(|i| {
                Ok(TimeRow {
                    start_time: timestamp_from_millis(start_time.value(i))?,
                    hour: hour.value(i),
                    day: day.value(i),
                    week: week.value(i),
                    month: month.value(i),
                    year: year.value(i),
                    weekday: weekday.value(i),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Songplay {
    pub songplay_id: i64,
    pub start_time: DateTime<Utc>,
    pub year: i32,
    pub month: i32,
    pub user_id: Option<String>,
    pub level: Option<String>,
    pub song_id: Option<String>,
    pub artist_id: Option<String>,
    pub session_id: Option<i64>,
    pub location: Option<String>,
    pub user_agent: Option<String>,
}

impl TableRow for Songplay {
    const TABLE: StarTable = StarTable::Songplays;

    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(rows.iter().map(|r| r.songplay_id).collect::<Vec<_>>())),
            timestamps(rows, |r| r.start_time),
            Arc::new(Int32Array::from(rows.iter().map(|r| r.year).collect::<Vec<_>>())),
            Arc::new(Int32Array::from(rows.iter().map(|r| r.month).collect::<Vec<_>>())),
            strings(rows, |r| &r.user_id),
            strings(rows, |r| &r.level),
            strings(rows, |r| &r.song_id),
            strings(rows, |r| &r.artist_id),
            Arc::new(Int64Array::from(rows.iter().map(|r| r.session_id).collect::<Vec<_>>())),
            strings(rows, |r| &r.location),
            strings(rows, |r| &r.user_agent),
        ];
        Ok(RecordBatch::try_new(SONGPLAYS_SCHEMA.clone(), columns)?)
    }

    fn from_record_batch(batch: &RecordBatch) -> Result<Vec<Self>> {
        let songplay_id = column::<Int64Array>(batch, "songplay_id")?;
        let start_time = column::<TimestampMillisecondArray>(batch, "start_time")?;
        let year = column::<Int32Array>(batch, "year")?;
        let month = column::<Int32Array>(batch, "month")?;
        let user_id = column::<StringArray>(batch, "user_id")?;
        let level = column::<StringArray>(batch, "level")?;
        let song_id = column::<StringArray>(batch, "song_id")?;
        let artist_id = column::<StringArray>(batch, "artist_id")?;
        let session_id = column::<Int64Array>(batch, "session_id")?;
        let location = column::<StringArray>(batch, "location")?;
        let user_agent = column::<StringArray>(batch, "user_agent")?;

        (0..batch.num_rows())
            .map(|i| {
                Ok(Songplay {
                    songplay_id: songplay_id.value(i),
                    start_time: timestamp_from_millis(start_time.value(i))?,
                    year: year.value(i),
                    month: month.value(i),
                    user_id: string_value(user_id, i),
                    level: string_value(level, i),
                    song_id: string_value(song_id, i),
                    artist_id: string_value(artist_id, i),
                    session_id: primitive_value(session_id, i),
                    location: string_value(location, i),
                    user_agent: string_value(user_agent, i),
                })
            })
            .collect()
    }
}
