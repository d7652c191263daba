use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use lazy_static::lazy_static;
use std::sync::Arc;

pub const TIMEZONE: &str = "UTC";

pub fn start_time_type() -> DataType {
    DataType::Timestamp(TimeUnit::Millisecond, Some(TIMEZONE.into()))
}

// Raw source schemas

/// Column catalog for song metadata files. Every column is nullable: absent or
/// malformed values are coerced to null instead of rejecting the record.
pub fn song_data_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("duration", DataType::Float64, true),
        Field::new("num_songs", DataType::Int32, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("year", DataType::Int32, true),
    ])
}

/// The subset of activity-log fields the star schema consumes.
pub fn log_data_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("ts", DataType::Int64, true),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("userId", DataType::Utf8, true),
    ])
}

// Star schema tables

pub fn songs_schema() -> Schema {
    Schema::new(vec![
        Field::new("song_id", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("year", DataType::Int32, true),
        Field::new("duration", DataType::Float64, true),
    ])
}

pub fn artists_schema() -> Schema {
    Schema::new(vec![
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("name", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("latitude", DataType::Float64, true),
        Field::new("longitude", DataType::Float64, true),
    ])
}

pub fn users_schema() -> Schema {
    Schema::new(vec![
        Field::new("user_id", DataType::Utf8, true),
        Field::new("first_name", DataType::Utf8, true),
        Field::new("last_name", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
    ])
}

pub fn time_schema() -> Schema {
    Schema::new(vec![
        Field::new("start_time", start_time_type(), false),
        Field::new("hour", DataType::Int32, false),
        Field::new("day", DataType::Int32, false),
        Field::new("week", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("year", DataType::Int32, false),
        Field::new("weekday", DataType::Int32, false),
    ])
}

pub fn songplays_schema() -> Schema {
    Schema::new(vec![
        Field::new("songplay_id", DataType::Int64, false),
        Field::new("start_time", start_time_type(), false),
        Field::new("year", DataType::Int32, false),
        Field::new("month", DataType::Int32, false),
        Field::new("user_id", DataType::Utf8, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("session_id", DataType::Int64, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("user_agent", DataType::Utf8, true),
    ])
}

pub enum SourceSchema {
    SongData,
    LogData,
}

pub fn get_source_schema(source: SourceSchema) -> SchemaRef {
    match source {
        SourceSchema::SongData => SONG_DATA_SCHEMA.clone(),
        SourceSchema::LogData => LOG_DATA_SCHEMA.clone(),
    }
}

// Lazy-loaded static schemas
lazy_static! {
    static ref SONG_DATA_SCHEMA: SchemaRef = Arc::new(song_data_schema());
    static ref LOG_DATA_SCHEMA: SchemaRef = Arc::new(log_data_schema());
    pub(crate) static ref SONGS_SCHEMA: SchemaRef = Arc::new(songs_schema());
    pub(crate) static ref ARTISTS_SCHEMA: SchemaRef = Arc::new(artists_schema());
    pub(crate) static ref USERS_SCHEMA: SchemaRef = Arc::new(users_schema());
    pub(crate) static ref TIME_SCHEMA: SchemaRef = Arc::new(time_schema());
    pub(crate) static ref SONGPLAYS_SCHEMA: SchemaRef = Arc::new(songplays_schema());
}
