use super::record::CoercedRecord;
use super::tables::{Artist, Song};

/// One song metadata record, typed by the song data column catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRecord {
    pub song_id: Option<String>,
    pub title: Option<String>,
    pub artist_id: Option<String>,
    pub artist_name: Option<String>,
    pub artist_location: Option<String>,
    pub artist_latitude: Option<f64>,
    pub artist_longitude: Option<f64>,
    pub duration: Option<f64>,
    pub year: Option<i32>,
    pub num_songs: Option<i32>,
}

impl CatalogRecord {
    pub fn from_coerced(record: &CoercedRecord) -> Self {
        Self {
            song_id: record.utf8("song_id"),
            title: record.utf8("title"),
            artist_id: record.utf8("artist_id"),
            artist_name: record.utf8("artist_name"),
            artist_location: record.utf8("artist_location"),
            artist_latitude: record.float64("artist_latitude"),
            artist_longitude: record.float64("artist_longitude"),
            duration: record.float64("duration"),
            year: record.int32("year"),
            num_songs: record.int32("num_songs"),
        }
    }

    pub fn song(&self) -> Song {
        Song {
            song_id: self.song_id.clone(),
            title: self.title.clone(),
            artist_id: self.artist_id.clone(),
            year: self.year,
            duration: self.duration,
        }
    }

    pub fn artist(&self) -> Artist {
        Artist {
            artist_id: self.artist_id.clone(),
            name: self.artist_name.clone(),
            location: self.artist_location.clone(),
            latitude: self.artist_latitude,
            longitude: self.artist_longitude,
        }
    }
}
