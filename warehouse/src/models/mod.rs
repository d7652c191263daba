mod activity;
mod catalog;
pub mod record;
mod tables;

pub use activity::{ActivityRecord, NEXT_SONG_PAGE, PlayEvent};
pub use catalog::CatalogRecord;
pub use record::{CoercedRecord, CoercionIssue};
pub use tables::{Artist, Song, Songplay, StarTable, TableRow, TimeRow, User};
