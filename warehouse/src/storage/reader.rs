use super::StorageLocation;
use super::pattern::GlobPattern;
use crate::processor::Sharded;
use async_trait::async_trait;
use bytes::Bytes;
use common::{Error, Result};
use futures::{StreamExt, TryStreamExt, stream};
use object_store::ObjectStore;
use object_store::path::Path;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info, warn};

/// Yields the structured records found under a path pattern.
#[async_trait]
pub trait RecordReader: Send + Sync {
    /// One shard per matched file, files in path order. Fails with
    /// [`Error::InputNotFound`] when nothing matches.
    async fn read(&self, location: &StorageLocation, pattern: &GlobPattern)
        -> Result<Sharded<Value>>;
}

/// Reads newline-delimited JSON files.
pub struct JsonLinesReader {
    read_concurrency: usize,
}

impl JsonLinesReader {
    pub fn new(read_concurrency: usize) -> Self {
        Self {
            read_concurrency: read_concurrency.max(1),
        }
    }

    async fn matching_paths(
        &self,
        location: &StorageLocation,
        pattern: &GlobPattern,
    ) -> Result<Vec<Path>> {
        let root = location.root_path()?;
        let list_from = join_path(&root, pattern.prefix())?;

        let objects: Vec<_> = location.store().list(Some(&list_from)).try_collect().await?;

        let mut paths: Vec<Path> = objects
            .into_iter()
            .map(|meta| meta.location)
            .filter(|path| relative_to(&root, path).is_some_and(|rel| pattern.matches(rel)))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

#[async_trait]
impl RecordReader for JsonLinesReader {
    async fn read(
        &self,
        location: &StorageLocation,
        pattern: &GlobPattern,
    ) -> Result<Sharded<Value>> {
        let paths = self.matching_paths(location, pattern).await?;
        if paths.is_empty() {
            return Err(Error::InputNotFound(format!(
                "{}{}",
                location.url(),
                pattern.as_str()
            )));
        }
        debug!(pattern = pattern.as_str(), files = paths.len(), "Matched input files");

        let store = location.store().clone();
        let files: Vec<(Path, Bytes)> = stream::iter(paths)
            .map(|path| {
                let store = store.clone();
                async move {
                    let bytes = store.get(&path).await?.bytes().await?;
                    Ok::<_, Error>((path, bytes))
                }
            })
            .buffered(self.read_concurrency)
            .try_collect()
            .await?;

        let shards: Vec<Vec<Value>> = files
            .par_iter()
            .map(|(path, bytes)| parse_lines(path, bytes))
            .collect();

        let records: usize = shards.iter().map(Vec::len).sum();
        info!(
            pattern = pattern.as_str(),
            files = shards.len(),
            records,
            "Read JSON lines input"
        );

        Ok(Sharded::from_shards(shards))
    }
}

/// Parses every non-blank line. A line that is not valid JSON becomes
/// `Value::Null` so it is still counted downstream.
fn parse_lines(path: &Path, bytes: &[u8]) -> Vec<Value> {
    let text = String::from_utf8_lossy(bytes);
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).unwrap_or_else(|e| {
                warn!(path = %path, line = idx + 1, error = %e, "Skipping malformed JSON line");
                Value::Null
            })
        })
        .collect()
}

fn join_path(root: &Path, relative: &str) -> Result<Path> {
    let root: &str = root.as_ref();
    let joined = match (root.is_empty(), relative.is_empty()) {
        (true, _) => relative.to_string(),
        (false, true) => root.to_string(),
        (false, false) => format!("{}/{}", root, relative),
    };
    Ok(Path::parse(joined)?)
}

fn relative_to<'a>(root: &Path, path: &'a Path) -> Option<&'a str> {
    let root: &str = root.as_ref();
    let path: &str = path.as_ref();
    if root.is_empty() {
        return Some(path);
    }
    path.strip_prefix(root)?.strip_prefix('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use object_store::memory::InMemory;
    use std::sync::Arc;

    async fn location_with(files: &[(&str, &str)]) -> StorageLocation {
        let store = Arc::new(InMemory::new());
        for (path, content) in files {
            store
                .put(&Path::parse(*path).unwrap(), content.to_string().into())
                .await
                .unwrap();
        }
        StorageLocation::new(store, "memory:///input").unwrap()
    }

    #[tokio::test]
    async fn test_reads_matching_files_in_path_order() {
        let location = location_with(&[
            ("input/log_data/2018/11/b.json", "{\"ts\": 2}\n{\"ts\": 3}\n"),
            ("input/log_data/2018/11/a.json", "{\"ts\": 1}\n\n"),
            ("input/log_data/2018/readme.txt", "ignored"),
            ("input/other/2018/11/c.json", "{\"ts\": 9}"),
        ])
        .await;

        let pattern = GlobPattern::new("log_data/*/*/*.json").unwrap();
        let records = JsonLinesReader::new(2).read(&location, &pattern).await.unwrap();

        assert_eq!(records.shard_count(), 2);
        let ts: Vec<_> = records.into_vec().iter().map(|v| v["ts"].as_i64()).collect();
        assert_eq!(ts, vec![Some(1), Some(2), Some(3)]);
    }

    #[tokio::test]
    async fn test_malformed_line_becomes_null() {
        let location = location_with(&[("input/song_data/x.json", "{\"a\": 1}\nnot json\n")]).await;

        let pattern = GlobPattern::new("song_data/*.json").unwrap();
        let records = JsonLinesReader::new(1)
            .read(&location, &pattern)
            .await
            .unwrap()
            .into_vec();

        assert_eq!(records.len(), 2);
        assert_eq!(records[1], Value::Null);
    }

    #[tokio::test]
    async fn test_no_match_is_input_not_found() {
        let location = location_with(&[("input/song_data/x.json", "{}")]).await;

        let pattern = GlobPattern::new("log_data/*/*/*.json").unwrap();
        let result = JsonLinesReader::new(4).read(&location, &pattern).await;
        assert!(matches!(result, Err(Error::InputNotFound(_))));
    }

    #[test]
    fn test_relative_paths() {
        let root = Path::parse("input").unwrap();
        let path = Path::parse("input/log_data/a.json").unwrap();
        assert_eq!(relative_to(&root, &path), Some("log_data/a.json"));
        assert_eq!(relative_to(&Path::default(), &path), Some("input/log_data/a.json"));
        assert_eq!(relative_to(&root, &Path::parse("inputs/a.json").unwrap()), None);

        assert_eq!(join_path(&root, "log_data").unwrap().to_string(), "input/log_data");
        assert_eq!(join_path(&Path::default(), "").unwrap().to_string(), "");
    }
}
