pub mod pattern;
pub mod reader;
pub mod writer;

pub use pattern::GlobPattern;
pub use reader::{JsonLinesReader, RecordReader};
pub use writer::{PartitionedWriter, TableWriter, WriteSummary};

use common::config::{S3Settings, Settings};
use common::{Error, Result};
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// A root URL together with the object store that serves it.
#[derive(Clone)]
pub struct StorageLocation {
    store: Arc<dyn ObjectStore>,
    url: Url,
}

impl std::fmt::Debug for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageLocation")
            .field("url", &self.url.as_str())
            .finish()
    }
}

impl StorageLocation {
    pub fn new(store: Arc<dyn ObjectStore>, url: &str) -> Result<Self> {
        Ok(Self {
            store,
            url: directory_url(Url::parse(url)?),
        })
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Root URL; always ends with `/`.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The `scheme://authority` URL the store is registered under.
    pub fn object_store_url(&self) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}://{}",
            self.url.scheme(),
            self.url.authority()
        ))?)
    }

    /// Object path of the root itself.
    pub fn root_path(&self) -> Result<Path> {
        Ok(Path::from_url_path(self.url.path())?)
    }

    /// URL of a directory directly under the root, with a trailing `/`.
    pub fn child_url(&self, name: &str) -> Result<Url> {
        Ok(self.url.join(&format!("{}/", name.trim_matches('/')))?)
    }

    pub fn child_path(&self, name: &str) -> Result<Path> {
        Ok(Path::from_url_path(self.child_url(name)?.path())?)
    }
}

/// Builds object stores for the configured input and output roots.
#[derive(Debug, Clone, Default)]
pub struct StorageManager {
    s3: Option<S3Settings>,
}

impl StorageManager {
    pub fn new(settings: &Settings) -> Self {
        Self {
            s3: settings.s3.clone(),
        }
    }

    /// Resolves `s3://`, `file://`, `memory://` URLs or plain filesystem
    /// paths to a [`StorageLocation`].
    pub fn location(&self, raw: &str) -> Result<StorageLocation> {
        let url = resolve_url(raw)?;
        let store: Arc<dyn ObjectStore> = match url.scheme() {
            "s3" | "s3a" => Arc::new(self.s3_store(&url)?),
            _ => {
                let (store, _) = object_store::parse_url(&url)?;
                Arc::from(store)
            }
        };

        debug!(url = %url, "Resolved storage location");
        Ok(StorageLocation { store, url })
    }

    fn s3_store(&self, url: &Url) -> Result<object_store::aws::AmazonS3> {
        let bucket = url.host_str().ok_or_else(|| {
            Error::InvalidInput(format!("S3 URL '{}' does not name a bucket", url))
        })?;

        let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
        if let Some(s3) = &self.s3 {
            builder = builder
                .with_region(&s3.region)
                .with_allow_http(s3.allow_http);
            if let Some(endpoint) = &s3.endpoint {
                builder = builder.with_endpoint(endpoint);
            }
            if let Some(access_key) = &s3.access_key {
                builder = builder.with_access_key_id(access_key);
            }
            if let Some(secret_key) = &s3.secret_key {
                builder = builder.with_secret_access_key(secret_key);
            }
        }

        Ok(builder.build()?)
    }
}

fn resolve_url(raw: &str) -> Result<Url> {
    match Url::parse(raw) {
        // Single-letter schemes are Windows drive letters.
        Ok(url) if url.scheme().len() > 1 => Ok(directory_url(url)),
        _ => {
            let path = std::path::absolute(raw)?;
            let url = Url::from_directory_path(&path).map_err(|_| {
                Error::InvalidInput(format!("'{}' is not a usable directory path", raw))
            })?;
            Ok(url)
        }
    }
}

fn directory_url(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}
