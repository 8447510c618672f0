use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use percent_encoding::percent_decode_str;
use tokio::fs::{metadata, OpenOptions, read_dir, ReadDir};
use tokio_util::io::ReaderStream;
use tracing::trace;

use crate::error::TransportError;
use crate::transport::{KeyStream, ResourceMetadata, Transport};
use crate::util::blob::Blob;

/// Repositories on the local file system (`file:/path` or `file:///path`)
#[derive(Default)]
pub struct FileTransport {}

impl FileTransport {
    pub fn new() -> FileTransport {
        FileTransport {}
    }
}

pub fn to_path(location: &str) -> Result<PathBuf, TransportError> {
    let raw = location.strip_prefix("file://")
        .or_else(|| location.strip_prefix("file:"))
        .ok_or_else(|| TransportError::unavailable(location, "not a file: location"))?;
    let decoded = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|e| TransportError::unavailable(location, e))?;
    Ok(PathBuf::from(decoded.as_ref()))
}

fn io_error(location: &str, e: std::io::Error) -> TransportError {
    match e.kind() {
        ErrorKind::NotFound => TransportError::NotFound(location.to_string()),
        _ => TransportError::unavailable(location, e),
    }
}

#[async_trait]
impl Transport for FileTransport {
    async fn metadata(&self, location: &str) -> Result<Option<ResourceMetadata>, TransportError> {
        let path = to_path(location)?;
        match metadata(&path).await {
            Ok(m) if m.is_file() => Ok(Some(ResourceMetadata {
                length: m.len(),
                last_modified: m.modified().ok().map(DateTime::<Utc>::from),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(TransportError::unavailable(location, e)),
        }
    }

    async fn open(&self, location: &str) -> Result<Blob, TransportError> {
        let path = to_path(location)?;
        trace!("opening {}", path.display());

        let file = OpenOptions::new()
            .read(true)
            .open(&path)
            .await
            .map_err(|e| io_error(location, e))?;

        Ok(Blob::unchecked(Box::pin(ReaderStream::new(file).map_err(anyhow::Error::from))))
    }

    /// Directory entries below the prefix, as absolute `file:` locations. Directories get a trailing '/'.
    fn list<'a>(&'a self, prefix: &'a str) -> KeyStream<'a> {
        let base = if prefix.ends_with('/') { prefix.to_string() } else { format!("{}/", prefix) };

        stream::unfold(ListState::Start, move |state| {
            let base = base.clone();
            async move {
                let mut dir = match state {
                    ListState::Done => return None,
                    ListState::Reading(dir) => dir,
                    ListState::Start => {
                        let path = match to_path(&base) {
                            Ok(path) => path,
                            Err(e) => return Some((Err(e), ListState::Done)),
                        };
                        match read_dir(&path).await {
                            Ok(dir) => dir,
                            Err(e) if e.kind() == ErrorKind::NotFound => return None,
                            Err(e) => return Some((Err(TransportError::unavailable(&base, e)), ListState::Done)),
                        }
                    }
                };

                match dir.next_entry().await {
                    Ok(Some(entry)) => {
                        let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                        let name = entry.file_name().to_string_lossy().to_string();
                        let listed = format!("{}{}{}", base, name, if is_dir { "/" } else { "" });
                        Some((Ok(listed), ListState::Reading(dir)))
                    }
                    Ok(None) => None,
                    Err(e) => Some((Err(TransportError::unavailable(&base, e)), ListState::Done)),
                }
            }
        }).boxed()
    }
}

enum ListState {
    Start,
    Reading(ReadDir),
    Done,
}
