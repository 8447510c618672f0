use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{future, stream, StreamExt};
use parking_lot::Mutex;

use crate::error::TransportError;
use crate::transport::{with_timeout, KeyStream, ResourceMetadata, Transport};
use crate::util::blob::Blob;

/// In-memory resources for tests, counting downloads per location
#[derive(Default)]
pub struct MemoryTransport {
    resources: Mutex<BTreeMap<String, Bytes>>,
    downloads: Mutex<HashMap<String, usize>>,
    announced_sha1: Mutex<HashMap<String, [u8;20]>>,
    unavailable_prefixes: Mutex<Vec<String>>,
    stalled_prefixes: Mutex<Vec<(String, Duration)>>,
}

impl MemoryTransport {
    pub fn new() -> MemoryTransport {
        Default::default()
    }

    pub fn put(&self, location: &str, data: &'static [u8]) {
        self.resources.lock().insert(location.to_string(), Bytes::from_static(data));
    }

    /// the checksum a server would send along with the body
    pub fn announce_sha1(&self, location: &str, sha1: [u8;20]) {
        self.announced_sha1.lock().insert(location.to_string(), sha1);
    }

    /// every request for a location below the prefix fails as if the server was down
    pub fn fail_below(&self, prefix: &str) {
        self.unavailable_prefixes.lock().push(prefix.to_string());
    }

    /// every request for a location below the prefix hangs until it times out
    pub fn stall_below(&self, prefix: &str, timeout: Duration) {
        self.stalled_prefixes.lock().push((prefix.to_string(), timeout));
    }

    pub fn downloads(&self, location: &str) -> usize {
        self.downloads.lock().get(location).copied().unwrap_or(0)
    }

    pub fn total_downloads(&self) -> usize {
        self.downloads.lock().values().sum()
    }

    fn check_available(&self, location: &str) -> Result<(), TransportError> {
        if self.unavailable_prefixes.lock().iter().any(|p| location.starts_with(p.as_str())) {
            return Err(TransportError::unavailable(location, "connection refused"));
        }
        Ok(())
    }

    fn stall_timeout(&self, location: &str) -> Option<Duration> {
        self.stalled_prefixes.lock()
            .iter()
            .find(|(p, _)| location.starts_with(p.as_str()))
            .map(|(_, timeout)| *timeout)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn metadata(&self, location: &str) -> Result<Option<ResourceMetadata>, TransportError> {
        self.check_available(location)?;
        if let Some(timeout) = self.stall_timeout(location) {
            return with_timeout(location, timeout, future::pending()).await;
        }
        Ok(self.resources.lock()
            .get(location)
            .map(|data| ResourceMetadata {
                length: data.len() as u64,
                last_modified: None,
            })
        )
    }

    async fn open(&self, location: &str) -> Result<Blob, TransportError> {
        self.check_available(location)?;
        if let Some(timeout) = self.stall_timeout(location) {
            return with_timeout(location, timeout, future::pending()).await;
        }
        let data = self.resources.lock()
            .get(location)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(location.to_string()))?;

        *self.downloads.lock().entry(location.to_string()).or_default() += 1;
        Ok(Blob {
            data: Box::pin(stream::once(async move { Ok::<_, anyhow::Error>(data) })),
            md5: None,
            sha1: self.announced_sha1.lock().get(location).copied(),
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> KeyStream<'a> {
        let listed: Vec<Result<String, TransportError>> = self.resources.lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .map(|k| Ok(k.clone()))
            .collect();
        stream::iter(listed).boxed()
    }
}
