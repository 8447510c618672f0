//! Wire-level access to repository resources.
//!
//! Resources are addressed by absolute locations (`https://...`, `s3://...`, `file:...`). A
//!  repository gets one [Transport] chosen by the scheme of its base location.

pub mod aws_sigv4;
pub mod file;
pub mod http;
#[cfg(test)]
pub mod memory;
pub mod s3;

use std::fmt::{Debug, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use hyper::client::HttpConnector;
use hyper_tls::HttpsConnector;
use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::transport::file::FileTransport;
use crate::transport::http::HttpTransport;
use crate::transport::s3::S3Transport;
use crate::util::blob::{Blob, ByteStream};

pub const USER_AGENT: &str = concat!("arti-lock/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub length: u64,
    pub last_modified: Option<DateTime<Utc>>,
}

/// A lazy, finite listing. Every call to [Transport::list] starts over, nothing is cached.
pub type KeyStream<'a> = BoxStream<'a, Result<String, TransportError>>;

#[async_trait]
pub trait Transport: Send + Sync {
    /// `None` if the resource does not exist
    async fn metadata(&self, location: &str) -> Result<Option<ResourceMetadata>, TransportError>;

    async fn exists(&self, location: &str) -> Result<bool, TransportError> {
        Ok(self.metadata(location).await?.is_some())
    }

    /// Fails with [TransportError::NotFound] if the resource does not exist
    async fn open(&self, location: &str) -> Result<Blob, TransportError>;

    /// Entries are returned the way the backend names them: object keys for S3, absolute
    ///  locations otherwise.
    fn list<'a>(&'a self, prefix: &'a str) -> KeyStream<'a>;
}

#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged, rename_all = "camelCase")]
pub enum Credentials {
    Password {
        username: String,
        password: String,
    },
    #[serde(rename_all = "camelCase")]
    Aws {
        access_key: String,
        secret_key: String,
        #[serde(default)]
        session_token: Option<String>,
    },
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Password { username, .. } => write!(f, "Password {{ username: {:?}, password: *** }}", username),
            Credentials::Aws { access_key, session_token, .. } => write!(
                f,
                "Aws {{ access_key: {:?}, secret_key: ***, session_token: {} }}",
                access_key,
                if session_token.is_some() { "***" } else { "None" },
            ),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// deadline for every single network call
    pub timeout: Duration,
    pub s3_endpoint: Option<String>,
    /// only ever for isolated test environments
    pub s3_insecure_tls: bool,
}

impl Default for TransportOptions {
    fn default() -> Self {
        TransportOptions {
            timeout: Duration::from_secs(60),
            s3_endpoint: None,
            s3_insecure_tls: false,
        }
    }
}

pub fn scheme(location: &str) -> Option<&str> {
    location.split_once(':').map(|(scheme, _)| scheme)
}

pub fn is_local(location: &str) -> bool {
    scheme(location) == Some("file")
}

/// Creates the transport for a repository based on the scheme of its base location
pub fn connect(base_location: &str, credentials: Option<&Credentials>, options: &TransportOptions) -> anyhow::Result<Arc<dyn Transport>> {
    match scheme(base_location) {
        Some("http") | Some("https") => Ok(Arc::new(HttpTransport::new(credentials, options.timeout)?)),
        Some("s3") => Ok(Arc::new(S3Transport::new(credentials, options)?)),
        Some("file") => Ok(Arc::new(FileTransport::new())),
        _ => Err(anyhow!("unknown repository URL scheme: {}", base_location)),
    }
}

/// Downloads a resource completely, e.g. for metadata that gets parsed
pub async fn read_all(transport: &dyn Transport, location: &str) -> Result<Bytes, TransportError> {
    let blob = transport.open(location).await?;
    let chunks: Vec<Bytes> = blob.data
        .try_collect()
        .await
        .map_err(|e| stream_error(location, e))?;
    Ok(chunks.concat().into())
}

/// Recovers a transport error that was tunneled through a byte stream
pub fn stream_error(location: &str, e: anyhow::Error) -> TransportError {
    match e.downcast::<TransportError>() {
        Ok(transport_error) => transport_error,
        Err(e) => TransportError::unavailable(location, e),
    }
}

pub(crate) async fn with_timeout<T>(
    location: &str,
    after: Duration,
    f: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match tokio::time::timeout(after, f).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::TimedOut {
            location: location.to_string(),
            after,
        }),
    }
}

/// Applies the per-call deadline to every chunk of a body, so a stalled download fails instead of
///  hanging. The timeout is tunneled through the stream as a [TransportError].
pub(crate) fn timed_stream(data: ByteStream, location: &str, after: Duration) -> ByteStream {
    let location = location.to_string();
    Box::pin(futures::stream::unfold(Some(data), move |state| {
        let location = location.clone();
        async move {
            let mut data = state?;
            match tokio::time::timeout(after, data.next()).await {
                Ok(Some(item)) => Some((item, Some(data))),
                Ok(None) => None,
                Err(_) => Some((Err(anyhow::Error::new(TransportError::TimedOut { location, after })), None)),
            }
        }
    }))
}

pub(crate) fn https_connector(insecure_tls: bool) -> anyhow::Result<HttpsConnector<HttpConnector>> {
    if !insecure_tls {
        return Ok(HttpsConnector::new());
    }

    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()?;
    let mut http = HttpConnector::new();
    http.enforce_http(false);
    Ok(HttpsConnector::from((http, tokio_native_tls::TlsConnector::from(tls))))
}
