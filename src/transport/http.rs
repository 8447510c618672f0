use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use futures::{stream, StreamExt, TryStreamExt};
use hex::FromHex;
use hyper::{Body, Client, HeaderMap, Method, Request, Response, StatusCode, Uri};
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, ETAG, HeaderValue, LAST_MODIFIED, RANGE, USER_AGENT};
use hyper_tls::HttpsConnector;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::trace;

use crate::error::TransportError;
use crate::transport::{https_connector, KeyStream, ResourceMetadata, Transport, timed_stream, with_timeout, Credentials};
use crate::util::blob::Blob;

lazy_static! {
    static ref HREF_REGEX: Regex = Regex::new(r#"href="([^"]+)""#).unwrap();
}

/// Plain HTTP(S) repositories, checking the body's integrity against a hashcode if one is returned
///  in a header.
///
/// Instances do HTTP connection caching internally, so keeping them alive has performance benefits.
pub struct HttpTransport {
    client: Client<HttpsConnector<HttpConnector>>,
    authorization: Option<HeaderValue>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(credentials: Option<&Credentials>, timeout: Duration) -> anyhow::Result<HttpTransport> {
        let authorization = match credentials {
            Some(Credentials::Password { username, password }) => {
                let encoded = STANDARD.encode(format!("{}:{}", username, password));
                let mut value = HeaderValue::try_from(format!("Basic {}", encoded))?;
                value.set_sensitive(true);
                Some(value)
            }
            // cloud storage keys are meaningless for a plain HTTP server
            Some(Credentials::Aws { .. }) | None => None,
        };

        Ok(HttpTransport {
            client: Client::builder()
                .build::<_, Body>(https_connector(false)?),
            authorization,
            timeout,
        })
    }

    async fn get(&self, location: &str, range: Option<&'static str>) -> Result<Response<Body>, TransportError> {
        let uri = Uri::try_from(location)
            .map_err(|e| TransportError::unavailable(location, e))?;

        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(uri)
            // Maven Central returns a 403 without a user agent
            .header(USER_AGENT, super::USER_AGENT);
        if let Some(authorization) = &self.authorization {
            builder = builder.header(AUTHORIZATION, authorization.clone());
        }
        if let Some(range) = range {
            builder = builder.header(RANGE, range);
        }
        let request = builder.body(Body::empty())
            .map_err(|e| TransportError::unavailable(location, e))?;

        trace!("getting {} {:?}", location, range);

        with_timeout(location, self.timeout, async {
            self.client.request(request)
                .await
                .map_err(|e| TransportError::unavailable(location, e))
        }).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn metadata(&self, location: &str) -> Result<Option<ResourceMetadata>, TransportError> {
        // a zero-byte ranged fetch tells a missing resource apart from an empty one
        let response = self.get(location, Some("bytes=0-0")).await?;

        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => Ok(Some(ResourceMetadata {
                length: content_length(response.headers()).unwrap_or(0),
                last_modified: last_modified(response.headers()),
            })),
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(Some(ResourceMetadata {
                length: 0,
                last_modified: last_modified(response.headers()),
            })),
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            status => Err(TransportError::unavailable(location, format!("unexpected status {}", status))),
        }
    }

    async fn open(&self, location: &str) -> Result<Blob, TransportError> {
        let response = self.get(location, None).await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND | StatusCode::GONE => return Err(TransportError::NotFound(location.to_string())),
            status => return Err(TransportError::unavailable(location, format!("unexpected status {}", status))),
        }

        let (sha1, md5) = announced_checksums(response.headers());
        let data = Box::pin(response.into_body().map_err(anyhow::Error::from));

        Ok(Blob {
            data: timed_stream(data, location, self.timeout),
            md5,
            sha1,
        })
    }

    /// Scrapes the links of a directory index page. Only links below the prefix are returned.
    fn list<'a>(&'a self, prefix: &'a str) -> KeyStream<'a> {
        stream::once(async move {
            let response = self.get(prefix, None).await?;
            match response.status() {
                StatusCode::OK => {}
                StatusCode::NOT_FOUND | StatusCode::GONE => return Ok(vec![]),
                status => return Err(TransportError::unavailable(prefix, format!("unexpected status {}", status))),
            }

            let page = with_timeout(prefix, self.timeout, async {
                to_bytes(response.into_body())
                    .await
                    .map_err(|e| TransportError::unavailable(prefix, e))
            }).await?;

            Ok(index_entries(prefix, &String::from_utf8_lossy(&page)))
        })
            .map_ok(|entries| stream::iter(entries.into_iter().map(Ok::<String, TransportError>)))
            .try_flatten()
            .boxed()
    }
}

fn index_entries(prefix: &str, page: &str) -> Vec<String> {
    let mut result = Vec::new();
    for captures in HREF_REGEX.captures_iter(page) {
        let href = &captures[1];
        if href.starts_with('?') || href.starts_with('#') || href.starts_with("..") {
            continue;
        }

        let absolute = if href.contains("://") {
            href.to_string()
        }
        else if href.starts_with('/') {
            // server-absolute link: only usable if it points below the prefix
            match prefix.find("://").and_then(|i| prefix[i + 3..].find('/').map(|j| i + 3 + j)) {
                Some(path_start) => format!("{}{}", &prefix[..path_start], href),
                None => continue,
            }
        }
        else {
            format!("{}{}", prefix, href)
        };

        if absolute.starts_with(prefix) && absolute.len() > prefix.len() && !result.contains(&absolute) {
            result.push(absolute);
        }
    }
    result
}

pub(crate) fn content_length(headers: &HeaderMap) -> Option<u64> {
    // 'Content-Range: bytes 0-0/1234' carries the full length of a ranged response
    let from_range = headers.get(CONTENT_RANGE)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.rsplit_once('/'))
        .and_then(|(_, total)| total.parse().ok());

    from_range.or_else(|| headers.get(CONTENT_LENGTH)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.parse().ok())
    )
}

pub(crate) fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    headers.get(LAST_MODIFIED)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| DateTime::parse_from_rfc2822(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// sha1 and md5 announced by the server, e.g. by Artifactory, Nexus or Google Cloud Storage.
///  Header values that are not valid hex hashes are ignored.
pub(crate) fn announced_checksums(headers: &HeaderMap) -> (Option<[u8;20]>, Option<[u8;16]>) {
    let sha1 = hex_header::<[u8;20]>(headers, "x-checksum-sha1")
        .or_else(|| hex_header(headers, "x-goog-meta-checksum-sha1"))
        .or_else(|| hex_header(headers, ETAG.as_str()));

    let md5 = hex_header::<[u8;16]>(headers, "x-checksum-md5")
        .or_else(|| hex_header(headers, "x-goog-meta-checksum-md5"));

    (sha1, md5)
}

pub(crate) fn hex_header<T: FromHex>(headers: &HeaderMap, name: &str) -> Option<T> {
    let value = headers.get(name)?
        .to_str()
        .ok()?
        .trim_start_matches("W/")
        .trim_matches('"');

    match T::from_hex(value) {
        Ok(hash) => Some(hash),
        Err(_) => {
            trace!("ignoring header {}: {:?} is not a hash of the expected length", name, value);
            None
        }
    }
}
