use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use futures::{stream, StreamExt, TryStreamExt};
use hyper::{Body, Client, Method, Request, Response, StatusCode, Uri};
use hyper::body::to_bytes;
use hyper::client::HttpConnector;
use hyper::header::{HOST, RANGE, USER_AGENT};
use hyper_tls::HttpsConnector;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use tracing::{trace, warn};

use crate::error::TransportError;
use crate::transport::{Credentials, https_connector, KeyStream, ResourceMetadata, Transport, TransportOptions, timed_stream, with_timeout};
use crate::transport::aws_sigv4::{canonical_query, encode_path, sign_get, SigningKeys};
use crate::transport::http::{content_length, hex_header, last_modified};
use crate::util::blob::Blob;

const DEFAULT_REGION: &str = "us-east-1";

lazy_static! {
    static ref REGIONAL_ENDPOINT_REGEX: Regex = Regex::new(r"^s3://(.+)\.s3[.-]([a-z0-9-]+)\.amazonaws\.com(\.[a-z]+)?/(.*)$").unwrap();
    static ref GLOBAL_ENDPOINT_REGEX: Regex = Regex::new(r"^s3://(.+)\.s3\.amazonaws\.com/(.*)$").unwrap();
    static ref ENDPOINT_REGION_REGEX: Regex = Regex::new(r"s3[.-]([a-z0-9-]+)\.amazonaws\.com").unwrap();
}

/// Bucket and key of an `s3://` location, plus the region if the location names one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Location {
    pub bucket: String,
    pub key: String,
    pub region: Option<String>,
}

impl S3Location {
    /// Understands plain `s3://bucket/key` as well as virtual-hosted AWS endpoints like
    ///  `s3://bucket.s3-us-west-2.amazonaws.com/key`
    pub fn parse(location: &str) -> Result<S3Location, TransportError> {
        if let Some(captures) = GLOBAL_ENDPOINT_REGEX.captures(location) {
            return Ok(S3Location {
                bucket: captures[1].to_string(),
                key: captures[2].to_string(),
                region: Some(DEFAULT_REGION.to_string()),
            });
        }

        if let Some(captures) = REGIONAL_ENDPOINT_REGEX.captures(location) {
            let region = match &captures[2] {
                // legacy alias of the original 'US Standard' region
                "external-1" => DEFAULT_REGION,
                region => region,
            };
            return Ok(S3Location {
                bucket: captures[1].to_string(),
                key: captures[4].to_string(),
                region: Some(region.to_string()),
            });
        }

        let rest = location.strip_prefix("s3://")
            .ok_or_else(|| TransportError::unavailable(location, "not an s3:// location"))?;
        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(TransportError::unavailable(location, "no bucket in s3:// location"));
        }
        Ok(S3Location {
            bucket: bucket.to_string(),
            key: key.to_string(),
            region: None,
        })
    }
}

#[derive(Debug, Clone)]
struct Endpoint {
    /// scheme and authority, without trailing '/'
    base: String,
    host: String,
    region: String,
}

struct PreparedRequest {
    uri: String,
    host: String,
    /// encoded
    path: String,
    query: String,
    region: String,
}

/// S3 compatible object storage. Objects are addressed virtual-hosted style on AWS, and path style
///  when an explicit endpoint is configured.
pub struct S3Transport {
    client: Client<HttpsConnector<HttpConnector>>,
    credentials: Option<(String, String, Option<String>)>,
    endpoint: Option<Endpoint>,
    timeout: Duration,
}

impl S3Transport {
    pub fn new(credentials: Option<&Credentials>, options: &TransportOptions) -> anyhow::Result<S3Transport> {
        let credentials = match credentials {
            Some(Credentials::Aws { access_key, secret_key, session_token }) => Some((access_key.clone(), secret_key.clone(), session_token.clone())),
            Some(Credentials::Password { .. }) => return Err(anyhow!("S3 repositories require AWS credentials (access key and secret key)")),
            None => None,
        };

        let endpoint = match &options.s3_endpoint {
            Some(endpoint) => {
                let base = endpoint.trim_end_matches('/').to_string();
                let uri = Uri::try_from(base.as_str())?;
                let host = uri.authority()
                    .ok_or_else(|| anyhow!("S3 endpoint {} has no host", endpoint))?
                    .to_string();
                let region = ENDPOINT_REGION_REGEX.captures(&host)
                    .map(|c| c[1].to_string())
                    .unwrap_or_else(|| DEFAULT_REGION.to_string());
                Some(Endpoint { base, host, region })
            }
            None => None,
        };

        Ok(S3Transport {
            client: Client::builder()
                .build::<_, Body>(https_connector(options.s3_insecure_tls)?),
            credentials,
            endpoint,
            timeout: options.timeout,
        })
    }

    fn prepare(&self, location: &S3Location, key: Option<&str>, query: &[(&str, &str)]) -> PreparedRequest {
        let region = location.region.clone()
            .or_else(|| self.endpoint.as_ref().map(|e| e.region.clone()))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());
        let object_path = match key {
            Some(key) => format!("/{}", key),
            None => "/".to_string(),
        };

        let (base, host, path) = match &self.endpoint {
            Some(endpoint) => (endpoint.base.clone(), endpoint.host.clone(), encode_path(&format!("/{}{}", location.bucket, object_path))),
            // virtual-hosted style does not work with TLS for bucket names containing dots
            None if location.bucket.contains('.') => {
                let host = format!("s3.{}.amazonaws.com", region);
                (format!("https://{}", host), host, encode_path(&format!("/{}{}", location.bucket, object_path)))
            }
            None => {
                let host = format!("{}.s3.{}.amazonaws.com", location.bucket, region);
                (format!("https://{}", host), host, encode_path(&object_path))
            }
        };

        let query = canonical_query(query);
        let uri = if query.is_empty() {
            format!("{}{}", base, path)
        }
        else {
            format!("{}{}?{}", base, path, query)
        };

        PreparedRequest { uri, host, path, query, region }
    }

    async fn get(&self, location: &str, prepared: PreparedRequest, range: Option<&'static str>) -> Result<Response<Body>, TransportError> {
        let mut builder = Request::builder()
            .method(Method::GET)
            .uri(Uri::try_from(prepared.uri.as_str()).map_err(|e| TransportError::unavailable(location, e))?)
            .header(HOST, prepared.host.as_str())
            .header(USER_AGENT, super::USER_AGENT);
        if let Some(range) = range {
            builder = builder.header(RANGE, range);
        }

        if let Some((access_key, secret_key, session_token)) = &self.credentials {
            let keys = SigningKeys {
                access_key,
                secret_key,
                session_token: session_token.as_deref(),
            };
            let extra_headers: Vec<(&str, &str)> = range.iter().map(|r| ("range", *r)).collect();
            let signed = sign_get(&keys, &prepared.region, &prepared.host, &prepared.path, &prepared.query, &extra_headers, Utc::now())
                .map_err(|e| TransportError::unavailable(location, e))?;
            for (name, value) in signed {
                builder = builder.header(name, value);
            }
        }

        let request = builder.body(Body::empty())
            .map_err(|e| TransportError::unavailable(location, e))?;

        trace!("getting {} as {} {:?}", location, prepared.uri, range);

        with_timeout(location, self.timeout, async {
            self.client.request(request)
                .await
                .map_err(|e| TransportError::unavailable(location, e))
        }).await
    }

    /// S3 reports details in an XML body: missing keys are a normal outcome, a missing bucket is not
    async fn error_code(&self, location: &str, response: Response<Body>) -> String {
        let body = with_timeout(location, self.timeout, async {
            to_bytes(response.into_body())
                .await
                .map_err(|e| TransportError::unavailable(location, e))
        }).await;

        body.ok()
            .and_then(|body| serde_xml_rs::from_reader::<_, ErrorResponse>(body.as_ref()).ok())
            .map(|e| e.code)
            .unwrap_or_default()
    }

    async fn list_page(&self, location: &S3Location, continuation_token: Option<&str>) -> Result<ListBucketResult, TransportError> {
        let mut query = vec![("list-type", "2"), ("prefix", location.key.as_str()), ("delimiter", "/")];
        if let Some(token) = continuation_token {
            query.push(("continuation-token", token));
        }
        let display_location = format!("s3://{}/{}", location.bucket, location.key);
        let prepared = self.prepare(location, None, &query);

        let response = self.get(&display_location, prepared, None).await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            let code = self.error_code(&display_location, response).await;
            return Err(TransportError::unavailable(&display_location, format!("listing failed: {}", code)));
        }
        if !status.is_success() {
            return Err(TransportError::unavailable(&display_location, format!("listing failed with status {}", status)));
        }

        let body = with_timeout(&display_location, self.timeout, async {
            to_bytes(response.into_body())
                .await
                .map_err(|e| TransportError::unavailable(&display_location, e))
        }).await?;

        serde_xml_rs::from_reader(body.as_ref())
            .map_err(|e| TransportError::unavailable(&display_location, format!("malformed listing: {}", e)))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorResponse {
    code: String,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    contents: Vec<ListedObject>,
    #[serde(default)]
    common_prefixes: Vec<CommonPrefix>,
    #[serde(default)]
    next_continuation_token: Option<String>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct ListedObject {
    key: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "PascalCase")]
struct CommonPrefix {
    prefix: String,
}

#[async_trait]
impl Transport for S3Transport {
    async fn metadata(&self, location: &str) -> Result<Option<ResourceMetadata>, TransportError> {
        let parsed = S3Location::parse(location)?;
        let prepared = self.prepare(&parsed, Some(&parsed.key), &[]);

        // a zero-byte ranged fetch tells a missing key apart from an empty object
        let response = self.get(location, prepared, Some("bytes=0-0")).await?;
        match response.status() {
            StatusCode::OK | StatusCode::PARTIAL_CONTENT => Ok(Some(ResourceMetadata {
                length: content_length(response.headers()).unwrap_or(0),
                last_modified: last_modified(response.headers()),
            })),
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(Some(ResourceMetadata {
                length: 0,
                last_modified: last_modified(response.headers()),
            })),
            StatusCode::NOT_FOUND => match self.error_code(location, response).await.as_str() {
                "NoSuchKey" | "" => Ok(None),
                code => Err(TransportError::unavailable(location, code)),
            },
            status => Err(TransportError::unavailable(location, format!("unexpected status {}", status))),
        }
    }

    async fn open(&self, location: &str) -> Result<Blob, TransportError> {
        let parsed = S3Location::parse(location)?;
        let prepared = self.prepare(&parsed, Some(&parsed.key), &[]);

        let response = self.get(location, prepared, None).await?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return match self.error_code(location, response).await.as_str() {
                "NoSuchKey" | "" => Err(TransportError::NotFound(location.to_string())),
                code => Err(TransportError::unavailable(location, code)),
            },
            status => return Err(TransportError::unavailable(location, format!("unexpected status {}", status))),
        }

        // the ETag of a single-part upload is the body's MD5
        let md5 = hex_header::<[u8;16]>(response.headers(), "etag");
        let data = Box::pin(response.into_body().map_err(anyhow::Error::from));

        Ok(Blob {
            data: timed_stream(data, location, self.timeout),
            md5,
            sha1: None,
        })
    }

    /// Lists keys directly below the prefix, page by page. Common prefixes ("directories") of a page
    ///  come before its keys.
    fn list<'a>(&'a self, prefix: &'a str) -> KeyStream<'a> {
        let location = match S3Location::parse(prefix) {
            Ok(location) => location,
            Err(e) => return stream::once(async { Err(e) }).boxed(),
        };

        // state: None when done, Some(None) for the first page
        stream::unfold(Some(None::<String>), move |state| {
            let location = location.clone();
            async move {
                let continuation_token = state?;
                match self.list_page(&location, continuation_token.as_deref()).await {
                    Ok(page) => {
                        let next = match (page.is_truncated, page.next_continuation_token) {
                            (true, Some(token)) => Some(Some(token)),
                            (true, None) => {
                                warn!("truncated listing of {} without continuation token", prefix);
                                None
                            }
                            (false, _) => None,
                        };

                        let keys: Vec<String> = page.common_prefixes.into_iter()
                            .map(|p| p.prefix)
                            .chain(page.contents.into_iter().map(|o| o.key))
                            .collect();
                        Some((Ok(keys), next))
                    }
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
            .map_ok(|keys| stream::iter(keys.into_iter().map(Ok::<String, TransportError>)))
            .try_flatten()
            .boxed()
    }
}
