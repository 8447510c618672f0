//! Fixture repositories served over real HTTP on an ephemeral port

use std::collections::{BTreeMap, HashMap};
use std::net::TcpListener;
use std::sync::Arc;

use axum::extract::{Path, RawQuery, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::http::header::{CONTENT_RANGE, RANGE};
use axum::response::{IntoResponse, Response};
use axum::Router;
use axum::routing::get;
use bytes::Bytes;

pub struct FixtureFile {
    body: Bytes,
    headers: Vec<(&'static str, &'static str)>,
}

impl FixtureFile {
    pub fn new(body: &'static [u8]) -> FixtureFile {
        FixtureFile {
            body: Bytes::from_static(body),
            headers: vec![],
        }
    }

    pub fn with_header(mut self, name: &'static str, value: &'static str) -> FixtureFile {
        self.headers.push((name, value));
        self
    }
}

fn ranged(body: &Bytes, request_headers: &HeaderMap, mut response_headers: HeaderMap) -> Response {
    if request_headers.get(RANGE).is_none() {
        return (StatusCode::OK, response_headers, body.clone()).into_response();
    }
    // only 'bytes=0-0' is ever requested
    if body.is_empty() {
        return StatusCode::RANGE_NOT_SATISFIABLE.into_response();
    }
    if let Ok(value) = HeaderValue::try_from(format!("bytes 0-0/{}", body.len())) {
        response_headers.insert(CONTENT_RANGE, value);
    }
    (StatusCode::PARTIAL_CONTENT, response_headers, body.slice(0..1)).into_response()
}

async fn serve_file(
    State(files): State<Arc<HashMap<String, FixtureFile>>>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> Response {
    let path = path.trim_start_matches('/');
    match files.get(path) {
        None => StatusCode::NOT_FOUND.into_response(),
        Some(file) => {
            let mut response_headers = HeaderMap::new();
            for (name, value) in &file.headers {
                response_headers.insert(HeaderName::from_static(*name), HeaderValue::from_static(*value));
            }
            ranged(&file.body, &headers, response_headers)
        }
    }
}

fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener).unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
    format!("http://{}", addr)
}

/// Serves the files at their (repository relative) paths, returns the base URL with a trailing '/'
pub async fn serve(files: Vec<(&str, FixtureFile)>) -> String {
    let files: HashMap<String, FixtureFile> = files.into_iter()
        .map(|(path, file)| (path.to_string(), file))
        .collect();

    let app = Router::new()
        .route("/*path", get(serve_file))
        .with_state(Arc::new(files));
    format!("{}/", spawn(app))
}

struct S3Fixture {
    bucket: String,
    objects: BTreeMap<String, Bytes>,
    page_size: usize,
}

fn s3_error(status: StatusCode, code: &str) -> Response {
    let body = format!(r#"<?xml version="1.0" encoding="UTF-8"?><Error><Code>{}</Code><Message>fixture</Message></Error>"#, code);
    (status, body).into_response()
}

fn query_param(query: &str, name: &str) -> Option<String> {
    query.split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == name)
        .and_then(|(_, v)| percent_encoding::percent_decode_str(v).decode_utf8().ok())
        .map(|v| v.to_string())
}

/// ListObjectsV2 with '/' as delimiter; the continuation token is the index of the next entry
fn list_objects(fixture: &S3Fixture, query: &str) -> Response {
    let prefix = query_param(query, "prefix").unwrap_or_default();
    let start: usize = query_param(query, "continuation-token")
        .and_then(|t| t.parse().ok())
        .unwrap_or(0);

    // (is_common_prefix, name), sorted and deduplicated
    let mut entries: Vec<(bool, String)> = vec![];
    for key in fixture.objects.keys().filter(|k| k.starts_with(&prefix)) {
        let entry = match key[prefix.len()..].find('/') {
            Some(idx) => (true, key[..prefix.len() + idx + 1].to_string()),
            None => (false, key.clone()),
        };
        if !entries.contains(&entry) {
            entries.push(entry);
        }
    }
    entries.sort_by(|a, b| a.1.cmp(&b.1));

    let end = (start + fixture.page_size).min(entries.len());
    let page = &entries[start.min(end)..end];
    let is_truncated = end < entries.len();

    let mut xml = format!(r#"<?xml version="1.0" encoding="UTF-8"?><ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/"><Name>{}</Name><IsTruncated>{}</IsTruncated>"#, fixture.bucket, is_truncated);
    for (_, key) in page.iter().filter(|(is_prefix, _)| !is_prefix) {
        xml.push_str(&format!("<Contents><Key>{}</Key><Size>{}</Size></Contents>", key, fixture.objects[key].len()));
    }
    for (_, prefix) in page.iter().filter(|(is_prefix, _)| *is_prefix) {
        xml.push_str(&format!("<CommonPrefixes><Prefix>{}</Prefix></CommonPrefixes>", prefix));
    }
    if is_truncated {
        xml.push_str(&format!("<NextContinuationToken>{}</NextContinuationToken>", end));
    }
    xml.push_str("</ListBucketResult>");

    (StatusCode::OK, xml).into_response()
}

async fn serve_s3_request(
    State(fixture): State<Arc<S3Fixture>>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let path = path.trim_start_matches('/');
    let (bucket, key) = path.split_once('/').unwrap_or((path, ""));
    if bucket != fixture.bucket {
        return s3_error(StatusCode::NOT_FOUND, "NoSuchBucket");
    }

    if let Some(query) = query.filter(|q| q.contains("list-type=2")) {
        return list_objects(&fixture, &query);
    }

    match fixture.objects.get(key) {
        None => s3_error(StatusCode::NOT_FOUND, "NoSuchKey"),
        Some(body) => ranged(body, &headers, HeaderMap::new()),
    }
}

/// A path-style S3 emulator holding one bucket, returns the endpoint URL
pub async fn serve_s3(bucket: &str, objects: BTreeMap<String, Bytes>, page_size: usize) -> String {
    let fixture = S3Fixture {
        bucket: bucket.to_string(),
        objects,
        page_size,
    };

    let app = Router::new()
        .route("/*path", get(serve_s3_request))
        .with_state(Arc::new(fixture));
    spawn(app)
}
