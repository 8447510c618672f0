//! AWS Signature Version 4 for (payload-less) S3 requests.
//!
//! See https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-header-based-auth.html

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Everything except the RFC 3986 unreserved characters
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');
const PATH_ENCODE_SET: &AsciiSet = &QUERY_ENCODE_SET.remove(b'/');

/// sha256 of an empty body
pub const EMPTY_PAYLOAD_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

pub struct SigningKeys<'a> {
    pub access_key: &'a str,
    pub secret_key: &'a str,
    pub session_token: Option<&'a str>,
}

pub fn encode_path(raw: &str) -> String {
    utf8_percent_encode(raw, PATH_ENCODE_SET).to_string()
}

/// Query string in canonical form: encoded, sorted by name. The same string is used for the
///  actual request so that it matches what was signed.
pub fn canonical_query(params: &[(&str, &str)]) -> String {
    let mut encoded: Vec<(String, String)> = params.iter()
        .map(|(k, v)| (utf8_percent_encode(k, QUERY_ENCODE_SET).to_string(), utf8_percent_encode(v, QUERY_ENCODE_SET).to_string()))
        .collect();
    encoded.sort();
    encoded.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// Returns the headers to add to a GET request: `x-amz-date`, `x-amz-content-sha256`, the session
///  token if any, and `authorization`.
///
/// `path` must already be URI-encoded, `extra_headers` are signed as well (e.g. `range`).
pub fn sign_get(
    keys: &SigningKeys,
    region: &str,
    host: &str,
    path: &str,
    query: &str,
    extra_headers: &[(&str, &str)],
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<(String, String)>> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();

    let mut headers: Vec<(String, String)> = vec![
        ("host".to_string(), host.to_string()),
        ("x-amz-content-sha256".to_string(), EMPTY_PAYLOAD_HASH.to_string()),
        ("x-amz-date".to_string(), amz_date.clone()),
    ];
    if let Some(token) = keys.session_token {
        headers.push(("x-amz-security-token".to_string(), token.to_string()));
    }
    for (name, value) in extra_headers {
        headers.push((name.to_ascii_lowercase(), value.trim().to_string()));
    }
    headers.sort();

    let canonical_headers: String = headers.iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect();
    let signed_headers = headers.iter()
        .map(|(k, _)| k.as_str())
        .collect::<Vec<_>>()
        .join(";");

    let canonical_request = format!(
        "GET\n{}\n{}\n{}\n{}\n{}",
        path, query, canonical_headers, signed_headers, EMPTY_PAYLOAD_HASH,
    );

    let scope = format!("{}/{}/s3/aws4_request", date, region);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date, scope, hex::encode(Sha256::digest(canonical_request.as_bytes())),
    );

    let k_date = hmac(format!("AWS4{}", keys.secret_key).as_bytes(), date.as_bytes())?;
    let k_region = hmac(&k_date, region.as_bytes())?;
    let k_service = hmac(&k_region, b"s3")?;
    let k_signing = hmac(&k_service, b"aws4_request")?;
    let signature = hex::encode(hmac(&k_signing, string_to_sign.as_bytes())?);

    let mut result: Vec<(String, String)> = headers.into_iter()
        .filter(|(k, _)| k.starts_with("x-amz-"))
        .collect();
    result.push((
        "authorization".to_string(),
        format!("AWS4-HMAC-SHA256 Credential={}/{},SignedHeaders={},Signature={}", keys.access_key, scope, signed_headers, signature),
    ));
    Ok(result)
}

fn hmac(key: &[u8], data: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| anyhow!("invalid HMAC key length"))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
