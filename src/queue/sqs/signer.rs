//! AWS Signature Version 4 for the SQS JSON protocol.
//!
//! Only the fixed header set sent by [`super::SqsClient`] is signed:
//! `content-type`, `host`, `x-amz-date` and `x-amz-target`, over path `/`
//! with an empty query string.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::models::errors::SigningError;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";
pub const SIGNED_HEADERS: &str = "content-type;host;x-amz-date;x-amz-target";
const TERMINATOR: &str = "aws4_request";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Everything that goes into one signature.
#[derive(Debug, Clone)]
pub struct SigningParams<'a> {
    pub method: &'a str,
    pub host: &'a str,
    pub content_type: &'a str,
    pub target: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    pub payload: &'a [u8],
    pub timestamp: DateTime<Utc>,
}

/// `YYYYMMDDThhmmssZ`
pub fn amz_date(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y%m%dT%H%M%SZ").to_string()
}

fn date_stamp(amz_date: &str) -> &str {
    &amz_date[..8]
}

fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, SigningError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|_| SigningError::InvalidKey { length: key.len() })?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

pub fn canonical_request(params: &SigningParams<'_>, amz_date: &str) -> String {
    format!(
        "{method}\n/\n\ncontent-type:{content_type}\nhost:{host}\nx-amz-date:{amz_date}\nx-amz-target:{target}\n\n{signed_headers}\n{payload_hash}",
        method = params.method,
        content_type = params.content_type,
        host = params.host,
        amz_date = amz_date,
        target = params.target,
        signed_headers = SIGNED_HEADERS,
        payload_hash = hex_sha256(params.payload),
    )
}

pub fn credential_scope(date_stamp: &str, region: &str, service: &str) -> String {
    format!("{date_stamp}/{region}/{service}/{TERMINATOR}")
}

pub fn string_to_sign(canonical_request: &str, amz_date: &str, scope: &str) -> String {
    format!(
        "{ALGORITHM}\n{amz_date}\n{scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    )
}

/// kDate -> kRegion -> kService -> kSigning
pub fn signing_key(
    secret_access_key: &str,
    date_stamp: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, SigningError> {
    let k_date = hmac_sha256(
        format!("AWS4{secret_access_key}").as_bytes(),
        date_stamp.as_bytes(),
    )?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, TERMINATOR.as_bytes())
}

/// Builds the `Authorization` header value for a request.
///
/// Credentials are not validated here; an empty key still produces a
/// signature, which the service will reject.
pub fn authorization_header(
    credentials: &Credentials,
    params: &SigningParams<'_>,
) -> Result<String, SigningError> {
    let amz_date = amz_date(&params.timestamp);
    let date_stamp = date_stamp(&amz_date);
    let scope = credential_scope(date_stamp, params.region, params.service);

    let canonical_request = canonical_request(params, &amz_date);
    let string_to_sign = string_to_sign(&canonical_request, &amz_date, &scope);
    let key = signing_key(
        &credentials.secret_access_key,
        date_stamp,
        params.region,
        params.service,
    )?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    Ok(format!(
        "{ALGORITHM} Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
        credentials.access_key_id
    ))
}
