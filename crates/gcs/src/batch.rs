//! Multipart batch request/response codec
//!
//! The batch endpoint takes N independent sub-requests framed as
//! `multipart/mixed` parts, each an inlined `application/http` request, and
//! answers in kind. Parts are correlated purely by `Content-ID`: requests
//! carry `<item{n}>` with n = index + 1, responses echo
//! `<response-item{n}>`. The wire does not guarantee response ordering, so
//! decode re-orders by recovered index.
//!
//! Decode is all-or-nothing: one non-2xx part fails the whole call with an
//! error naming the offending sub-request. Callers that need partial
//! success submit smaller batches.
//!
//! This module is pure serialization; the only transport touchpoint is
//! [`execute_batch`].

use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use http::{Method, StatusCode};

use gs_core::{Error, Result};

use crate::client::StorageClient;
use crate::transport::{ApiRequest, RequestBody};

/// Upper bound on sub-requests per wire batch
pub const MAX_BATCH_SIZE: usize = 100;

/// One unit of a batch call
#[derive(Debug, Clone)]
pub struct BatchSubRequest {
    pub method: Method,
    /// Path relative to the service root, e.g. `/storage/v1/b/bkt/o/key`
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Bytes>,
}

impl BatchSubRequest {
    /// A single-object delete sub-request
    pub fn delete(bucket: &str, key: &str) -> Self {
        Self {
            method: Method::DELETE,
            url: format!("/storage/v1/{}", StorageClient::object_resource(bucket, key)),
            headers: Vec::new(),
            body: None,
        }
    }
}

/// One decoded part, re-correlated to its request index
#[derive(Debug, Clone)]
pub struct BatchSubResponse {
    pub index: usize,
    pub status: StatusCode,
    pub body: Bytes,
}

/// Encode sub-requests into one multipart body with the given boundary
pub fn encode(boundary: &str, requests: &[BatchSubRequest]) -> Bytes {
    let mut out = String::new();
    for (index, request) in requests.iter().enumerate() {
        out.push_str(&format!("--{boundary}\r\n"));
        out.push_str("Content-Type: application/http\r\n");
        out.push_str(&format!("Content-ID: <item{}>\r\n", index + 1));
        out.push_str("\r\n");
        out.push_str(&format!("{} {} HTTP/1.1\r\n", request.method, request.url));
        for (name, value) in &request.headers {
            out.push_str(&format!("{name}: {value}\r\n"));
        }
        if let Some(body) = &request.body {
            out.push_str(&format!("Content-Length: {}\r\n", body.len()));
            out.push_str("\r\n");
            out.push_str(&String::from_utf8_lossy(body));
        } else {
            out.push_str("\r\n");
        }
        out.push_str("\r\n");
    }
    out.push_str(&format!("--{boundary}--\r\n"));
    Bytes::from(out)
}

/// Extract the boundary parameter from a `multipart/mixed` content-type
pub fn parse_boundary(content_type: &str) -> Result<String> {
    content_type
        .split(';')
        .map(str::trim)
        .find_map(|param| param.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"').to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| {
            Error::BatchCodec(format!(
                "no boundary in response content-type '{content_type}'"
            ))
        })
}

/// Decode a multipart batch response.
///
/// `requests` are the sub-requests that were encoded, used to resolve
/// failures back to a method and URL. Returns the parts ordered by index,
/// or the error for the first (lowest-index) failing part.
pub fn decode(
    content_type: &str,
    body: &[u8],
    requests: &[BatchSubRequest],
) -> Result<Vec<BatchSubResponse>> {
    let boundary = parse_boundary(content_type)?;
    let text = String::from_utf8_lossy(body);
    let delimiter = format!("--{boundary}");

    let mut responses = Vec::new();
    // First segment is the preamble; a segment starting with "--" is the
    // terminator.
    for segment in text.split(delimiter.as_str()).skip(1) {
        if segment.starts_with("--") {
            break;
        }
        let part = segment.trim_start_matches("\r\n");
        if part.trim().is_empty() {
            continue;
        }
        responses.push(decode_part(part, requests.len())?);
    }

    if responses.len() != requests.len() {
        return Err(Error::BatchCodec(format!(
            "expected {} parts in batch response, found {}",
            requests.len(),
            responses.len()
        )));
    }

    responses.sort_by_key(|r| r.index);
    for (position, response) in responses.iter().enumerate() {
        if response.index != position {
            return Err(Error::BatchCodec(format!(
                "duplicate or missing Content-ID for part {position}"
            )));
        }
    }

    if let Some(failed) = responses.iter().find(|r| !r.status.is_success()) {
        let request = &requests[failed.index];
        return Err(Error::Batch {
            index: failed.index,
            method: request.method.to_string(),
            url: request.url.clone(),
            status: failed.status.as_u16(),
        });
    }

    Ok(responses)
}

fn decode_part(part: &str, request_count: usize) -> Result<BatchSubResponse> {
    let (part_headers, embedded) = part
        .split_once("\r\n\r\n")
        .ok_or_else(|| Error::BatchCodec("part without header/payload separator".to_string()))?;

    let content_id = part_headers
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-id")
                .then(|| value.trim().to_string())
        })
        .ok_or_else(|| Error::BatchCodec("part without Content-ID".to_string()))?;
    let index = parse_content_id(&content_id)?;
    if index >= request_count {
        return Err(Error::BatchCodec(format!(
            "Content-ID '{content_id}' is out of range for {request_count} sub-requests"
        )));
    }

    // The payload is an inlined HTTP response: status line, headers, body.
    let (status_line, rest) = embedded
        .split_once("\r\n")
        .ok_or_else(|| Error::BatchCodec("part without embedded status line".to_string()))?;
    let status = parse_status_line(status_line)?;
    let response_body = match rest.split_once("\r\n\r\n") {
        Some((_headers, body)) => body.trim_end_matches("\r\n"),
        None => "",
    };

    Ok(BatchSubResponse {
        index,
        status,
        body: Bytes::from(response_body.to_string()),
    })
}

/// Recover the 0-based request index from an echoed Content-ID.
///
/// Accepts `<response-item{n}>` (the remote convention) and `<item{n}>`,
/// both with n = index + 1.
fn parse_content_id(content_id: &str) -> Result<usize> {
    let inner = content_id.trim().trim_start_matches('<').trim_end_matches('>');
    let numbered = inner
        .strip_prefix("response-item")
        .or_else(|| inner.strip_prefix("item"))
        .ok_or_else(|| Error::BatchCodec(format!("unrecognized Content-ID '{content_id}'")))?;
    let number: usize = numbered
        .parse()
        .map_err(|_| Error::BatchCodec(format!("non-numeric Content-ID '{content_id}'")))?;
    number
        .checked_sub(1)
        .ok_or_else(|| Error::BatchCodec(format!("Content-ID '{content_id}' is zero-based")))
}

fn parse_status_line(line: &str) -> Result<StatusCode> {
    let code = line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| Error::BatchCodec(format!("malformed status line '{line}'")))?;
    code.parse::<u16>()
        .ok()
        .and_then(|c| StatusCode::from_u16(c).ok())
        .ok_or_else(|| Error::BatchCodec(format!("invalid status code in '{line}'")))
}

static BATCH_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_boundary() -> String {
    let n = BATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("batch_gs_{:08}_{n}", std::process::id())
}

/// Encode, POST to the batch endpoint, and decode.
///
/// At most [`MAX_BATCH_SIZE`] sub-requests per call; callers pre-group.
pub async fn execute_batch(
    client: &StorageClient,
    requests: &[BatchSubRequest],
) -> Result<Vec<BatchSubResponse>> {
    if requests.is_empty() {
        return Ok(Vec::new());
    }
    if requests.len() > MAX_BATCH_SIZE {
        return Err(Error::General(format!(
            "batch of {} exceeds the {MAX_BATCH_SIZE} sub-request limit",
            requests.len()
        )));
    }

    let boundary = next_boundary();
    let body = encode(&boundary, requests);
    let request = ApiRequest::new(Method::POST, client.batch_url().clone())
        .header("content-type", &format!("multipart/mixed; boundary={boundary}"))
        .body(RequestBody::Bytes(body));

    let response = client.send(request).await?.error_for_status().await?;
    let content_type = response
        .header("content-type")
        .unwrap_or_default()
        .to_string();
    let payload = response.bytes().await?;
    decode(&content_type, &payload, requests)
}

/// Delete up to [`MAX_BATCH_SIZE`] objects in one wire call
pub async fn bulk_delete(client: &StorageClient, bucket: &str, keys: &[String]) -> Result<()> {
    let requests: Vec<BatchSubRequest> = keys
        .iter()
        .map(|key| BatchSubRequest::delete(bucket, key))
        .collect();
    execute_batch(client, &requests).await?;
    Ok(())
}
