//! In-memory fake of the storage service for engine tests
//!
//! Speaks just enough of the JSON API for the transfer engine: media and
//! resumable uploads (with probing), media downloads (with ranges),
//! metadata, delete, paginated listing, and the multipart batch endpoint.
//! Every request is logged so tests can assert on the wire traffic.

// Each test binary exercises a different subset of the fake.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};

use gs_core::Result;
use gs_gcs::checksum::{ChecksumAlgorithm, StreamingChecksum, encode_digest};
use gs_gcs::transport::{ApiRequest, ApiResponse, HttpTransport, RequestBody};
use gs_gcs::{StaticTokenProvider, StorageClient};

const GENERATION_BASE: u64 = 1_700_000_000_000_000;
const MEDIA_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct LoggedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub content_range: Option<String>,
    pub range: Option<String>,
    pub body_len: usize,
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
    generation: u64,
}

#[derive(Debug)]
struct UploadSession {
    bucket: String,
    name: String,
    content_type: Option<String>,
    received: Vec<u8>,
    completed: bool,
}

#[derive(Default)]
pub struct FakeRemote {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    sessions: Mutex<HashMap<String, UploadSession>>,
    log: Mutex<Vec<LoggedRequest>>,
    counter: AtomicU64,
    /// Cap listing pages at this many items (0 = unpaginated)
    pub page_size: AtomicU64,
    /// Report bogus digests in upload responses and download headers
    pub corrupt_digests: AtomicBool,
    /// Fail the next resumable probe at the transport level
    pub fail_next_probe: AtomicBool,
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Client wired to this fake
    pub fn client(self: &Arc<Self>) -> StorageClient {
        let transport: Arc<dyn HttpTransport> = self.clone();
        StorageClient::new(transport, Arc::new(StaticTokenProvider::new("test-token")))
    }

    pub fn put_object(&self, bucket: &str, key: &str, data: &[u8]) {
        let generation = self.next_generation();
        self.objects.lock().unwrap().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                data: data.to_vec(),
                content_type: None,
                generation,
            },
        );
    }

    pub fn object_data(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .map(|o| o.data.clone())
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    /// Seed a half-finished resumable session (an "interrupted" upload)
    pub fn seed_session(&self, upload_id: &str, bucket: &str, name: &str, received: &[u8]) {
        self.sessions.lock().unwrap().insert(
            upload_id.to_string(),
            UploadSession {
                bucket: bucket.to_string(),
                name: name.to_string(),
                content_type: None,
                received: received.to_vec(),
                completed: false,
            },
        );
    }

    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.log.lock().unwrap().clone()
    }

    fn next_generation(&self) -> u64 {
        GENERATION_BASE + self.counter.fetch_add(1, Ordering::Relaxed) * 1_000_000
    }

    fn digests_for(&self, data: &[u8]) -> (String, String) {
        if self.corrupt_digests.load(Ordering::Relaxed) {
            // Digests of different content
            let mut md5 = StreamingChecksum::new(ChecksumAlgorithm::Md5);
            md5.update(b"corrupted");
            let mut crc = StreamingChecksum::new(ChecksumAlgorithm::Crc32c);
            crc.update(b"corrupted");
            (
                encode_digest(&md5.finalize()),
                encode_digest(&crc.finalize()),
            )
        } else {
            let mut md5 = StreamingChecksum::new(ChecksumAlgorithm::Md5);
            md5.update(data);
            let mut crc = StreamingChecksum::new(ChecksumAlgorithm::Crc32c);
            crc.update(data);
            (
                encode_digest(&md5.finalize()),
                encode_digest(&crc.finalize()),
            )
        }
    }

    fn object_json(&self, bucket: &str, name: &str, object: &StoredObject) -> serde_json::Value {
        let (md5, crc32c) = self.digests_for(&object.data);
        let updated = jiff::Timestamp::from_second((object.generation / 1_000_000) as i64)
            .unwrap()
            .to_string();
        serde_json::json!({
            "name": name,
            "bucket": bucket,
            "size": object.data.len().to_string(),
            "contentType": object.content_type,
            "updated": updated,
            "md5Hash": md5,
            "crc32c": crc32c,
            "generation": object.generation.to_string(),
        })
    }

    fn json_response(status: StatusCode, value: serde_json::Value) -> ApiResponse {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        ApiResponse::from_bytes(status, headers, value.to_string())
    }

    fn empty_response(status: StatusCode) -> ApiResponse {
        ApiResponse::from_bytes(status, HeaderMap::new(), Bytes::new())
    }

    fn not_found(detail: &str) -> ApiResponse {
        ApiResponse::from_bytes(
            StatusCode::NOT_FOUND,
            HeaderMap::new(),
            format!("Not Found: {detail}"),
        )
    }

    fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let path = request.url.path().to_string();
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();

        if let Some(rest) = path.strip_prefix("/upload/storage/v1/") {
            return self.handle_upload(request, rest, &query);
        }
        if path == "/batch/storage/v1" {
            return self.handle_batch(request);
        }
        if let Some(rest) = path.strip_prefix("/storage/v1/") {
            return self.handle_api(request, rest, &query);
        }
        Self::not_found(&path)
    }

    fn handle_api(
        &self,
        request: &ApiRequest,
        rest: &str,
        query: &HashMap<String, String>,
    ) -> ApiResponse {
        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            ["b", bucket, "o"] if request.method == Method::GET => {
                self.handle_list(bucket, query)
            }
            ["b", bucket, "o", encoded_key] => {
                let key = urlencoding::decode(encoded_key).unwrap().into_owned();
                let method = &request.method;
                if *method == Method::GET
                    && query.get("alt").map(String::as_str) == Some("media")
                {
                    self.handle_media(bucket, &key, request)
                } else if *method == Method::GET {
                    self.handle_metadata(bucket, &key)
                } else if *method == Method::DELETE {
                    self.handle_delete(bucket, &key)
                } else if *method == Method::PATCH {
                    self.handle_patch(bucket, &key, request)
                } else {
                    Self::not_found(rest)
                }
            }
            ["b", src_bucket, "o", src_key, "copyTo", "b", dst_bucket, "o", dst_key]
                if request.method == Method::POST =>
            {
                let src_key = urlencoding::decode(src_key).unwrap().into_owned();
                let dst_key = urlencoding::decode(dst_key).unwrap().into_owned();
                self.handle_copy(src_bucket, &src_key, dst_bucket, &dst_key)
            }
            _ => Self::not_found(rest),
        }
    }

    fn handle_list(&self, bucket: &str, query: &HashMap<String, String>) -> ApiResponse {
        let objects = self.objects.lock().unwrap();
        let prefix = query.get("prefix").cloned().unwrap_or_default();
        let delimiter = query.get("delimiter").cloned();

        let mut keys: Vec<&(String, String)> = objects
            .keys()
            .filter(|(b, k)| b == bucket && k.starts_with(&prefix))
            .collect();
        keys.sort();

        let mut prefixes: Vec<String> = Vec::new();
        let mut item_keys: Vec<&(String, String)> = Vec::new();
        for entry in keys {
            let (_, key) = entry;
            if let Some(delim) = &delimiter
                && let Some(pos) = key[prefix.len()..].find(delim.as_str())
            {
                let group = format!("{}{}", &key[..prefix.len() + pos], delim);
                if prefixes.last() != Some(&group) {
                    prefixes.push(group);
                }
                continue;
            }
            item_keys.push(entry);
        }

        let start: usize = query
            .get("pageToken")
            .and_then(|t| t.parse().ok())
            .unwrap_or(0);
        let mut page_cap = item_keys.len().saturating_sub(start);
        let configured = self.page_size.load(Ordering::Relaxed) as usize;
        if configured > 0 {
            page_cap = page_cap.min(configured);
        }
        if let Some(max) = query.get("maxResults").and_then(|m| m.parse::<usize>().ok()) {
            page_cap = page_cap.min(max);
        }

        let page: Vec<serde_json::Value> = item_keys[start..start + page_cap]
            .iter()
            .map(|(b, k)| self.object_json(b, k, &objects[&(b.clone(), k.clone())]))
            .collect();
        let mut body = serde_json::json!({ "items": page });
        if start == 0 && !prefixes.is_empty() {
            body["prefixes"] = serde_json::json!(prefixes);
        }
        if start + page_cap < item_keys.len() {
            body["nextPageToken"] = serde_json::json!((start + page_cap).to_string());
        }
        Self::json_response(StatusCode::OK, body)
    }

    fn handle_media(&self, bucket: &str, key: &str, request: &ApiRequest) -> ApiResponse {
        let objects = self.objects.lock().unwrap();
        let Some(object) = objects.get(&(bucket.to_string(), key.to_string())) else {
            return Self::not_found(key);
        };

        let offset: usize = request
            .headers
            .get("range")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("bytes="))
            .and_then(|v| v.split('-').next())
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let body = object.data[offset.min(object.data.len())..].to_vec();

        let (md5, crc32c) = self.digests_for(&object.data);
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-goog-hash",
            HeaderValue::from_str(&format!("crc32c={crc32c}, md5={md5}")).unwrap(),
        );
        headers.insert(
            "content-length",
            HeaderValue::from_str(&body.len().to_string()).unwrap(),
        );
        headers.insert(
            "x-goog-generation",
            HeaderValue::from_str(&object.generation.to_string()).unwrap(),
        );

        let status = if offset > 0 {
            StatusCode::PARTIAL_CONTENT
        } else {
            StatusCode::OK
        };
        let chunks: Vec<Result<Bytes>> = body
            .chunks(MEDIA_CHUNK.max(1))
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        ApiResponse::new(status, headers, Box::pin(futures::stream::iter(chunks)))
    }

    fn handle_metadata(&self, bucket: &str, key: &str) -> ApiResponse {
        let objects = self.objects.lock().unwrap();
        match objects.get(&(bucket.to_string(), key.to_string())) {
            Some(object) => {
                Self::json_response(StatusCode::OK, self.object_json(bucket, key, object))
            }
            None => Self::not_found(key),
        }
    }

    fn handle_delete(&self, bucket: &str, key: &str) -> ApiResponse {
        let removed = self
            .objects
            .lock()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        match removed {
            Some(_) => Self::empty_response(StatusCode::NO_CONTENT),
            None => Self::not_found(key),
        }
    }

    fn handle_patch(&self, bucket: &str, key: &str, request: &ApiRequest) -> ApiResponse {
        let mut objects = self.objects.lock().unwrap();
        let Some(object) = objects.get_mut(&(bucket.to_string(), key.to_string())) else {
            return Self::not_found(key);
        };
        if let RequestBody::Json(value) = &request.body
            && let Some(ct) = value.get("contentType").and_then(|v| v.as_str())
        {
            object.content_type = Some(ct.to_string());
        }
        let json = self.object_json(bucket, key, object);
        Self::json_response(StatusCode::OK, json)
    }

    fn handle_copy(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> ApiResponse {
        let mut objects = self.objects.lock().unwrap();
        let Some(source) = objects
            .get(&(src_bucket.to_string(), src_key.to_string()))
            .cloned()
        else {
            return Self::not_found(src_key);
        };
        let copied = StoredObject {
            generation: self.next_generation(),
            ..source
        };
        let json = self.object_json(dst_bucket, dst_key, &copied);
        objects.insert((dst_bucket.to_string(), dst_key.to_string()), copied);
        Self::json_response(StatusCode::OK, json)
    }

    fn handle_upload(
        &self,
        request: &ApiRequest,
        rest: &str,
        query: &HashMap<String, String>,
    ) -> ApiResponse {
        let segments: Vec<&str> = rest.split('/').collect();
        let ["b", bucket, "o"] = segments.as_slice() else {
            return Self::not_found(rest);
        };
        let bucket = bucket.to_string();

        match query.get("uploadType").map(String::as_str) {
            Some("media") if request.method == Method::POST => {
                let Some(name) = query.get("name") else {
                    return Self::not_found("name");
                };
                let RequestBody::Bytes(data) = &request.body else {
                    return Self::empty_response(StatusCode::BAD_REQUEST);
                };
                let object = StoredObject {
                    data: data.to_vec(),
                    content_type: request
                        .headers
                        .get("content-type")
                        .and_then(|v| v.to_str().ok())
                        .map(String::from),
                    generation: self.next_generation(),
                };
                let json = self.object_json(&bucket, name, &object);
                self.objects
                    .lock()
                    .unwrap()
                    .insert((bucket, name.clone()), object);
                Self::json_response(StatusCode::OK, json)
            }
            Some("resumable") if request.method == Method::POST => {
                let RequestBody::Json(body) = &request.body else {
                    return Self::empty_response(StatusCode::BAD_REQUEST);
                };
                let Some(name) = body.get("name").and_then(|v| v.as_str()) else {
                    return Self::empty_response(StatusCode::BAD_REQUEST);
                };
                let upload_id = format!("fake-upload-{}", self.counter.fetch_add(1, Ordering::Relaxed));
                self.sessions.lock().unwrap().insert(
                    upload_id.clone(),
                    UploadSession {
                        bucket,
                        name: name.to_string(),
                        content_type: body
                            .get("contentType")
                            .and_then(|v| v.as_str())
                            .map(String::from),
                        received: Vec::new(),
                        completed: false,
                    },
                );
                let mut headers = HeaderMap::new();
                headers.insert(
                    "x-guploader-uploadid",
                    HeaderValue::from_str(&upload_id).unwrap(),
                );
                ApiResponse::from_bytes(StatusCode::OK, headers, Bytes::new())
            }
            Some("resumable") if request.method == Method::PUT => {
                let Some(upload_id) = query.get("upload_id") else {
                    return Self::not_found("upload_id");
                };
                self.handle_resumable_put(upload_id, request)
            }
            _ => Self::not_found(rest),
        }
    }

    fn handle_resumable_put(&self, upload_id: &str, request: &ApiRequest) -> ApiResponse {
        let content_range = request
            .headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        let mut sessions = self.sessions.lock().unwrap();
        let Some(session) = sessions.get_mut(upload_id) else {
            return Self::not_found(upload_id);
        };

        let is_probe = content_range.starts_with("bytes */");
        if is_probe {
            if session.completed {
                return Self::empty_response(StatusCode::OK);
            }
            let mut headers = HeaderMap::new();
            if !session.received.is_empty() {
                headers.insert(
                    "range",
                    HeaderValue::from_str(&format!("bytes=0-{}", session.received.len() - 1))
                        .unwrap(),
                );
            }
            return ApiResponse::from_bytes(
                StatusCode::PERMANENT_REDIRECT,
                headers,
                Bytes::new(),
            );
        }

        // "bytes {start}-{end}/{total-or-*}"
        let spec = content_range.trim_start_matches("bytes ").to_string();
        let Some((range_part, total_part)) = spec.split_once('/') else {
            return Self::empty_response(StatusCode::BAD_REQUEST);
        };
        let Some((start, _end)) = range_part.split_once('-') else {
            return Self::empty_response(StatusCode::BAD_REQUEST);
        };
        let start: u64 = start.parse().unwrap_or(u64::MAX);
        if start != session.received.len() as u64 {
            return Self::empty_response(StatusCode::RANGE_NOT_SATISFIABLE);
        }
        let RequestBody::Bytes(chunk) = &request.body else {
            return Self::empty_response(StatusCode::BAD_REQUEST);
        };
        session.received.extend_from_slice(chunk);

        let total: Option<u64> = total_part.parse().ok();
        if total == Some(session.received.len() as u64) {
            session.completed = true;
            let object = StoredObject {
                data: std::mem::take(&mut session.received),
                content_type: session.content_type.clone(),
                generation: self.next_generation(),
            };
            let json = self.object_json(&session.bucket, &session.name, &object);
            let bucket = session.bucket.clone();
            let name = session.name.clone();
            drop(sessions);
            self.objects.lock().unwrap().insert((bucket, name), object);
            Self::json_response(StatusCode::OK, json)
        } else {
            Self::empty_response(StatusCode::PERMANENT_REDIRECT)
        }
    }

    fn handle_batch(&self, request: &ApiRequest) -> ApiResponse {
        let RequestBody::Bytes(body) = &request.body else {
            return Self::empty_response(StatusCode::BAD_REQUEST);
        };
        let content_type = request
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        let Some(boundary) = content_type
            .split(';')
            .map(str::trim)
            .find_map(|p| p.strip_prefix("boundary="))
        else {
            return Self::empty_response(StatusCode::BAD_REQUEST);
        };

        let text = String::from_utf8_lossy(body);
        let delimiter = format!("--{boundary}");
        let response_boundary = "fake_batch_response";
        let mut out = String::new();

        for segment in text.split(delimiter.as_str()).skip(1) {
            if segment.starts_with("--") {
                break;
            }
            let part = segment.trim_start_matches("\r\n");
            if part.trim().is_empty() {
                continue;
            }
            let Some((headers, embedded)) = part.split_once("\r\n\r\n") else {
                continue;
            };
            let content_id = headers
                .lines()
                .find_map(|l| l.strip_prefix("Content-ID: <item"))
                .and_then(|l| l.strip_suffix('>'))
                .unwrap_or("0");
            let request_line = embedded.lines().next().unwrap_or_default();
            let mut words = request_line.split_whitespace();
            let method = words.next().unwrap_or_default();
            let url = words.next().unwrap_or_default();

            let status = if method == "DELETE" {
                let key_path = url.strip_prefix("/storage/v1/").unwrap_or(url);
                let segments: Vec<&str> = key_path.split('/').collect();
                if let ["b", bucket, "o", encoded] = segments.as_slice() {
                    let key = urlencoding::decode(encoded).unwrap().into_owned();
                    if self
                        .objects
                        .lock()
                        .unwrap()
                        .remove(&(bucket.to_string(), key))
                        .is_some()
                    {
                        (204, "No Content")
                    } else {
                        (404, "Not Found")
                    }
                } else {
                    (400, "Bad Request")
                }
            } else {
                (400, "Bad Request")
            };

            out.push_str(&format!("--{response_boundary}\r\n"));
            out.push_str("Content-Type: application/http\r\n");
            out.push_str(&format!("Content-ID: <response-item{content_id}>\r\n"));
            out.push_str("\r\n");
            out.push_str(&format!("HTTP/1.1 {} {}\r\n", status.0, status.1));
            out.push_str("Content-Length: 0\r\n");
            out.push_str("\r\n");
            out.push_str("\r\n");
        }
        out.push_str(&format!("--{response_boundary}--\r\n"));

        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_str(&format!(
                "multipart/mixed; boundary={response_boundary}"
            ))
            .unwrap(),
        );
        ApiResponse::from_bytes(StatusCode::OK, headers, out)
    }
}

#[async_trait]
impl HttpTransport for FakeRemote {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let content_range = request
            .headers
            .get("content-range")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        let is_probe = content_range
            .as_deref()
            .is_some_and(|cr| cr.starts_with("bytes */"));
        self.log.lock().unwrap().push(LoggedRequest {
            method: request.method.to_string(),
            path: request.url.path().to_string(),
            query: request.url.query().unwrap_or_default().to_string(),
            content_range,
            range: request
                .headers
                .get("range")
                .and_then(|v| v.to_str().ok())
                .map(String::from),
            body_len: match &request.body {
                RequestBody::Bytes(b) => b.len(),
                _ => 0,
            },
        });

        if is_probe && self.fail_next_probe.swap(false, Ordering::Relaxed) {
            return Err(gs_core::Error::Network("probe connection reset".to_string()));
        }

        Ok(self.handle(&request))
    }
}
