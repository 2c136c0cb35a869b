//! Storage JSON API client
//!
//! Thin, stateless wrapper over the injected transport: URL construction,
//! object-key escaping, bearer-token injection, and the per-operation
//! endpoints the transfer engine drives. One request primitive
//! ([`StorageClient::send`]) parameterized by [`http::Method`] backs every
//! verb.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderValue, Method, header};
use url::Url;

use gs_core::{Error, GsUrl, Result};

use crate::auth::TokenProvider;
use crate::object::{BucketEntry, ListingPage, ObjectEntry};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, RequestBody};

/// Default API endpoint
pub const API_BASE_URL: &str = "https://www.googleapis.com/storage/v1/";
/// Default upload endpoint (resumable and media uploads)
pub const UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/storage/v1/";
/// Default multipart batch endpoint
pub const BATCH_URL: &str = "https://www.googleapis.com/batch/storage/v1";

/// Client for one storage service
#[derive(Clone)]
pub struct StorageClient {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<dyn TokenProvider>,
    api_base: Url,
    upload_base: Url,
    batch_url: Url,
}

impl StorageClient {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            transport,
            tokens,
            api_base: Url::parse(API_BASE_URL).expect("static URL"),
            upload_base: Url::parse(UPLOAD_BASE_URL).expect("static URL"),
            batch_url: Url::parse(BATCH_URL).expect("static URL"),
        }
    }

    /// Point the client at alternate endpoints (emulators, tests)
    pub fn with_endpoints(mut self, api: Url, upload: Url, batch: Url) -> Self {
        self.api_base = api;
        self.upload_base = upload;
        self.batch_url = batch;
        self
    }

    pub fn batch_url(&self) -> &Url {
        &self.batch_url
    }

    /// Percent-encode an object key for use in a URL path segment
    pub fn escape_key(key: &str) -> String {
        urlencoding::encode(key).into_owned()
    }

    /// `b/{bucket}/o/{key}` with the key escaped
    pub fn object_resource(bucket: &str, key: &str) -> String {
        format!(
            "b/{}/o/{}",
            urlencoding::encode(bucket),
            Self::escape_key(key)
        )
    }

    pub fn api_url(&self, resource: &str, query: &[(&str, &str)]) -> Result<Url> {
        Self::build_url(&self.api_base, resource, query)
    }

    pub fn upload_url(&self, resource: &str, query: &[(&str, &str)]) -> Result<Url> {
        Self::build_url(&self.upload_base, resource, query)
    }

    fn build_url(base: &Url, resource: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = base
            .join(resource)
            .map_err(|e| Error::General(format!("building URL for '{resource}': {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter().copied());
        }
        Ok(url)
    }

    /// Send one request with the bearer token attached. Statuses are not
    /// interpreted; callers that only accept success use [`Self::request`].
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse> {
        let token = self.tokens.bearer_token().await?;
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::Auth("bearer token contains invalid characters".to_string()))?;
        request.headers.insert(header::AUTHORIZATION, value);
        self.transport.send(request).await
    }

    /// Send and require a success status
    pub async fn request(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiResponse> {
        let url = self.api_url(resource, query)?;
        self.send(ApiRequest::new(method, url))
            .await?
            .error_for_status()
            .await
    }

    /// Send a JSON body and require a success status
    pub async fn request_json(
        &self,
        method: Method,
        resource: &str,
        query: &[(&str, &str)],
        body: serde_json::Value,
    ) -> Result<ApiResponse> {
        let url = self.api_url(resource, query)?;
        self.send(ApiRequest::new(method, url).body(RequestBody::Json(body)))
            .await?
            .error_for_status()
            .await
    }

    // ---- Objects ----

    /// Object metadata without body
    pub async fn object_metadata(&self, bucket: &str, key: &str) -> Result<ObjectEntry> {
        let resource = Self::object_resource(bucket, key);
        self.request(Method::GET, &resource, &[])
            .await
            .map_err(|e| not_found_as_url(e, bucket, key))?
            .json()
            .await
    }

    /// Object content; `offset` adds a byte-range header starting there
    pub async fn get_media(
        &self,
        bucket: &str,
        key: &str,
        offset: Option<u64>,
    ) -> Result<ApiResponse> {
        let resource = Self::object_resource(bucket, key);
        let url = self.api_url(&resource, &[("alt", "media")])?;
        let mut request = ApiRequest::new(Method::GET, url);
        if let Some(offset) = offset {
            request = request.header("range", &format!("bytes={offset}-"));
        }
        self.send(request)
            .await?
            .error_for_status()
            .await
            .map_err(|e| not_found_as_url(e, bucket, key))
    }

    /// Delete one object. 404 surfaces as [`Error::NotFound`] naming the
    /// gs:// URL so the CLI can offer the recursive-delete fallback.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let resource = Self::object_resource(bucket, key);
        self.request(Method::DELETE, &resource, &[])
            .await
            .map_err(|e| not_found_as_url(e, bucket, key))?;
        Ok(())
    }

    /// Server-side copy
    pub async fn copy_object(&self, src: &GsUrl, dst: &GsUrl) -> Result<ObjectEntry> {
        let resource = format!(
            "b/{}/o/{}/copyTo/b/{}/o/{}",
            urlencoding::encode(&src.bucket),
            Self::escape_key(&src.key),
            urlencoding::encode(&dst.bucket),
            Self::escape_key(&dst.key),
        );
        self.request_json(Method::POST, &resource, &[], serde_json::json!({}))
            .await
            .map_err(|e| not_found_as_url(e, &src.bucket, &src.key))?
            .json()
            .await
    }

    /// Metadata update (custom metadata after an upload completes)
    pub async fn patch_object(
        &self,
        bucket: &str,
        key: &str,
        metadata: serde_json::Value,
    ) -> Result<ObjectEntry> {
        let resource = Self::object_resource(bucket, key);
        self.request_json(Method::PATCH, &resource, &[], metadata)
            .await
            .map_err(|e| not_found_as_url(e, bucket, key))?
            .json()
            .await
    }

    // ---- Uploads ----

    /// Single-shot media upload for payloads of at most one chunk
    pub async fn upload_media(
        &self,
        bucket: &str,
        name: &str,
        content_type: Option<&str>,
        body: Bytes,
    ) -> Result<ObjectEntry> {
        let resource = format!("b/{}/o", urlencoding::encode(bucket));
        let url = self.upload_url(&resource, &[("uploadType", "media"), ("name", name)])?;
        let mut request = ApiRequest::new(Method::POST, url).body(RequestBody::Bytes(body));
        if let Some(ct) = content_type {
            request = request.header("content-type", ct);
        }
        self.send(request)
            .await?
            .error_for_status()
            .await?
            .json()
            .await
    }

    /// Initiate a resumable session; returns the remote session identifier
    pub async fn start_resumable(
        &self,
        bucket: &str,
        name: &str,
        content_type: Option<&str>,
    ) -> Result<String> {
        let resource = format!("b/{}/o", urlencoding::encode(bucket));
        let url = self.upload_url(&resource, &[("uploadType", "resumable")])?;
        let mut body = serde_json::json!({ "name": name });
        if let Some(ct) = content_type {
            body["contentType"] = serde_json::Value::String(ct.to_string());
        }
        let response = self
            .send(ApiRequest::new(Method::POST, url).body(RequestBody::Json(body)))
            .await?
            .error_for_status()
            .await?;
        response
            .header("x-guploader-uploadid")
            .map(|s| s.to_string())
            .ok_or_else(|| {
                Error::General("resumable session response carried no upload id".to_string())
            })
    }

    /// Zero-length status probe asserting the full size. Returns the raw
    /// response: 308 means resumable-with-range, success means the prior
    /// session already finished.
    pub async fn probe_resumable(
        &self,
        bucket: &str,
        upload_id: &str,
        total_size: u64,
    ) -> Result<ApiResponse> {
        let resource = format!("b/{}/o", urlencoding::encode(bucket));
        let url = self.upload_url(
            &resource,
            &[("uploadType", "resumable"), ("upload_id", upload_id)],
        )?;
        let request = ApiRequest::new(Method::PUT, url)
            .header("content-range", &format!("bytes */{total_size}"));
        self.send(request).await
    }

    /// Upload one chunk of a resumable session. Returns the raw response:
    /// 308 between chunks, the object resource on the final one.
    pub async fn put_chunk(
        &self,
        bucket: &str,
        upload_id: &str,
        content_range: &str,
        chunk: Bytes,
    ) -> Result<ApiResponse> {
        let resource = format!("b/{}/o", urlencoding::encode(bucket));
        let url = self.upload_url(
            &resource,
            &[("uploadType", "resumable"), ("upload_id", upload_id)],
        )?;
        let request = ApiRequest::new(Method::PUT, url)
            .header("content-range", content_range)
            .body(RequestBody::Bytes(chunk));
        self.send(request).await
    }

    // ---- Buckets ----

    /// All buckets of a project (drains pagination eagerly; bucket counts
    /// are small compared to object listings)
    pub async fn list_buckets(&self, project: &str) -> Result<Vec<BucketEntry>> {
        let mut buckets = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut query: Vec<(&str, &str)> = vec![("project", project)];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }
            let page: ListingPage<BucketEntry> =
                self.request(Method::GET, "b", &query).await?.json().await?;
            buckets.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(buckets)
    }

    pub async fn create_bucket(
        &self,
        project: &str,
        name: &str,
        location: Option<&str>,
        storage_class: Option<&str>,
    ) -> Result<BucketEntry> {
        let mut body = serde_json::json!({ "name": name });
        if let Some(location) = location {
            body["location"] = serde_json::Value::String(location.to_string());
        }
        if let Some(class) = storage_class {
            body["storageClass"] = serde_json::Value::String(class.to_string());
        }
        self.request_json(Method::POST, "b", &[("project", project)], body)
            .await?
            .json()
            .await
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        let resource = format!("b/{}", urlencoding::encode(name));
        self.request(Method::DELETE, &resource, &[]).await.map_err(|e| {
            if e.is_not_found() {
                Error::NotFound(format!("gs://{name}"))
            } else {
                e
            }
        })?;
        Ok(())
    }
}

fn not_found_as_url(error: Error, bucket: &str, key: &str) -> Error {
    if error.is_not_found() {
        Error::NotFound(format!("gs://{bucket}/{key}"))
    } else {
        error
    }
}
