//! Resumable upload state machine
//!
//! Drives one local file (or pipe) to one remote object:
//!
//! ```text
//! Start → ResolveSession → Uploading → Verifying → {Completed | FailedChecksum}
//! ```
//!
//! Files of at most one chunk skip the resumable path entirely and go up as
//! a single media request. Larger files get a resumable session whose id is
//! cached by transfer fingerprint, so an interrupted upload can be probed
//! and continued from the acknowledged offset by a later process. Bytes
//! before the resume offset are hashed but never retransmitted; the body
//! sent is exactly the unsent suffix, one fixed-size chunk per request.
//!
//! Resumability is best-effort: probe failures and cache write failures
//! downgrade to a fresh session, never to an error.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use md5::{Digest as _, Md5};
use tokio::io::{AsyncRead, AsyncReadExt as _};

use gs_core::{Error, Result, SessionCache, UploadSessionRecord};

use crate::checksum::{RemoteDigests, TransferProgress, verify_digest};
use crate::client::StorageClient;
use crate::object::ObjectEntry;
use crate::transport::ApiResponse;

/// Fixed transfer chunk size (1 MiB)
pub const CHUNK_SIZE: u64 = 1024 * 1024;

/// Progress side-effect: (bytes done, total when known)
pub type ProgressFn = Arc<dyn Fn(u64, Option<u64>) + Send + Sync>;

/// Upload tuning and side metadata
#[derive(Default, Clone)]
pub struct UploadOptions {
    pub content_type: Option<String>,
    /// Custom metadata patched onto the object after a verified completion
    pub metadata: Option<serde_json::Value>,
    pub progress: Option<ProgressFn>,
}

/// Cache key identifying one logical transfer. Any change to source path,
/// size, or destination produces a different fingerprint.
pub fn transfer_fingerprint(path: &str, size: u64, bucket: &str, key: &str) -> String {
    let mut hasher = Md5::new();
    hasher.update(path.as_bytes());
    hasher.update(size.to_string().as_bytes());
    hasher.update(bucket.as_bytes());
    hasher.update(key.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Upper bound of a 308 `Range: bytes=0-N` header, or `None` when the
/// header is absent or does not start at zero
fn acknowledged_end(response: &ApiResponse) -> Option<u64> {
    let header = response.header("range")?;
    let (_, range) = header.split_once('=')?;
    let (start, end) = range.split_once('-')?;
    if start.trim() != "0" {
        return None;
    }
    end.trim().parse().ok()
}

enum UploadState {
    Start,
    ResolveSession,
    Uploading {
        upload_id: Option<String>,
        offset: u64,
    },
    Verifying {
        object: ObjectEntry,
        progress: TransferProgress,
    },
    Completed {
        object: ObjectEntry,
        resumable: bool,
    },
    FailedChecksum {
        error: Error,
    },
}

/// Upload a local file to `gs://bucket/key`
pub async fn upload_file(
    client: &StorageClient,
    cache: &dyn SessionCache,
    source: &Path,
    bucket: &str,
    key: &str,
    options: UploadOptions,
) -> Result<ObjectEntry> {
    let size = tokio::fs::metadata(source).await?.len();
    let fingerprint = transfer_fingerprint(&source.to_string_lossy(), size, bucket, key);
    let session = ResumableUploadSession {
        client,
        cache,
        source: source.to_path_buf(),
        bucket: bucket.to_string(),
        key: key.to_string(),
        options,
        size,
        fingerprint,
    };
    session.run().await
}

struct ResumableUploadSession<'a> {
    client: &'a StorageClient,
    cache: &'a dyn SessionCache,
    source: PathBuf,
    bucket: String,
    key: String,
    options: UploadOptions,
    size: u64,
    fingerprint: String,
}

impl ResumableUploadSession<'_> {
    async fn run(self) -> Result<ObjectEntry> {
        let mut state = UploadState::Start;
        loop {
            state = match state {
                UploadState::Start => self.on_start(),
                UploadState::ResolveSession => self.on_resolve_session().await?,
                UploadState::Uploading { upload_id, offset } => {
                    self.on_uploading(upload_id, offset).await?
                }
                UploadState::Verifying { object, progress } => {
                    self.on_verifying(object, progress)
                }
                UploadState::Completed { object, resumable } => {
                    return self.on_completed(object, resumable).await;
                }
                UploadState::FailedChecksum { error } => {
                    return self.on_failed_checksum(error).await;
                }
            };
        }
    }

    /// Small payloads short-circuit to a single-shot media upload
    fn on_start(&self) -> UploadState {
        if self.size <= CHUNK_SIZE {
            UploadState::Uploading {
                upload_id: None,
                offset: 0,
            }
        } else {
            UploadState::ResolveSession
        }
    }

    /// Find a resumable offset in a cached session, or open a fresh one
    async fn on_resolve_session(&self) -> Result<UploadState> {
        if let Some(record) = self.cache.lookup(&self.fingerprint) {
            match self
                .client
                .probe_resumable(&self.bucket, &record.upload_id, self.size)
                .await
            {
                Ok(response) if response.status.as_u16() == 308 => {
                    let offset = acknowledged_end(&response).map_or(0, |end| end + 1);
                    if offset < self.size {
                        tracing::info!(
                            key = %self.key,
                            offset,
                            "Resuming upload from cached session"
                        );
                        return Ok(UploadState::Uploading {
                            upload_id: Some(record.upload_id),
                            offset,
                        });
                    }
                    // The session already holds every byte but never
                    // finalized; it cannot accept more data.
                    self.cache.invalidate(&self.fingerprint);
                }
                Ok(_) => {
                    // Anything else means the session is unusable; the
                    // success case means it already finished.
                    self.cache.invalidate(&self.fingerprint);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Session probe failed; starting fresh");
                }
            }
        }

        let upload_id = self
            .client
            .start_resumable(
                &self.bucket,
                &self.key,
                self.options.content_type.as_deref(),
            )
            .await?;
        self.cache.store(UploadSessionRecord {
            fingerprint: self.fingerprint.clone(),
            upload_id: upload_id.clone(),
            created: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs(),
        });
        Ok(UploadState::Uploading {
            upload_id: Some(upload_id),
            offset: 0,
        })
    }

    async fn on_uploading(&self, upload_id: Option<String>, offset: u64) -> Result<UploadState> {
        let mut progress = TransferProgress::new(Some(self.size));

        let Some(upload_id) = upload_id else {
            // Single-shot: the whole payload is at most one chunk.
            let bytes = tokio::fs::read(&self.source).await?;
            progress.update(&bytes);
            let object = self
                .client
                .upload_media(
                    &self.bucket,
                    &self.key,
                    self.options.content_type.as_deref(),
                    Bytes::from(bytes),
                )
                .await?;
            self.report(&progress);
            return Ok(UploadState::Verifying { object, progress });
        };

        let mut file = tokio::fs::File::open(&self.source).await?;
        let mut buf = vec![0u8; CHUNK_SIZE as usize];
        let mut pos: u64 = 0;

        loop {
            let n = read_full(&mut file, &mut buf).await?;
            if n == 0 {
                return Err(Error::General(format!(
                    "{} ended at {pos} bytes, before the declared size {}",
                    self.source.display(),
                    self.size
                )));
            }
            let chunk = &buf[..n];
            // The digest covers every byte from offset 0, including bytes
            // that were acknowledged before the resume.
            progress.update(chunk);
            let chunk_end = pos + n as u64;

            if chunk_end > offset {
                let skip = offset.saturating_sub(pos) as usize;
                let send_start = pos + skip as u64;
                let content_range =
                    format!("bytes {send_start}-{}/{}", chunk_end - 1, self.size);
                let response = self
                    .client
                    .put_chunk(
                        &self.bucket,
                        &upload_id,
                        &content_range,
                        Bytes::copy_from_slice(&chunk[skip..]),
                    )
                    .await?;

                if chunk_end == self.size {
                    let object: ObjectEntry =
                        response.error_for_status().await?.json().await?;
                    self.report(&progress);
                    return Ok(UploadState::Verifying { object, progress });
                }
                if response.status.as_u16() != 308 {
                    let response = response.error_for_status().await?;
                    return Err(Error::General(format!(
                        "unexpected status {} mid-upload of gs://{}/{}",
                        response.status, self.bucket, self.key
                    )));
                }
                self.report(&progress);
            }
            pos = chunk_end;
        }
    }

    fn on_verifying(&self, object: ObjectEntry, progress: TransferProgress) -> UploadState {
        let resumable = self.size > CHUNK_SIZE;
        let digests = RemoteDigests::from_entry(&object);
        let Some((algorithm, expected)) = digests.preferred() else {
            tracing::warn!(
                key = %self.key,
                "Remote reported no digest; skipping upload verification"
            );
            return UploadState::Completed { object, resumable };
        };
        match verify_digest(
            &progress.digest(algorithm),
            expected,
            &self.bucket,
            &self.key,
        ) {
            Ok(()) => UploadState::Completed { object, resumable },
            Err(error) => UploadState::FailedChecksum { error },
        }
    }

    async fn on_completed(&self, object: ObjectEntry, resumable: bool) -> Result<ObjectEntry> {
        if resumable {
            self.cache.invalidate(&self.fingerprint);
        }
        if let Some(metadata) = &self.options.metadata {
            return self
                .client
                .patch_object(&self.bucket, &self.key, metadata.clone())
                .await;
        }
        Ok(object)
    }

    /// The invalid object must be gone before the error is reported
    async fn on_failed_checksum(&self, error: Error) -> Result<ObjectEntry> {
        if self.size > CHUNK_SIZE {
            self.cache.invalidate(&self.fingerprint);
        }
        if let Err(delete_error) = self.client.delete_object(&self.bucket, &self.key).await {
            tracing::warn!(
                key = %self.key,
                error = %delete_error,
                "Could not delete object after checksum mismatch"
            );
        }
        Err(error)
    }

    fn report(&self, progress: &TransferProgress) {
        if let Some(callback) = &self.options.progress {
            callback(progress.processed, progress.total);
        }
    }
}

/// Upload from a non-seekable reader (stdin, pipes).
///
/// The size is unknown up front, so there is no fingerprint, no session
/// cache, and no resumption: intermediate chunks assert `bytes a-b/*` and
/// EOF fixes the total. Input shorter than one chunk goes up single-shot.
pub async fn upload_reader<R>(
    client: &StorageClient,
    mut reader: R,
    bucket: &str,
    key: &str,
    options: UploadOptions,
) -> Result<ObjectEntry>
where
    R: AsyncRead + Unpin,
{
    let mut progress = TransferProgress::new(None);
    let mut current = vec![0u8; CHUNK_SIZE as usize];
    let n = read_full(&mut reader, &mut current).await?;
    current.truncate(n);

    let report = |progress: &TransferProgress| {
        if let Some(callback) = &options.progress {
            callback(progress.processed, progress.total);
        }
    };

    if (n as u64) < CHUNK_SIZE {
        progress.update(&current);
        let object = client
            .upload_media(
                bucket,
                key,
                options.content_type.as_deref(),
                Bytes::from(current),
            )
            .await?;
        report(&progress);
        return finish_stream_upload(client, bucket, key, object, progress, &options).await;
    }

    let upload_id = client
        .start_resumable(bucket, key, options.content_type.as_deref())
        .await?;
    let mut pos: u64 = 0;

    loop {
        let mut next = vec![0u8; CHUNK_SIZE as usize];
        let read = read_full(&mut reader, &mut next).await?;
        next.truncate(read);

        progress.update(&current);
        let chunk_end = pos + current.len() as u64;
        let last = next.is_empty();
        let content_range = if last {
            format!("bytes {pos}-{}/{}", chunk_end - 1, chunk_end)
        } else {
            format!("bytes {pos}-{}/*", chunk_end - 1)
        };
        let response = client
            .put_chunk(bucket, &upload_id, &content_range, Bytes::from(current))
            .await?;

        if last {
            let object: ObjectEntry = response.error_for_status().await?.json().await?;
            report(&progress);
            return finish_stream_upload(client, bucket, key, object, progress, &options).await;
        }
        if response.status.as_u16() != 308 {
            let response = response.error_for_status().await?;
            return Err(Error::General(format!(
                "unexpected status {} mid-upload of gs://{bucket}/{key}",
                response.status
            )));
        }
        report(&progress);

        pos = chunk_end;
        current = next;
    }
}

/// Shared tail of the stream path: verify, delete on mismatch, patch
/// metadata when requested.
async fn finish_stream_upload(
    client: &StorageClient,
    bucket: &str,
    key: &str,
    object: ObjectEntry,
    progress: TransferProgress,
    options: &UploadOptions,
) -> Result<ObjectEntry> {
    let digests = RemoteDigests::from_entry(&object);
    if let Some((algorithm, expected)) = digests.preferred()
        && let Err(error) = verify_digest(&progress.digest(algorithm), expected, bucket, key)
    {
        if let Err(delete_error) = client.delete_object(bucket, key).await {
            tracing::warn!(
                key,
                error = %delete_error,
                "Could not delete object after checksum mismatch"
            );
        }
        return Err(error);
    }
    if let Some(metadata) = &options.metadata {
        return client.patch_object(bucket, key, metadata.clone()).await;
    }
    Ok(object)
}

/// Fill `buf` as far as the reader allows; short only at EOF
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}
