//! Resumable download state machine
//!
//! Drives one remote object to a local file:
//!
//! ```text
//! Start → {CheckPartial | Fresh} → Fetching → Verifying → Finalize
//! ```
//!
//! Bytes land in a staging file (`<dest>.gsdownload`) that is atomically
//! renamed into place after the digest checks out; a failed verification
//! leaves the staging file behind for inspection and touches nothing
//! remote. A staging file from an earlier interrupted run is re-hashed from
//! offset 0 to find the true resume point, then the fetch continues with a
//! byte-range request.
//!
//! Non-seekable destinations (stdout) have no staging file and no
//! resumption: every such download starts at offset 0 and writes through.

use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};

use futures::TryStreamExt as _;
use tokio::io::{AsyncWrite, AsyncWriteExt as _};

use gs_core::{Error, Result};

use crate::checksum::{RemoteDigests, TransferProgress, verify_digest};
use crate::client::StorageClient;
use crate::transport::ApiResponse;
use crate::upload::{CHUNK_SIZE, ProgressFn};

/// Suffix of in-progress staging files
pub const STAGING_SUFFIX: &str = ".gsdownload";

#[derive(Default, Clone)]
pub struct DownloadOptions {
    pub progress: Option<ProgressFn>,
}

/// Facts needed to fetch, verify, and finalize one download
struct RemoteFacts {
    digests: RemoteDigests,
    size: Option<u64>,
    generation: Option<u64>,
}

enum DownloadState {
    Start,
    CheckPartial,
    Fresh,
    Fetching {
        response: ApiResponse,
        facts: RemoteFacts,
        file: tokio::fs::File,
        progress: TransferProgress,
    },
    Verifying {
        facts: RemoteFacts,
        progress: TransferProgress,
    },
    Finalize {
        facts: RemoteFacts,
    },
}

/// Staging path for a destination: `<dest>.gsdownload`
pub fn staging_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(STAGING_SUFFIX);
    PathBuf::from(name)
}

/// Download `gs://bucket/key` to a local file
pub async fn download_to_file(
    client: &StorageClient,
    bucket: &str,
    key: &str,
    dest: &Path,
    options: DownloadOptions,
) -> Result<()> {
    let session = ResumableDownloadSession {
        client,
        bucket: bucket.to_string(),
        key: key.to_string(),
        dest: dest.to_path_buf(),
        staging: staging_path(dest),
        options,
    };
    session.run().await
}

struct ResumableDownloadSession<'a> {
    client: &'a StorageClient,
    bucket: String,
    key: String,
    dest: PathBuf,
    staging: PathBuf,
    options: DownloadOptions,
}

impl ResumableDownloadSession<'_> {
    async fn run(self) -> Result<()> {
        let mut state = DownloadState::Start;
        loop {
            state = match state {
                DownloadState::Start => self.on_start().await,
                DownloadState::CheckPartial => self.on_check_partial().await?,
                DownloadState::Fresh => self.on_fresh().await?,
                DownloadState::Fetching {
                    response,
                    facts,
                    file,
                    progress,
                } => self.on_fetching(response, facts, file, progress).await?,
                DownloadState::Verifying { facts, progress } => {
                    self.on_verifying(facts, progress)?
                }
                DownloadState::Finalize { facts } => return self.on_finalize(facts).await,
            };
        }
    }

    /// A staging file has to exceed one chunk before resuming pays for the
    /// metadata round trip and the re-hash.
    async fn on_start(&self) -> DownloadState {
        match tokio::fs::metadata(&self.staging).await {
            Ok(meta) if meta.is_file() && meta.len() > CHUNK_SIZE => DownloadState::CheckPartial,
            _ => DownloadState::Fresh,
        }
    }

    /// Metadata fetch + staging re-hash, then a ranged GET from the true
    /// resume point
    async fn on_check_partial(&self) -> Result<DownloadState> {
        tracing::info!(dest = %self.dest.display(), "Checking partial download");
        let entry = self.client.object_metadata(&self.bucket, &self.key).await?;
        let facts = RemoteFacts {
            digests: RemoteDigests::from_entry(&entry),
            size: entry.size,
            generation: entry.generation,
        };

        // Re-hash what is already on disk; the byte count we actually read
        // is the resume offset, whatever the file claims.
        let mut progress = TransferProgress::new(facts.size);
        {
            let mut staged = tokio::fs::File::open(&self.staging).await?;
            let mut buf = vec![0u8; CHUNK_SIZE as usize];
            loop {
                let n = tokio::io::AsyncReadExt::read(&mut staged, &mut buf).await?;
                if n == 0 {
                    break;
                }
                progress.update(&buf[..n]);
            }
        }
        let resume_offset = progress.processed;
        tracing::info!(resume_offset, "Resuming download");

        let response = self
            .client
            .get_media(&self.bucket, &self.key, Some(resume_offset))
            .await?;
        let file = tokio::fs::OpenOptions::new()
            .append(true)
            .open(&self.staging)
            .await?;
        Ok(DownloadState::Fetching {
            response,
            facts,
            file,
            progress,
        })
    }

    /// Plain GET; digests and size come from the response headers
    async fn on_fresh(&self) -> Result<DownloadState> {
        let response = self.client.get_media(&self.bucket, &self.key, None).await?;
        let facts = remote_facts_from_headers(&response);
        let progress = TransferProgress::new(facts.size);
        let file = tokio::fs::File::create(&self.staging).await?;
        Ok(DownloadState::Fetching {
            response,
            facts,
            file,
            progress,
        })
    }

    /// Append chunks in arrival order, feeding the digest
    async fn on_fetching(
        &self,
        response: ApiResponse,
        facts: RemoteFacts,
        mut file: tokio::fs::File,
        mut progress: TransferProgress,
    ) -> Result<DownloadState> {
        let mut body = response.into_body();
        while let Some(chunk) = body.try_next().await? {
            file.write_all(&chunk).await?;
            progress.update(&chunk);
            if let Some(callback) = &self.options.progress {
                callback(progress.processed, progress.total);
            }
        }
        file.flush().await?;
        Ok(DownloadState::Verifying { facts, progress })
    }

    /// A mismatch is fatal and local-only: the staging file stays for
    /// inspection, the remote object is untouched.
    fn on_verifying(
        &self,
        facts: RemoteFacts,
        progress: TransferProgress,
    ) -> Result<DownloadState> {
        if let Some((algorithm, expected)) = facts.digests.preferred() {
            verify_digest(
                &progress.digest(algorithm),
                expected,
                &self.bucket,
                &self.key,
            )?;
        } else {
            tracing::warn!(
                key = %self.key,
                "Remote reported no digest; skipping download verification"
            );
        }
        Ok(DownloadState::Finalize { facts })
    }

    /// Atomic rename, then stamp the object's generation time onto the
    /// file so the sync heuristic can compare against it
    async fn on_finalize(&self, facts: RemoteFacts) -> Result<()> {
        tokio::fs::rename(&self.staging, &self.dest).await?;
        if let Some(generation) = facts.generation {
            let mtime = UNIX_EPOCH + Duration::from_secs(generation / 1_000_000);
            let dest = self.dest.clone();
            let result = tokio::task::spawn_blocking(move || {
                let file = std::fs::OpenOptions::new().write(true).open(&dest)?;
                file.set_times(std::fs::FileTimes::new().set_modified(mtime))
            })
            .await
            .map_err(|e| Error::General(format!("finalize task failed: {e}")))?;
            if let Err(e) = result {
                tracing::warn!(
                    dest = %self.dest.display(),
                    error = %e,
                    "Could not set modification time"
                );
            }
        }
        Ok(())
    }
}

fn remote_facts_from_headers(response: &ApiResponse) -> RemoteFacts {
    RemoteFacts {
        digests: response
            .header("x-goog-hash")
            .map(RemoteDigests::from_hash_header)
            .unwrap_or_default(),
        size: response
            .header("content-length")
            .and_then(|v| v.parse().ok()),
        generation: response
            .header("x-goog-generation")
            .and_then(|v| v.parse().ok()),
    }
}

/// Download straight into a writer (stdout). No staging file, no
/// resumption, no finalize: offset is always 0.
pub async fn download_to_writer<W>(
    client: &StorageClient,
    bucket: &str,
    key: &str,
    mut writer: W,
    options: DownloadOptions,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let response = client.get_media(bucket, key, None).await?;
    let facts = remote_facts_from_headers(&response);
    let mut progress = TransferProgress::new(facts.size);

    let mut body = response.into_body();
    while let Some(chunk) = body.try_next().await? {
        writer.write_all(&chunk).await?;
        progress.update(&chunk);
        if let Some(callback) = &options.progress {
            callback(progress.processed, progress.total);
        }
    }
    writer.flush().await?;

    if let Some((algorithm, expected)) = facts.digests.preferred() {
        verify_digest(&progress.digest(algorithm), expected, bucket, key)?;
    }
    Ok(())
}
