//! gs-gcs: Storage JSON API client and transfer engine
//!
//! Everything that talks to the remote lives here, behind an injected
//! [`transport::HttpTransport`]:
//! - [`client`]: the request primitive and per-operation endpoints
//! - [`lister`]: cursor-based pagination as a lazy stream
//! - [`checksum`]: streaming MD5/CRC32C and the verification contract
//! - [`upload`] / [`download`]: the resumable transfer state machines
//! - [`batch`]: the multipart batch codec (bulk deletes)
//! - [`sync`]: local tree vs bucket diff planning
//! - [`scheduler`]: bounded-concurrency action execution

pub mod auth;
pub mod batch;
pub mod checksum;
pub mod client;
pub mod download;
pub mod lister;
pub mod object;
pub mod scheduler;
pub mod sync;
pub mod transport;
pub mod upload;

pub use auth::{MetadataTokenProvider, StaticTokenProvider, TokenProvider, resolve_token_provider};
pub use batch::{BatchSubRequest, BatchSubResponse, MAX_BATCH_SIZE, bulk_delete, execute_batch};
pub use checksum::{ChecksumAlgorithm, RemoteDigests, StreamingChecksum, TransferProgress};
pub use client::StorageClient;
pub use download::{DownloadOptions, download_to_file, download_to_writer};
pub use lister::{list, list_objects};
pub use object::{BucketEntry, ListingPage, ObjectEntry};
pub use scheduler::ConcurrentScheduler;
pub use sync::{LocalFileMeta, SyncAction, SyncPlanner, walk_local_tree};
pub use transport::{
    ApiRequest, ApiResponse, HttpTransport, ReqwestTransport, RequestBody,
};
pub use upload::{
    CHUNK_SIZE, ProgressFn, UploadOptions, transfer_fingerprint, upload_file, upload_reader,
};
