use std::sync::{
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use bytes::Bytes;
use futures::StreamExt;
use rand::Rng;
use reqwest::{
    multipart::{Form, Part},
    Body, Client, StatusCode,
};
use shared::protocol::UploadCredentials;
use tokio::sync::{broadcast, Notify};
use tracing::{info, warn};

pub mod error;
pub use error::{CredentialsError, TransferError};

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const BODY_CHUNK_LEN: usize = 64 * 1024;
const TOKEN_ALPHABET: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Progress of an in-flight transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// Percentage of the payload handed to the transport, rounded, in 0..=100.
    Percent(u8),
    /// Total size unknown; only activity can be reported.
    Indeterminate,
}

/// Lifecycle events broadcast by [`S3Uploader`].
///
/// Per attempt: one `Started`, zero or more `Progress`, then exactly one of
/// `Succeeded`, `Failed` or `Aborted`. No `Progress` is emitted after the
/// terminal event.
#[derive(Debug, Clone)]
pub enum UploadEvent {
    Started(TransferHandle),
    Progress { value: Progress },
    Succeeded { transfer: TransferHandle, path: String },
    Failed(TransferHandle),
    Aborted(TransferHandle),
}

/// Handle to an in-flight transfer, exposed through [`UploadEvent::Started`]
/// so the host can cancel the attempt.
#[derive(Debug, Clone, Default)]
pub struct TransferHandle {
    aborted: Arc<AtomicBool>,
    abort_signal: Arc<Notify>,
}

impl TransferHandle {
    fn new() -> Self {
        Self::default()
    }

    /// Resolve the attempt to the aborted terminal path. Calling it again,
    /// or after the attempt settled, has no effect.
    pub fn abort(&self) {
        if !self.aborted.swap(true, Ordering::SeqCst) {
            self.abort_signal.notify_one();
        }
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    async fn aborted(&self) {
        if self.is_aborted() {
            return;
        }
        self.abort_signal.notified().await;
    }
}

/// Per-widget upload state, written synchronously with event emission.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadStatus {
    pub attempted: bool,
    pub uploading: bool,
    pub success: Option<bool>,
    pub progress: Option<Progress>,
}

impl UploadStatus {
    pub fn is_successful(&self) -> bool {
        self.attempted && !self.uploading && self.success == Some(true)
    }
}

/// Shared lifecycle sink handed to [`S3Uploader::upload`]. The coordinator
/// writes through it while the owning widget and the host read snapshots.
#[derive(Debug, Clone, Default)]
pub struct StatusCell {
    inner: Arc<Mutex<UploadStatus>>,
}

impl StatusCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UploadStatus {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, UploadStatus> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn begin_attempt(&self) {
        let mut status = self.lock();
        status.attempted = true;
        status.success = None;
        status.progress = None;
    }

    fn mark_uploading(&self) {
        self.lock().uploading = true;
    }

    fn set_progress(&self, value: Progress) {
        self.lock().progress = Some(value);
    }

    fn finish(&self, success: bool) {
        let mut status = self.lock();
        status.uploading = false;
        status.success = Some(success);
    }
}

/// File payload for a single upload attempt.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub content_type: String,
    pub bytes: Bytes,
    /// Total size advertised to progress reporting. `None` models a source
    /// whose length is unknown and forces indeterminate progress.
    pub declared_len: Option<u64>,
}

impl UploadFile {
    pub fn from_bytes(
        filename: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        let bytes = bytes.into();
        let declared_len = Some(bytes.len() as u64);
        Self {
            filename: filename.into(),
            content_type: content_type.into(),
            bytes,
            declared_len,
        }
    }

    pub fn with_unknown_length(mut self) -> Self {
        self.declared_len = None;
        self
    }
}

/// Coordinates presigned form-POST uploads: credential fetch, the transfer
/// itself, lifecycle events and the process-wide in-flight count.
///
/// The coordinator keeps no per-widget state; every [`upload`](Self::upload)
/// call is parameterized entirely by its arguments.
#[derive(Debug)]
pub struct S3Uploader {
    http: Client,
    events: broadcast::Sender<UploadEvent>,
    in_flight: AtomicUsize,
}

impl Default for S3Uploader {
    fn default() -> Self {
        Self::new()
    }
}

impl S3Uploader {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            http: Client::new(),
            events,
            in_flight: AtomicUsize::new(0),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    /// True while at least one attempt, across every widget sharing this
    /// coordinator, is between its `Started` and terminal event.
    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst) > 0
    }

    /// Fetch upload credentials from `endpoint`. One GET, no retries; the
    /// caller decides what a rejection means.
    pub async fn fetch_credentials(
        &self,
        endpoint: &str,
    ) -> Result<UploadCredentials, CredentialsError> {
        let response = self
            .http
            .get(endpoint)
            .send()
            .await
            .map_err(CredentialsError::Transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(CredentialsError::Status { status });
        }
        response.json().await.map_err(CredentialsError::Decode)
    }

    /// Random filename token: `length` characters drawn uniformly, with
    /// replacement, from `[0-9a-zA-Z]`. Not cryptographically secure; the
    /// timestamp prefix of the default key scheme absorbs the collision risk.
    pub fn random_token(length: usize) -> String {
        let mut rng = rand::thread_rng();
        (0..length)
            .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
            .collect()
    }

    /// Perform one multipart form POST of `file` to `destination` under
    /// `key`, with the fields in the fixed order `key`, `acl`,
    /// `Content-Type`, `AWSAccessKeyId`, `policy`, `signature`, `file`.
    ///
    /// Success is HTTP 204 exclusively; backends answering 200/201 take the
    /// failure path. Any other status, a transport failure, or an abort
    /// through the returned handle settles the attempt as failed, and
    /// exactly one of `Succeeded`/`Failed`/`Aborted` is emitted per call.
    /// No timeout is imposed: a hung transfer holds `uploading` until the
    /// host aborts it.
    pub async fn upload(
        &self,
        status: &StatusCell,
        destination: &str,
        key: &str,
        acl: &str,
        credentials: &UploadCredentials,
        file: UploadFile,
    ) -> Result<TransferHandle, TransferError> {
        status.begin_attempt();
        let handle = TransferHandle::new();
        let form = self.upload_form(status, key, acl, credentials, &file)?;

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        status.mark_uploading();
        let _ = self.events.send(UploadEvent::Started(handle.clone()));
        info!(destination, key, "upload started");

        let send_request = self.http.post(destination).multipart(form).send();
        let outcome = tokio::select! {
            result = send_request => Some(result),
            () = handle.aborted() => None,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match outcome {
            Some(Ok(response)) if response.status() == StatusCode::NO_CONTENT => {
                status.finish(true);
                let path = format!("{destination}{key}");
                info!(%path, "upload succeeded");
                let _ = self.events.send(UploadEvent::Succeeded {
                    transfer: handle.clone(),
                    path,
                });
                Ok(handle)
            }
            Some(Ok(response)) => {
                status.finish(false);
                let answered = response.status();
                warn!(status = %answered, "upload rejected by storage endpoint");
                let _ = self.events.send(UploadEvent::Failed(handle.clone()));
                Err(TransferError::UnexpectedStatus { status: answered })
            }
            Some(Err(err)) => {
                status.finish(false);
                warn!(error = %err, "upload transport failure");
                let _ = self.events.send(UploadEvent::Failed(handle.clone()));
                Err(TransferError::Network(err))
            }
            None => {
                status.finish(false);
                info!(key, "upload aborted by host");
                let _ = self.events.send(UploadEvent::Aborted(handle.clone()));
                Err(TransferError::Aborted)
            }
        }
    }

    fn upload_form(
        &self,
        status: &StatusCell,
        key: &str,
        acl: &str,
        credentials: &UploadCredentials,
        file: &UploadFile,
    ) -> Result<Form, TransferError> {
        let part = self.progress_part(status, file)?;
        Ok(Form::new()
            .text("key", key.to_string())
            .text("acl", acl.to_string())
            .text("Content-Type", file.content_type.clone())
            .text("AWSAccessKeyId", credentials.access_key_id.clone())
            .text("policy", credentials.policy.clone())
            .text("signature", credentials.signature.clone())
            .part("file", part))
    }

    /// File part whose body stream reports progress as the transport
    /// consumes it, so progress always precedes the terminal outcome.
    fn progress_part(&self, status: &StatusCell, file: &UploadFile) -> Result<Part, TransferError> {
        let total = file.declared_len;
        let sent = AtomicU64::new(0);
        let events = self.events.clone();
        let status = status.clone();
        let stream = futures::stream::iter(chunk_payload(&file.bytes)).map(move |chunk| {
            let sent_total = sent.fetch_add(chunk.len() as u64, Ordering::Relaxed) + chunk.len() as u64;
            let value = match total {
                Some(total) if total > 0 => Progress::Percent(percent(sent_total, total)),
                _ => Progress::Indeterminate,
            };
            status.set_progress(value);
            let _ = events.send(UploadEvent::Progress { value });
            Ok::<Bytes, std::io::Error>(chunk)
        });

        let part = match total {
            Some(len) => Part::stream_with_length(Body::wrap_stream(stream), len),
            None => Part::stream(Body::wrap_stream(stream)),
        };
        part.file_name(file.filename.clone())
            .mime_str(&file.content_type)
            .map_err(TransferError::ContentType)
    }
}

fn chunk_payload(bytes: &Bytes) -> Vec<Bytes> {
    let mut rest = bytes.clone();
    let mut chunks = Vec::with_capacity(rest.len() / BODY_CHUNK_LEN + 1);
    while rest.len() > BODY_CHUNK_LEN {
        chunks.push(rest.split_to(BODY_CHUNK_LEN));
    }
    chunks.push(rest);
    chunks
}

fn percent(sent: u64, total: u64) -> u8 {
    let ratio = sent as f64 * 100.0 / total as f64;
    ratio.round().min(100.0) as u8
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
