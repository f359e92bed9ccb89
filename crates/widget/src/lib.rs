//! Per-element upload widget controller: resolves options, computes the
//! destination object key and drives [`uploader::S3Uploader`] through one
//! attempt at a time.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use shared::error::ConfigError;
use uploader::{
    CredentialsError, S3Uploader, StatusCell, TransferError, TransferHandle, UploadFile,
    UploadStatus,
};

pub mod keys;
pub mod options;

pub use options::{KeyTemplate, OptionsLayer, UploadOptions};

/// Controller state machine over one upload attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WidgetPhase {
    #[default]
    Idle,
    AwaitingCredentials,
    Uploading,
    Succeeded,
    Failed,
}

/// Form-validation side effects surfaced to the host when
/// `enable_validation` is set. `None` means the key was never touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationState {
    pub uploading: Option<bool>,
    pub succeeded: Option<bool>,
}

/// Failure of one widget-driven upload attempt. The widget stays in a
/// stable, re-triggerable state after any of these.
#[derive(Debug, Error)]
pub enum AttemptError {
    #[error("failed to obtain upload credentials: {0}")]
    Credentials(#[from] CredentialsError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("no file selected")]
    NoFileSelected,
}

#[derive(Debug, Default)]
struct WidgetState {
    phase: WidgetPhase,
    value: Option<String>,
    validation: ValidationState,
    pending_file: Option<UploadFile>,
}

/// One upload widget instance. Owns its options and state exclusively; the
/// only cross-instance state is the coordinator's in-flight count.
#[derive(Debug)]
pub struct UploadWidget {
    uploader: Arc<S3Uploader>,
    options: UploadOptions,
    destination: String,
    status: StatusCell,
    inner: Mutex<WidgetState>,
}

impl UploadWidget {
    /// Build a widget over resolved options. The bucket is mandatory and is
    /// checked here, before any interaction is possible.
    pub fn new(uploader: Arc<S3Uploader>, options: UploadOptions) -> Result<Self, ConfigError> {
        if options.bucket.is_empty() {
            return Err(ConfigError::MissingBucket);
        }
        let destination = destination_uri(&options)?;
        Ok(Self {
            uploader,
            options,
            destination,
            status: StatusCell::new(),
            inner: Mutex::new(WidgetState::default()),
        })
    }

    /// Record a newly selected file; uploads immediately when
    /// `submit_on_change` is set, otherwise waits for [`trigger`](Self::trigger).
    pub async fn select_file(
        &self,
        file: UploadFile,
    ) -> Result<Option<TransferHandle>, AttemptError> {
        self.lock().pending_file = Some(file);
        if self.options.submit_on_change {
            self.trigger().await.map(Some)
        } else {
            Ok(None)
        }
    }

    /// External upload signal; reuses the most recently selected file.
    pub async fn trigger(&self) -> Result<TransferHandle, AttemptError> {
        let file = self
            .lock()
            .pending_file
            .clone()
            .ok_or(AttemptError::NoFileSelected)?;
        self.run_attempt(file).await
    }

    pub fn phase(&self) -> WidgetPhase {
        self.lock().phase
    }

    /// The bound model value: the stored object url after a success,
    /// untouched by failed attempts.
    pub fn value(&self) -> Option<String> {
        self.lock().value.clone()
    }

    /// Overwrite the bound model value from the host side.
    pub fn set_value(&self, value: Option<String>) {
        self.lock().value = value;
    }

    pub fn validation(&self) -> ValidationState {
        self.lock().validation
    }

    pub fn status(&self) -> UploadStatus {
        self.status.snapshot()
    }

    pub fn is_upload_successful(&self) -> bool {
        self.status.snapshot().is_successful()
    }

    pub fn options(&self) -> &UploadOptions {
        &self.options
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    async fn run_attempt(&self, file: UploadFile) -> Result<TransferHandle, AttemptError> {
        self.set_phase(WidgetPhase::AwaitingCredentials);
        let key = self.resolve_key(&file);
        debug!(%key, "resolved object key");

        let credentials = match &self.options.manual_credentials {
            Some(manual) => manual.clone(),
            None => {
                match self
                    .uploader
                    .fetch_credentials(&self.options.credentials_endpoint)
                    .await
                {
                    Ok(credentials) => credentials,
                    Err(err) => {
                        self.set_phase(WidgetPhase::Failed);
                        warn!(error = %err, "credential fetch failed; attempt dropped");
                        return Err(err.into());
                    }
                }
            }
        };

        if self.options.enable_validation {
            self.lock().validation.uploading = Some(false);
        }
        self.set_phase(WidgetPhase::Uploading);

        let outcome = self
            .uploader
            .upload(
                &self.status,
                &self.destination,
                &key,
                &self.options.acl,
                &credentials,
                file,
            )
            .await;

        let mut inner = self.lock();
        match outcome {
            Ok(handle) => {
                inner.value = Some(format!("{}{}", self.destination, key));
                if self.options.enable_validation {
                    inner.validation.uploading = Some(true);
                    inner.validation.succeeded = Some(true);
                }
                inner.phase = WidgetPhase::Succeeded;
                Ok(handle)
            }
            Err(err) => {
                if self.options.enable_validation {
                    inner.validation.uploading = Some(true);
                    inner.validation.succeeded = Some(false);
                }
                inner.phase = WidgetPhase::Failed;
                Err(err.into())
            }
        }
    }

    /// Compute the destination key for this attempt, either from the
    /// configured template or from the timestamp-plus-token scheme.
    fn resolve_key(&self, file: &UploadFile) -> String {
        let ctx = keys::KeyContext {
            filename: &file.filename,
            folder: &self.options.folder,
        };
        match &self.options.target_filename {
            Some(template) => keys::expand_template(&template.evaluate(), &ctx, keys::now_ms),
            None => keys::auto_key(
                &self.options.folder,
                keys::now_ms(),
                &S3Uploader::random_token(self.options.random_length),
                keys::file_extension(&file.filename),
            ),
        }
    }

    fn set_phase(&self, phase: WidgetPhase) {
        self.lock().phase = phase;
    }

    fn lock(&self) -> MutexGuard<'_, WidgetState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn destination_uri(options: &UploadOptions) -> Result<String, ConfigError> {
    match &options.endpoint {
        Some(endpoint) => {
            let parsed = Url::parse(endpoint)
                .map_err(|err| ConfigError::InvalidEndpoint(err.to_string()))?;
            let mut destination = parsed.to_string();
            if !destination.ends_with('/') {
                destination.push('/');
            }
            Ok(destination)
        }
        None => Ok(format!("https://{}.s3.amazonaws.com/", options.bucket)),
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
