use reqwest::StatusCode;
use thiserror::Error;

/// Failure to obtain upload credentials. Fatal for the current attempt;
/// never retried here.
#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("failed to reach credentials endpoint: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("credentials endpoint returned {status}")]
    Status { status: StatusCode },
    #[error("invalid credentials payload: {0}")]
    Decode(#[source] reqwest::Error),
}

/// Terminal failure of a single transfer attempt. The widget stays usable
/// for a new attempt after any of these.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("upload request failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("storage endpoint answered {status}, expected 204 No Content")]
    UnexpectedStatus { status: StatusCode },
    #[error("upload aborted")]
    Aborted,
    #[error("content type rejected by the form encoder: {0}")]
    ContentType(#[source] reqwest::Error),
}
