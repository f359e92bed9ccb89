use thiserror::Error;

/// Configuration problems that abort widget setup before any interaction
/// is possible.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("bucket is a mandatory option")]
    MissingBucket,
    #[error("invalid storage endpoint override: {0}")]
    InvalidEndpoint(String),
}
