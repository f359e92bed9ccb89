//! Widget configuration, resolved by merging call-site overrides over
//! instance defaults over global defaults.

use std::fmt;
use std::sync::Arc;

use shared::{error::ConfigError, protocol::UploadCredentials};

pub const DEFAULT_CREDENTIALS_ENDPOINT: &str = "/getS3Options";
pub const DEFAULT_ACL: &str = "public-read";
pub const DEFAULT_RANDOM_LENGTH: usize = 16;

/// Destination key template: a literal pattern, or a callback into host
/// state evaluated once per attempt before the placeholder pass.
#[derive(Clone)]
pub enum KeyTemplate {
    Literal(String),
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl KeyTemplate {
    pub fn evaluate(&self) -> String {
        match self {
            Self::Literal(template) => template.clone(),
            Self::Dynamic(resolve) => resolve(),
        }
    }
}

impl fmt::Debug for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(template) => f.debug_tuple("Literal").field(template).finish(),
            Self::Dynamic(_) => f.debug_tuple("Dynamic").field(&"..").finish(),
        }
    }
}

impl From<&str> for KeyTemplate {
    fn from(template: &str) -> Self {
        Self::Literal(template.to_string())
    }
}

/// Resolved per-widget configuration; immutable once the widget is built.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub bucket: String,
    pub submit_on_change: bool,
    pub credentials_endpoint: String,
    /// Static credentials that bypass the endpoint fetch entirely.
    pub manual_credentials: Option<UploadCredentials>,
    pub acl: String,
    pub folder: String,
    pub enable_validation: bool,
    pub target_filename: Option<KeyTemplate>,
    pub random_length: usize,
    /// Overrides the `https://{bucket}.s3.amazonaws.com/` destination.
    pub endpoint: Option<String>,
}

/// One layer of configuration; unset fields defer to the next layer down.
#[derive(Debug, Clone, Default)]
pub struct OptionsLayer {
    pub bucket: Option<String>,
    pub submit_on_change: Option<bool>,
    pub credentials_endpoint: Option<String>,
    pub manual_credentials: Option<UploadCredentials>,
    pub acl: Option<String>,
    pub folder: Option<String>,
    pub enable_validation: Option<bool>,
    pub target_filename: Option<KeyTemplate>,
    pub random_length: Option<usize>,
    pub endpoint: Option<String>,
}

impl OptionsLayer {
    fn merged_over(self, lower: OptionsLayer) -> OptionsLayer {
        OptionsLayer {
            bucket: self.bucket.or(lower.bucket),
            submit_on_change: self.submit_on_change.or(lower.submit_on_change),
            credentials_endpoint: self.credentials_endpoint.or(lower.credentials_endpoint),
            manual_credentials: self.manual_credentials.or(lower.manual_credentials),
            acl: self.acl.or(lower.acl),
            folder: self.folder.or(lower.folder),
            enable_validation: self.enable_validation.or(lower.enable_validation),
            target_filename: self.target_filename.or(lower.target_filename),
            random_length: self.random_length.or(lower.random_length),
            endpoint: self.endpoint.or(lower.endpoint),
        }
    }
}

impl UploadOptions {
    /// Merge with precedence `call_site > instance > global`, then fill the
    /// library defaults. The bucket has no default and must be present.
    pub fn resolve(
        call_site: OptionsLayer,
        instance: OptionsLayer,
        global: OptionsLayer,
    ) -> Result<Self, ConfigError> {
        let merged = call_site.merged_over(instance).merged_over(global);
        let bucket = merged
            .bucket
            .filter(|bucket| !bucket.is_empty())
            .ok_or(ConfigError::MissingBucket)?;
        Ok(Self {
            bucket,
            submit_on_change: merged.submit_on_change.unwrap_or(true),
            credentials_endpoint: merged
                .credentials_endpoint
                .unwrap_or_else(|| DEFAULT_CREDENTIALS_ENDPOINT.to_string()),
            manual_credentials: merged.manual_credentials,
            acl: merged.acl.unwrap_or_else(|| DEFAULT_ACL.to_string()),
            folder: merged.folder.unwrap_or_default(),
            enable_validation: merged.enable_validation.unwrap_or(true),
            target_filename: merged.target_filename,
            random_length: merged.random_length.unwrap_or(DEFAULT_RANDOM_LENGTH),
            endpoint: merged.endpoint,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_bucket(bucket: &str) -> OptionsLayer {
        OptionsLayer {
            bucket: Some(bucket.to_string()),
            ..OptionsLayer::default()
        }
    }

    #[test]
    fn fills_library_defaults() {
        let options = UploadOptions::resolve(
            OptionsLayer::default(),
            with_bucket("assets"),
            OptionsLayer::default(),
        )
        .expect("resolve");
        assert_eq!(options.bucket, "assets");
        assert!(options.submit_on_change);
        assert_eq!(options.credentials_endpoint, "/getS3Options");
        assert_eq!(options.acl, "public-read");
        assert_eq!(options.folder, "");
        assert!(options.enable_validation);
        assert_eq!(options.random_length, 16);
        assert!(options.manual_credentials.is_none());
        assert!(options.endpoint.is_none());
    }

    #[test]
    fn call_site_wins_over_instance_and_global() {
        let call_site = OptionsLayer {
            acl: Some("private".to_string()),
            ..OptionsLayer::default()
        };
        let instance = OptionsLayer {
            acl: Some("authenticated-read".to_string()),
            folder: Some("inst/".to_string()),
            ..with_bucket("assets")
        };
        let global = OptionsLayer {
            acl: Some("public-read".to_string()),
            folder: Some("glob/".to_string()),
            random_length: Some(8),
            ..OptionsLayer::default()
        };

        let options = UploadOptions::resolve(call_site, instance, global).expect("resolve");
        assert_eq!(options.acl, "private");
        assert_eq!(options.folder, "inst/");
        assert_eq!(options.random_length, 8);
    }

    #[test]
    fn bucket_is_mandatory() {
        let err = UploadOptions::resolve(
            OptionsLayer::default(),
            OptionsLayer::default(),
            OptionsLayer::default(),
        )
        .expect_err("no bucket");
        assert_eq!(err, shared::error::ConfigError::MissingBucket);

        let err = UploadOptions::resolve(
            with_bucket(""),
            OptionsLayer::default(),
            OptionsLayer::default(),
        )
        .expect_err("empty bucket");
        assert_eq!(err, shared::error::ConfigError::MissingBucket);
    }
}
