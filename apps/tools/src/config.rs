use std::{fs, path::Path};

use serde::Deserialize;
use widget::{KeyTemplate, OptionsLayer};

/// Instance defaults read from `uploader.toml`; every key can be overridden
/// through an `UPLOADER__*` environment variable.
#[derive(Debug, Default, Deserialize)]
pub struct FileSettings {
    pub bucket: Option<String>,
    pub folder: Option<String>,
    pub acl: Option<String>,
    pub credentials_endpoint: Option<String>,
    pub endpoint: Option<String>,
    pub target_filename: Option<String>,
    pub random_length: Option<usize>,
    pub submit_on_change: Option<bool>,
    pub enable_validation: Option<bool>,
}

pub fn load_layer(path: &Path) -> OptionsLayer {
    let mut settings = FileSettings::default();
    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_settings) = toml::from_str::<FileSettings>(&raw) {
            settings = file_settings;
        }
    }

    if let Ok(v) = std::env::var("UPLOADER__BUCKET") {
        settings.bucket = Some(v);
    }
    if let Ok(v) = std::env::var("UPLOADER__FOLDER") {
        settings.folder = Some(v);
    }
    if let Ok(v) = std::env::var("UPLOADER__ACL") {
        settings.acl = Some(v);
    }
    if let Ok(v) = std::env::var("UPLOADER__CREDENTIALS_ENDPOINT") {
        settings.credentials_endpoint = Some(v);
    }
    if let Ok(v) = std::env::var("UPLOADER__ENDPOINT") {
        settings.endpoint = Some(v);
    }
    if let Ok(v) = std::env::var("UPLOADER__TARGET_FILENAME") {
        settings.target_filename = Some(v);
    }
    if let Ok(v) = std::env::var("UPLOADER__RANDOM_LENGTH") {
        if let Ok(parsed) = v.parse::<usize>() {
            settings.random_length = Some(parsed);
        }
    }
    if let Ok(v) = std::env::var("UPLOADER__SUBMIT_ON_CHANGE") {
        if let Ok(parsed) = v.parse::<bool>() {
            settings.submit_on_change = Some(parsed);
        }
    }

    OptionsLayer {
        bucket: settings.bucket,
        folder: settings.folder,
        acl: settings.acl,
        credentials_endpoint: settings.credentials_endpoint,
        endpoint: settings.endpoint,
        target_filename: settings.target_filename.map(KeyTemplate::Literal),
        random_length: settings.random_length,
        submit_on_change: settings.submit_on_change,
        enable_validation: settings.enable_validation,
        ..OptionsLayer::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_instance_defaults_from_toml() {
        let settings: FileSettings = toml::from_str(
            r#"
            bucket = "assets"
            folder = "uploads/"
            acl = "private"
            random_length = 24
            submit_on_change = false
            "#,
        )
        .expect("settings");
        assert_eq!(settings.bucket.as_deref(), Some("assets"));
        assert_eq!(settings.folder.as_deref(), Some("uploads/"));
        assert_eq!(settings.acl.as_deref(), Some("private"));
        assert_eq!(settings.random_length, Some(24));
        assert_eq!(settings.submit_on_change, Some(false));
        assert!(settings.credentials_endpoint.is_none());
    }

    #[test]
    fn missing_config_file_yields_an_empty_layer() {
        let layer = load_layer(Path::new("does-not-exist.toml"));
        assert!(layer.folder.is_none());
        assert!(layer.acl.is_none());
    }
}
