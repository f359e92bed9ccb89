use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uploader::{Progress, S3Uploader, UploadEvent, UploadFile};
use widget::{KeyTemplate, OptionsLayer, UploadOptions, UploadWidget};

mod config;

#[derive(Parser, Debug)]
struct Cli {
    /// Instance defaults, overridable through UPLOADER__* env variables.
    #[arg(long, default_value = "uploader.toml")]
    config: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload one local file through the presigned form-POST flow.
    Upload {
        file: PathBuf,
        #[arg(long)]
        bucket: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long)]
        acl: Option<String>,
        #[arg(long)]
        credentials_endpoint: Option<String>,
        /// Key template; %file.name%, %file.ext%, %uploader.folder% and the
        /// %uploader.date*% placeholders are substituted.
        #[arg(long)]
        target_filename: Option<String>,
        #[arg(long)]
        content_type: Option<String>,
        /// Full destination base url, instead of the bucket-derived one.
        #[arg(long)]
        endpoint: Option<String>,
        #[arg(long)]
        random_length: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let instance = config::load_layer(&cli.config);

    match cli.command {
        Command::Upload {
            file,
            bucket,
            folder,
            acl,
            credentials_endpoint,
            target_filename,
            content_type,
            endpoint,
            random_length,
        } => {
            let call_site = OptionsLayer {
                bucket,
                folder,
                acl,
                credentials_endpoint,
                target_filename: target_filename.map(KeyTemplate::Literal),
                endpoint,
                random_length,
                ..OptionsLayer::default()
            };
            let options = UploadOptions::resolve(call_site, instance, OptionsLayer::default())?;

            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .context("file path has no filename component")?;
            let content_type = content_type.unwrap_or_else(|| {
                mime_guess::from_path(&file)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
            let bytes = tokio::fs::read(&file)
                .await
                .with_context(|| format!("failed to read {}", file.display()))?;

            let uploader = Arc::new(S3Uploader::new());
            let mut events = uploader.subscribe_events();
            tokio::spawn(async move {
                while let Ok(event) = events.recv().await {
                    match event {
                        UploadEvent::Started(_) => info!("upload started"),
                        UploadEvent::Progress {
                            value: Progress::Percent(pct),
                        } => info!(pct, "progress"),
                        UploadEvent::Progress {
                            value: Progress::Indeterminate,
                        } => info!("progress unknown"),
                        UploadEvent::Succeeded { path, .. } => info!(%path, "stored"),
                        UploadEvent::Failed(_) => info!("upload failed"),
                        UploadEvent::Aborted(_) => info!("upload aborted"),
                    }
                }
            });

            let widget = UploadWidget::new(Arc::clone(&uploader), options)?;
            let payload = UploadFile::from_bytes(filename, content_type, bytes);
            if widget.select_file(payload).await?.is_none() {
                widget.trigger().await?;
            }
            if let Some(path) = widget.value() {
                println!("stored at {path}");
            }
        }
    }

    Ok(())
}
