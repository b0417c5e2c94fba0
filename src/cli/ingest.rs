//! Ingest command - uploads files into a knowledge base and optionally watches progress

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::Args;
use tokio::signal;
use tracing::info;

use crate::config::AppConfig;
use crate::domain::admin_api::{AdminApi, UploadFile};
use crate::domain::knowledge_base::IngestionOperation;
use crate::infrastructure::polling::{IngestionPoller, PollEvent};

#[derive(Args, Clone)]
pub struct IngestArgs {
    /// Knowledge base id
    pub knowledge_base: String,

    /// Files to upload
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Poll ingestion status until nothing is pending (Ctrl+C stops watching)
    #[arg(long)]
    pub watch: bool,
}

pub async fn run(config: &AppConfig, args: IngestArgs) -> anyhow::Result<()> {
    let api = Arc::new(super::connect(config)?);

    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        files.push(read_upload(path).await?);
    }

    let response = api.ingest_files(&args.knowledge_base, files).await?;
    info!(knowledge_base_id = %args.knowledge_base, "Upload accepted");
    println!("{}", serde_json::to_string_pretty(&response)?);

    if !args.watch {
        return Ok(());
    }

    let (handle, mut events) = IngestionPoller::new(api, args.knowledge_base.as_str())
        .with_interval(config.polling.interval())
        .start();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PollEvent::Progress(operations)) => print_operations(&operations),
                Some(PollEvent::Refresh(operations)) => {
                    print_operations(&operations);
                    println!("✓ No ingestion operations pending");
                    break;
                }
                None => break,
            },
            _ = signal::ctrl_c() => {
                handle.stop();
                println!("Stopped watching");
                break;
            }
        }
    }

    handle.wait().await;
    Ok(())
}

async fn read_upload(path: &Path) -> anyhow::Result<UploadFile> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;

    Ok(UploadFile::new(file_name, content))
}

fn print_operations(operations: &[IngestionOperation]) {
    for op in operations {
        println!("{}", operation_line(op));
    }
}

fn operation_line(op: &IngestionOperation) -> String {
    let source = op.source_name.as_deref().unwrap_or(&op.id);
    let mut line = format!("{:<12} {}", op.status.as_str(), source);

    if let Some(ms) = op.execution_time_ms {
        line.push_str(&format!(" ({} ms)", ms));
    }
    if let Some(error) = &op.error {
        line.push_str(&format!(": {}", error));
    }

    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge_base::IngestionStatus;

    #[test]
    fn test_operation_line() {
        let mut op = IngestionOperation {
            id: "op-1".to_string(),
            source_name: Some("guide.pdf".to_string()),
            status: IngestionStatus::Success,
            error: None,
            created_at: None,
            execution_time_ms: Some(420),
        };
        assert_eq!(operation_line(&op), format!("{:<12} guide.pdf (420 ms)", "success"));

        op.source_name = None;
        op.status = IngestionStatus::Failed;
        op.execution_time_ms = None;
        op.error = Some("unsupported format".to_string());
        assert_eq!(
            operation_line(&op),
            format!("{:<12} op-1: unsupported format", "failed")
        );
    }

    #[tokio::test]
    async fn test_read_upload_uses_file_name() {
        let path = std::env::temp_dir().join(format!("pmp-admin-upload-{}.md", std::process::id()));
        tokio::fs::write(&path, b"# Title").await.unwrap();

        let upload = read_upload(&path).await.unwrap();
        assert!(upload.file_name.starts_with("pmp-admin-upload-"));
        assert_eq!(upload.content, b"# Title");
        assert_eq!(upload.mime_type(), "text/markdown");

        tokio::fs::remove_file(&path).await.ok();
    }
}
