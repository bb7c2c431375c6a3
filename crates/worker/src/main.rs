//! Command-line batch converter.
//!
//! `towebp-worker <paths...>` walks every path (directories recursively),
//! admits the image files in path order, waits for the run to settle and
//! writes the zip archive to `TOWEBP_OUTPUT`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use anyhow::{bail, Context};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use towebp_codec::ImageCodec;
use towebp_core::stats::format_size;
use towebp_core::task::{media_type_for_name, SourceFile};
use towebp_pipeline::{PipelineConfig, PipelineHandle, DEFAULT_ARCHIVE_NAME};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "towebp_worker=info,towebp_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let roots: Vec<PathBuf> = std::env::args_os().skip(1).map(PathBuf::from).collect();
    if roots.is_empty() {
        bail!("usage: towebp-worker <paths...>");
    }
    let output = std::env::var("TOWEBP_OUTPUT").unwrap_or_else(|_| DEFAULT_ARCHIVE_NAME.into());

    let paths = collect_inputs(&roots)?;
    let mut files = Vec::with_capacity(paths.len());
    for path in &paths {
        files.push(load_source(path).await?);
    }
    tracing::info!(files = files.len(), "Collected input files");

    let config = PipelineConfig::from_env();
    let pipeline = PipelineHandle::start(config, Arc::new(ImageCodec::new()));

    let report = pipeline.admit(files).await?;
    tracing::info!(
        admitted = report.admitted,
        duplicates = report.duplicates,
        pool_size = pipeline.pool_size(),
        "Conversion started",
    );

    let progress = pipeline.wait_idle().await?;
    let stats = &progress.stats;
    tracing::info!(
        completed = stats.completed_count,
        failed = stats.error_count,
        original = %format_size(stats.total_original_bytes_completed as i64),
        converted = %format_size(stats.total_output_bytes_completed as i64),
        saved = %format_size(stats.saved_bytes()),
        saved_percent = stats.saved_percent(),
        "Run settled",
    );

    if stats.completed_count == 0 {
        pipeline.shutdown().await;
        bail!("no file could be converted");
    }

    let archive = pipeline.export_archive().await?;
    tokio::fs::write(&output, &archive)
        .await
        .with_context(|| format!("Failed to write {output}"))?;
    tracing::info!(path = %output, size = %format_size(archive.len() as i64), "Archive written");

    pipeline.shutdown().await;
    Ok(())
}

/// Expand `roots` into image file paths.
///
/// Files named directly are kept if they look like images. Directories are
/// walked recursively with entries sorted by name, so the order is stable.
fn collect_inputs(roots: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for root in roots {
        walk(root, &mut found)?;
    }
    Ok(found)
}

fn walk(path: &Path, found: &mut Vec<PathBuf>) -> anyhow::Result<()> {
    let metadata =
        std::fs::metadata(path).with_context(|| format!("Cannot read {}", path.display()))?;

    if metadata.is_dir() {
        let mut entries = std::fs::read_dir(path)
            .with_context(|| format!("Cannot list {}", path.display()))?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        entries.sort();
        for entry in entries {
            walk(&entry, found)?;
        }
    } else if is_image_path(path) {
        found.push(path.to_path_buf());
    } else {
        tracing::debug!(path = %path.display(), "Skipping non-image file");
    }
    Ok(())
}

fn is_image_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .and_then(media_type_for_name)
        .is_some()
}

async fn load_source(path: &Path) -> anyhow::Result<SourceFile> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("Invalid file name {}", path.display()))?;
    let media_type = media_type_for_name(name)
        .with_context(|| format!("Unsupported file type {}", path.display()))?;

    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let last_modified_ms = tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_millis() as i64);

    Ok(SourceFile::new(name, media_type, last_modified_ms, data))
}
