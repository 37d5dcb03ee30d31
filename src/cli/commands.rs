use std::path::PathBuf;
use std::time::Duration;

use anyhow::bail;
use colored::*;
use futures::{pin_mut, Stream, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};

use civhelp::catalog::{fetch_model_info, scan_models, ModelType, ScanEvent, VersionDownload};
use civhelp::download::{DownloadEvent, DownloadJob, DownloadOutcome, DuplicatePolicy};
use civhelp::duplicates::scan_for_duplicates;
use civhelp::hash::{cache_key, HashEvent, HashMode};
use civhelp::versions::check_models_new_version;
use civhelp::HelperContext;

use super::display::{display_duplicates, display_new_versions, display_outcome};

fn spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn transfer_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb
}

/// Renders a download event sequence and returns its outcome
async fn drive_download(events: impl Stream<Item = DownloadEvent>) -> DownloadOutcome {
    pin_mut!(events);
    let pb = transfer_bar();
    let mut outcome = DownloadOutcome::failed("Download ended without a result");

    while let Some(event) = events.next().await {
        match event {
            DownloadEvent::FileStarted { index, total, url } => {
                pb.set_position(0);
                pb.set_prefix(format!("{}/{}", index, total));
                pb.set_message(url);
            }
            DownloadEvent::Progress(progress) => {
                pb.set_position(u64::from(progress.percent));
                pb.set_message(progress.text());
            }
            DownloadEvent::Finished(result) => {
                outcome = result;
            }
        }
    }

    pb.finish_and_clear();
    outcome
}

pub(super) async fn handle_scan(
    ctx: &HelperContext,
    types: Vec<ModelType>,
    refetch_old: bool,
) -> anyhow::Result<()> {
    let events = scan_models(ctx, types, refetch_old);
    pin_mut!(events);
    let pb = spinner();

    while let Some(event) = events.next().await {
        match event {
            ScanEvent::Model { index, total, path } => {
                pb.set_prefix(format!("{}/{}", index, total));
                pb.set_message(path.display().to_string());
            }
            ScanEvent::Progress { message, .. } => pb.set_message(message),
            ScanEvent::Status(message) => pb.println(message),
            ScanEvent::Finished(summary) => {
                pb.finish_and_clear();
                println!("{}", summary.message.bright_green());
                return Ok(());
            }
        }
    }

    pb.finish_and_clear();
    Ok(())
}

pub(super) async fn handle_download(
    ctx: &HelperContext,
    url: String,
    folder: PathBuf,
    filename: Option<String>,
    duplicate: DuplicatePolicy,
) -> anyhow::Result<()> {
    let job = DownloadJob::to_folder(url, folder, filename)
        .with_duplicate(duplicate)
        .with_headers(ctx.civitai.headers().clone());
    let outcome = drive_download(ctx.downloader.download(job)).await;
    display_outcome(&outcome);
    if !outcome.success {
        bail!("download failed");
    }
    Ok(())
}

pub(super) async fn handle_download_version(
    ctx: &HelperContext,
    request: VersionDownload,
) -> anyhow::Result<()> {
    let outcome = drive_download(civhelp::catalog::download_model_version(ctx, request)).await;
    display_outcome(&outcome);
    if !outcome.success {
        bail!("version download failed");
    }
    Ok(())
}

pub(super) async fn handle_fetch_info(
    ctx: &HelperContext,
    model_type: ModelType,
    name: &str,
    model: &str,
) -> anyhow::Result<()> {
    let (path, outcome) = fetch_model_info(ctx, model_type, name, model).await?;
    println!(
        "{} {}",
        "Metadata attached to".bright_green(),
        path.display()
    );
    if !outcome.info_written {
        println!("{}", "Existing metadata was kept".yellow());
    }
    if outcome.host_written {
        println!("{}", "Host metadata written".bright_black());
    }
    if outcome.examples_downloaded > 0 {
        println!("Downloaded {} example images", outcome.examples_downloaded);
    }
    Ok(())
}

pub(super) async fn handle_duplicates(
    ctx: &HelperContext,
    types: Vec<ModelType>,
    cached_hash: bool,
) -> anyhow::Result<()> {
    let pb = spinner();
    pb.set_message("Scanning for duplicates...");
    let report = scan_for_duplicates(ctx, &types, cached_hash).await;
    pb.finish_and_clear();
    display_duplicates(&report?);
    Ok(())
}

pub(super) async fn handle_check_updates(
    ctx: &HelperContext,
    types: Vec<ModelType>,
) -> anyhow::Result<()> {
    let pb = spinner();
    pb.set_message("Checking for new versions...");
    let found = check_models_new_version(ctx, &types).await;
    pb.finish_and_clear();
    display_new_versions(&found, &ctx.civitai);
    Ok(())
}

pub(super) async fn handle_hash(
    ctx: &HelperContext,
    path: PathBuf,
    addnet: bool,
    model_type: Option<ModelType>,
) -> anyhow::Result<()> {
    let mode = if addnet { HashMode::SafetensorsOffset } else { HashMode::Full };
    let key = model_type.map(|t| cache_key(t.hash_namespace(), &path));

    let events = ctx.hashes.hash(path.clone(), key, mode);
    pin_mut!(events);
    let pb = transfer_bar();

    while let Some(event) = events.next().await {
        match event? {
            HashEvent::Progress { ratio, message } => {
                pb.set_position((ratio * 100.0) as u64);
                pb.set_message(message);
            }
            HashEvent::Digest(digest) => {
                pb.finish_and_clear();
                println!("{}  {}", digest, path.display());
                return Ok(());
            }
        }
    }

    pb.finish_and_clear();
    bail!("hashing ended without a digest")
}
