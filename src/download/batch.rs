use std::path::PathBuf;

use async_stream::stream;
use futures::Stream;
use tracing::{info, warn};

use super::downloader::Downloader;
use super::types::{DownloadEvent, DownloadJob, DownloadOutcome};

/// One file of a multi-file download
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub job: DownloadJob,
    /// The outcome path of a batch is taken from its primary item
    pub primary: bool,
}

impl Downloader {
    /// Downloads each item in order and folds the results into one outcome.
    ///
    /// The batch fails only when every item fails. Otherwise it succeeds
    /// with the primary item's path and lists the failures it saw.
    pub fn download_all(&self, items: Vec<BatchItem>) -> impl Stream<Item = DownloadEvent> + '_ {
        stream! {
            if items.is_empty() {
                yield DownloadEvent::Finished(DownloadOutcome::failed("Nothing to download."));
                return;
            }

            let total = items.len();
            let mut failures: Vec<String> = Vec::new();
            let mut warnings: Vec<String> = Vec::new();
            let mut primary_path: Option<PathBuf> = None;
            let mut first_path: Option<PathBuf> = None;

            for (index, item) in items.into_iter().enumerate() {
                let url = item.job.url.clone();
                info!("Downloading file {} of {}: {}", index + 1, total, url);
                yield DownloadEvent::FileStarted { index: index + 1, total, url: url.clone() };

                let mut outcome = None;
                for await event in self.download(item.job) {
                    match event {
                        DownloadEvent::Finished(finished) => outcome = Some(finished),
                        other => yield other,
                    }
                }

                match outcome {
                    Some(outcome) if outcome.success => {
                        if let Some(warning) = outcome.warning {
                            warnings.push(warning);
                        }
                        if item.primary && primary_path.is_none() {
                            primary_path = outcome.path.clone();
                        }
                        if first_path.is_none() {
                            first_path = outcome.path;
                        }
                    }
                    Some(outcome) => failures.push(download_error(&url, &outcome.message)),
                    None => failures.push(download_error(&url, "Download ended without a result")),
                }
            }

            if failures.len() == total {
                warn!("All {} downloads failed", total);
                yield DownloadEvent::Finished(DownloadOutcome::failed(failures.join("\n")));
                return;
            }

            let path = primary_path.or(first_path);
            let mut message = match &path {
                Some(path) => format!("Done. Downloaded to: {}", path.display()),
                None => "Done.".to_string(),
            };
            if !failures.is_empty() {
                message.push_str("\nAdditionally, the following failures occurred:\n");
                message.push_str(&failures.join("\n"));
            }

            yield DownloadEvent::Finished(DownloadOutcome {
                success: true,
                path,
                message,
                warning: (!warnings.is_empty()).then(|| warnings.join("\n")),
                additional_failures: failures,
            });
        }
    }
}

fn download_error(url: &str, message: &str) -> String {
    format!("Download failed.\n   {}\n   Download url: {}", message, url)
}
