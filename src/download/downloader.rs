use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use async_stream::stream;
use futures::{Stream, StreamExt};
use percent_encoding::percent_decode_str;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, RANGE};
use reqwest::{Response, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::types::{
    Destination, DownloadEvent, DownloadJob, DownloadOutcome, DownloadProgress, DuplicatePolicy,
};
use crate::http::{FetchError, Fetcher};

/// Suffix of in-progress downloads
pub const DL_EXT: &str = ".downloading";

const PROGRESS_INTERVAL: Duration = Duration::from_millis(200);

/// Streams single-file downloads through a temp file that survives
/// interruption and is resumed with a `Range` request on the next attempt.
#[derive(Debug, Clone)]
pub struct Downloader {
    fetcher: Fetcher,
}

impl Downloader {
    pub fn new(fetcher: Fetcher) -> Self {
        Self { fetcher }
    }

    /// Downloads one file, yielding progress and exactly one `Finished`.
    ///
    /// Nothing happens until the stream is polled. Dropping the stream stops
    /// the transfer and leaves the temp file in place for a later resume.
    pub fn download(&self, job: DownloadJob) -> impl Stream<Item = DownloadEvent> + '_ {
        stream! {
            let DownloadJob { url, destination, duplicate, headers } = job;

            let response = match self.fetcher.get(&url, Some(&headers)).await {
                Ok(response) => response,
                Err(e) => {
                    yield DownloadEvent::Finished(DownloadOutcome::failed(e.to_string()));
                    return;
                }
            };

            let file_path = match resolve_destination(&destination, &response) {
                Ok(path) => path,
                Err(message) => {
                    warn!("{}", message);
                    yield DownloadEvent::Finished(DownloadOutcome::failed(message));
                    return;
                }
            };

            let file_path = match apply_duplicate_policy(file_path, duplicate) {
                Ok(path) => path,
                Err(message) => {
                    info!("{}", message);
                    yield DownloadEvent::Finished(DownloadOutcome::failed(message));
                    return;
                }
            };

            let total = response.content_length().unwrap_or(0);
            info!("Downloading {} to {} ({} bytes)", url, file_path.display(), total);

            let transfer = self.transfer(url, file_path, total, headers, response);
            for await event in transfer {
                yield event;
            }
        }
    }

    /// Runs a download to completion and returns only its outcome
    pub async fn run(&self, job: DownloadJob) -> DownloadOutcome {
        let url = job.url.clone();
        let mut outcome = None;

        let events = self.download(job);
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            if let DownloadEvent::Finished(finished) = event {
                outcome = Some(finished);
            }
        }

        outcome.unwrap_or_else(|| {
            DownloadOutcome::failed(format!("Download of {} ended without a result", url))
        })
    }

    fn transfer(
        &self,
        url: String,
        file_path: PathBuf,
        total: u64,
        headers: HeaderMap,
        initial: Response,
    ) -> impl Stream<Item = DownloadEvent> + '_ {
        stream! {
            let dl_path = temp_path(&file_path);
            let mut initial = Some(initial);
            let mut restarted = false;

            let (response, resumed_from) = loop {
                let existing = fs::metadata(&dl_path).await.map(|m| m.len()).unwrap_or(0);
                if existing == 0 {
                    if let Some(response) = initial.take() {
                        break (response, 0);
                    }
                }
                // The first response is only good for a fresh transfer
                drop(initial.take());

                let mut request_headers = headers.clone();
                if existing > 0 {
                    info!("Resuming partially downloaded file from progress: {}", existing);
                    if let Ok(value) = HeaderValue::from_str(&format!("bytes={}-", existing)) {
                        request_headers.insert(RANGE, value);
                    }
                }

                match self.fetcher.get(&url, Some(&request_headers)).await {
                    Ok(response) => break (response, existing),
                    Err(FetchError::RangeNotSatisfiable) if existing > 0 && !restarted => {
                        info!("Could not resume download from existing temporary file. Restarting download");
                        if let Err(e) = fs::remove_file(&dl_path).await {
                            yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                                "Failed to remove temporary file {}: {}",
                                dl_path.display(),
                                e
                            )));
                            return;
                        }
                        restarted = true;
                    }
                    Err(e) => {
                        yield DownloadEvent::Finished(DownloadOutcome::failed(e.to_string()));
                        return;
                    }
                }
            };

            // A server that ignores Range sends the whole body again
            let resumed_from = if resumed_from > 0 && response.status() != StatusCode::PARTIAL_CONTENT {
                debug!("Server ignored the Range request, restarting from zero");
                0
            } else {
                resumed_from
            };

            let file = if resumed_from > 0 {
                OpenOptions::new().append(true).open(&dl_path).await
            } else {
                OpenOptions::new().create(true).write(true).truncate(true).open(&dl_path).await
            };
            let mut file = match file {
                Ok(file) => file,
                Err(e) => {
                    yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                        "Failed to open {}: {}",
                        dl_path.display(),
                        e
                    )));
                    return;
                }
            };

            let started = Instant::now();
            let mut last_tick: Option<Instant> = None;
            let mut downloaded = resumed_from;
            let mut session_bytes: u64 = 0;
            let mut body = response.bytes_stream();

            while let Some(chunk) = body.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        warn!("Download of {} interrupted at {} bytes: {}", url, downloaded, e);
                        yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                            "Download interrupted: {}",
                            e
                        )));
                        return;
                    }
                };

                let written = match file.write_all(&chunk).await {
                    Ok(()) => file.flush().await,
                    Err(e) => Err(e),
                };
                if let Err(e) = written {
                    yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                        "Failed to write {}: {}",
                        dl_path.display(),
                        e
                    )));
                    return;
                }

                downloaded += chunk.len() as u64;
                session_bytes += chunk.len() as u64;

                let percent = if total > 0 {
                    ((downloaded as f64 / total as f64) * 100.0).min(100.0) as u8
                } else {
                    0
                };

                let due = last_tick.map_or(true, |tick| tick.elapsed() > PROGRESS_INTERVAL);
                if due || percent == 100 {
                    last_tick = Some(Instant::now());
                    let elapsed = started.elapsed().as_secs_f64();
                    let speed = if elapsed >= 1.0 {
                        (session_bytes as f64 / elapsed) as u64
                    } else {
                        session_bytes
                    };
                    yield DownloadEvent::Progress(DownloadProgress { percent, downloaded, total, speed });
                }
            }
            drop(file);

            let size = fs::metadata(&dl_path).await.map(|m| m.len()).unwrap_or(0);
            let warning = if size != total {
                let message = format!(
                    "File is not the same size as indicated by the server. Expected {} bytes, got {} bytes",
                    total, size
                );
                warn!("{}", message);
                Some(message)
            } else {
                None
            };

            if file_path.is_file() {
                if let Err(e) = fs::remove_file(&file_path).await {
                    yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                        "Failed to replace {}: {}",
                        file_path.display(),
                        e
                    )));
                    return;
                }
            }
            if let Err(e) = fs::rename(&dl_path, &file_path).await {
                yield DownloadEvent::Finished(DownloadOutcome::failed(format!(
                    "Failed to move {} into place: {}",
                    dl_path.display(),
                    e
                )));
                return;
            }

            info!("File Downloaded to: {}", file_path.display());
            let mut outcome = DownloadOutcome::succeeded(file_path);
            outcome.warning = warning;
            yield DownloadEvent::Finished(outcome);
        }
    }
}

/// `<path>.downloading`
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(DL_EXT);
    PathBuf::from(name)
}

fn resolve_destination(destination: &Destination, response: &Response) -> Result<PathBuf, String> {
    match destination {
        Destination::Path(path) => Ok(path.clone()),
        Destination::Folder { folder, filename } => {
            if !folder.is_dir() {
                return Err("No directory to save model to.".to_string());
            }
            let name = match filename.as_deref().filter(|name| !name.is_empty()) {
                Some(name) => Some(name.to_string()),
                None => response
                    .headers()
                    .get(CONTENT_DISPOSITION)
                    .and_then(|value| parse_content_disposition(value.as_bytes())),
            };
            name.map(|name| folder.join(name))
                .ok_or_else(|| "Could not get a file_path to place saved file.".to_string())
        }
    }
}

/// Applies the duplicate policy to an occupied destination
pub fn apply_duplicate_policy(path: PathBuf, policy: DuplicatePolicy) -> Result<PathBuf, String> {
    if !path.is_file() {
        return Ok(path);
    }

    match policy {
        DuplicatePolicy::Skip => Err(format!(
            "File {} already exists! Download will not proceed.",
            path.display()
        )),
        DuplicatePolicy::Overwrite => {
            info!("Overwriting existing file {}", path.display());
            Ok(path)
        }
        DuplicatePolicy::Rename => {
            let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            let ext = path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default();

            let mut count = 2;
            loop {
                let candidate = parent.join(format!("{}_{}{}", stem, count, ext));
                if !candidate.is_file() {
                    info!("Renamed download to {}", candidate.display());
                    return Ok(candidate);
                }
                count += 1;
            }
        }
    }
}

/// Filename from a raw `Content-Disposition` value.
///
/// Header bytes are read as UTF-8 and `filename*=` wins over `filename=`.
/// Only the last path component is kept.
pub fn parse_content_disposition(raw: &[u8]) -> Option<String> {
    let value = String::from_utf8_lossy(raw);
    let mut plain = None;

    for part in value.split(';') {
        let trimmed = part.trim();
        if let Some(rest) = trimmed.strip_prefix("filename*=") {
            let rest = rest.trim_matches('"');
            let encoded = rest.split("''").last().unwrap_or(rest);
            if let Ok(decoded) = percent_decode_str(encoded).decode_utf8() {
                if let Some(name) = file_name_only(&decoded) {
                    return Some(name);
                }
            }
        } else if let Some(rest) = trimmed.strip_prefix("filename=") {
            let name = percent_decode_str(rest.trim_matches('"')).decode_utf8_lossy();
            if plain.is_none() {
                plain = file_name_only(&name);
            }
        }
    }
    plain
}

fn file_name_only(name: &str) -> Option<String> {
    let name = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    if name.is_empty() || name == "." || name == ".." {
        None
    } else {
        Some(name.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_path(Path::new("/models/a.safetensors")),
            PathBuf::from("/models/a.safetensors.downloading")
        );
    }

    #[test]
    fn content_disposition_prefers_extended_name() {
        let raw = br#"attachment; filename="plain.bin"; filename*=UTF-8''caf%C3%A9.safetensors"#;
        assert_eq!(parse_content_disposition(raw), Some("café.safetensors".to_string()));
    }

    #[test]
    fn content_disposition_reads_utf8_bytes() {
        let raw = "attachment; filename=\"modèle.ckpt\"".as_bytes();
        assert_eq!(parse_content_disposition(raw), Some("modèle.ckpt".to_string()));
    }

    #[test]
    fn content_disposition_strips_directories() {
        let raw = br#"attachment; filename="../../etc/passwd""#;
        assert_eq!(parse_content_disposition(raw), Some("passwd".to_string()));
        assert_eq!(parse_content_disposition(b"inline"), None);
    }

    #[test]
    fn rename_picks_smallest_free_suffix() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("model.safetensors");
        std::fs::write(&target, b"a").unwrap();
        std::fs::write(dir.path().join("model_2.safetensors"), b"b").unwrap();

        let renamed = apply_duplicate_policy(target.clone(), DuplicatePolicy::Rename).unwrap();
        assert_eq!(renamed, dir.path().join("model_3.safetensors"));

        let skipped = apply_duplicate_policy(target.clone(), DuplicatePolicy::Skip);
        assert!(skipped.unwrap_err().contains("already exists"));

        assert_eq!(
            apply_duplicate_policy(target.clone(), DuplicatePolicy::Overwrite).unwrap(),
            target
        );
    }
}
