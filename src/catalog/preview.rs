use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::metadata::load_json;
use super::paths::{existing_preview, info_path, preview_path};
use crate::civitai::{image_url, VersionImage};
use crate::config::NsfwLadder;
use crate::context::HelperContext;
use crate::download::{temp_path, DownloadJob, DownloadOutcome};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreviewOutcome {
    /// A preview was already present and was left alone
    Existing(PathBuf),
    Downloaded(PathBuf),
    /// No acceptable image could be fetched
    NotFound,
}

/// Image URLs eligible as a preview, in sidecar order: real images with a
/// URL and a rating at or below `ceiling`.
pub fn preview_candidates(
    images: &[VersionImage],
    ladder: &NsfwLadder,
    ceiling: &str,
    max_size: bool,
) -> Vec<String> {
    images
        .iter()
        .filter(|image| image.url.as_deref().map_or(false, |url| !url.is_empty()))
        .filter(|image| {
            let allowed = ladder.allows(ceiling, Some(image.rating(ladder)));
            if !allowed {
                debug!("Skip NSFW image {:?}", image.url);
            }
            allowed
        })
        .filter(|image| {
            if !image.is_image() {
                debug!("Preview is not an image. Found {:?} instead. Skipping.", image.kind);
            }
            image.is_image()
        })
        .filter_map(|image| image_url(image, max_size))
        .collect()
}

/// URL to fetch for a caller-chosen preview. An image missing from the
/// sidecar list has no rating and is judged as unrated.
fn preferred_url(
    images: &[VersionImage],
    preferred: &str,
    ladder: &NsfwLadder,
    ceiling: &str,
    max_size: bool,
) -> Option<String> {
    let listed = images
        .iter()
        .find(|image| image.url.as_deref() == Some(preferred));
    let rating = listed.map(|image| image.rating(ladder));
    if !ladder.allows(ceiling, rating) {
        debug!("Skip NSFW preferred preview {}", preferred);
        return None;
    }

    match listed {
        Some(image) => image_url(image, max_size),
        None => Some(preferred.to_string()),
    }
}

/// Downloads `<base>.preview.png` from the model's sidecar images unless a
/// preview already exists. A `preferred` URL is tried first.
pub async fn download_preview(
    ctx: &HelperContext,
    model_path: &Path,
    preferred: Option<&str>,
) -> PreviewOutcome {
    if !model_path.is_file() {
        debug!("model_path is not a file: {}", model_path.display());
        return PreviewOutcome::NotFound;
    }
    if let Some(existing) = existing_preview(model_path) {
        debug!("Existing model image found. Skipping.");
        return PreviewOutcome::Existing(existing);
    }

    let images: Vec<VersionImage> = load_json(&info_path(model_path))
        .and_then(|info| info.get("images").cloned())
        .and_then(|images| serde_json::from_value::<Vec<Value>>(images).ok())
        .unwrap_or_default()
        .into_iter()
        .map(|image| serde_json::from_value(image).unwrap_or_default())
        .collect();

    let ladder = &ctx.settings.nsfw;
    let ceiling = ctx.settings.metadata.nsfw_ceiling.as_str();
    let max_size = ctx.settings.metadata.max_size_preview;
    let target = preview_path(model_path);

    if let Some(preferred) = preferred.filter(|url| !url.is_empty()) {
        if let Some(url) = preferred_url(&images, preferred, ladder, ceiling, max_size) {
            let outcome = fetch_preview(ctx, &url, &target).await;
            if outcome.success {
                info!("Saved preview for {}", model_path.display());
                return PreviewOutcome::Downloaded(target);
            }
            warn!(
                "Failed to download preferred preview ({}). Trying to find another",
                outcome.message
            );
        }
    }

    for url in preview_candidates(&images, ladder, ceiling, max_size) {
        let outcome = fetch_preview(ctx, &url, &target).await;
        if outcome.success {
            info!("Saved preview for {}", model_path.display());
            return PreviewOutcome::Downloaded(target);
        }
        debug!("Preview {} failed: {}", url, outcome.message);
    }

    info!("Could not find any valid preview images for model: {}", model_path.display());
    PreviewOutcome::NotFound
}

/// Partial data left by a different candidate URL must not be resumed
async fn fetch_preview(ctx: &HelperContext, url: &str, target: &Path) -> DownloadOutcome {
    let _ = tokio::fs::remove_file(temp_path(target)).await;
    ctx.downloader.run(DownloadJob::to_path(url, target)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn image(url: &str, level: u32, kind: &str) -> VersionImage {
        serde_json::from_value(json!({"url": url, "nsfwLevel": level, "type": kind})).unwrap()
    }

    #[test]
    fn candidates_respect_ceiling_and_media_type() {
        let images = vec![
            image("https://x/r.png", 4, "image"),
            image("https://x/pg.png", 1, "image"),
            image("https://x/clip.mp4", 1, "video"),
            image("https://x/pg13.png", 2, "image"),
            VersionImage { kind: Some("image".into()), ..Default::default() },
        ];

        let ladder = NsfwLadder::default();
        assert_eq!(
            preview_candidates(&images, &ladder, "PG13", false),
            vec!["https://x/pg.png".to_string(), "https://x/pg13.png".to_string()]
        );
        assert_eq!(preview_candidates(&images, &ladder, "R", false).len(), 3);
    }

    #[test]
    fn unrated_images_are_refused_by_default() {
        let unrated = vec![VersionImage {
            url: Some("https://x/u.png".into()),
            kind: Some("image".into()),
            ..Default::default()
        }];
        assert!(preview_candidates(&unrated, &NsfwLadder::default(), "XXX", false).is_empty());
    }

    #[test]
    fn preferred_url_is_checked_against_the_ceiling() {
        let ladder = NsfwLadder::default();
        let images = vec![image("https://x/pg.png", 1, "image"), image("https://x/r.png", 4, "image")];

        assert_eq!(
            preferred_url(&images, "https://x/pg.png", &ladder, "PG", false),
            Some("https://x/pg.png".to_string())
        );
        assert!(preferred_url(&images, "https://x/r.png", &ladder, "PG", false).is_none());
        assert!(preferred_url(&images, "https://x/elsewhere.png", &ladder, "XXX", false).is_none());

        let mut open = ladder.clone();
        open.unrated = 1;
        assert_eq!(
            preferred_url(&images, "https://x/elsewhere.png", &open, "PG", false),
            Some("https://x/elsewhere.png".to_string())
        );
    }
}
