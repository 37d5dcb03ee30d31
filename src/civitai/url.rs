use once_cell::sync::Lazy;
use regex::Regex;

use super::types::VersionImage;

static WIDTH_SEGMENT: Lazy<Regex> = Lazy::new(|| Regex::new(r"/width=\d+/").unwrap());

/// Model id from a model page URL or a bare numeric id.
///
/// The query string is ignored; the id is the second-to-last path segment
/// (`/models/<id>/<slug>`) or, failing that, the last one (`/models/<id>`).
pub fn model_id_from_url(url: &str) -> Option<String> {
    let url = url.trim();
    if is_numeric(url) {
        return Some(url.to_string());
    }

    let url = url.split('?').next().unwrap_or(url);
    let segments: Vec<&str> = url.split('/').collect();
    if segments.len() < 2 {
        return None;
    }

    let second_last = segments[segments.len() - 2];
    let last = segments[segments.len() - 1];
    [second_last, last]
        .into_iter()
        .find(|segment| is_numeric(segment))
        .map(str::to_string)
}

fn is_numeric(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

/// Download URL of an image, rewritten to its full width when `max_size` is set
pub fn image_url(image: &VersionImage, max_size: bool) -> Option<String> {
    let url = image.url.as_deref()?;
    match image.width.filter(|_| max_size) {
        Some(width) => Some(
            WIDTH_SEGMENT
                .replace(url, format!("/width={}/", width).as_str())
                .into_owned(),
        ),
        None => Some(url.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_model_ids() {
        assert_eq!(model_id_from_url("12345"), Some("12345".into()));
        assert_eq!(
            model_id_from_url("https://civitai.com/models/12345/some-model?modelVersionId=9"),
            Some("12345".into())
        );
        assert_eq!(model_id_from_url("https://civitai.com/models/678"), Some("678".into()));
        assert_eq!(model_id_from_url("https://civitai.com/models/678/"), Some("678".into()));
        assert_eq!(model_id_from_url("https://civitai.com/models/abc/def"), None);
        assert_eq!(model_id_from_url(""), None);
    }

    #[test]
    fn widens_preview_urls() {
        let image = VersionImage {
            url: Some("https://img.example/abc/width=450/1.jpeg".into()),
            width: Some(1024),
            ..Default::default()
        };
        assert_eq!(
            image_url(&image, true).unwrap(),
            "https://img.example/abc/width=1024/1.jpeg"
        );
        assert_eq!(
            image_url(&image, false).unwrap(),
            "https://img.example/abc/width=450/1.jpeg"
        );
    }
}
