use std::cmp::Ordering;
use std::fs;
use std::path::Path;

use chrono::Utc;
use semver::Version;
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::paths::{host_path, info_path};
use crate::civitai::id_of;
use crate::error::{Error, Result};

/// Key of the provenance block inside `extensions`
pub const PROVENANCE_KEY: &str = "sd_civitai_helper";
/// Schema version stamped into every sidecar this crate writes
pub const METADATA_VERSION: &str = "1.8.3";
/// Primary sidecars stamped before this version are stale
pub const COMPAT_VERSION_INFO: &str = "1.7.2";
/// Host sidecars stamped before this version are stale
pub const COMPAT_VERSION_HOST: &str = "1.8.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidecarKind {
    /// `<base>.civitai.info`
    Info,
    /// `<base>.json`
    Host,
}

impl SidecarKind {
    pub fn compat_version(&self) -> &'static str {
        match self {
            SidecarKind::Info => COMPAT_VERSION_INFO,
            SidecarKind::Host => COMPAT_VERSION_HOST,
        }
    }
}

/// Reads a JSON sidecar. Missing, unreadable and malformed files all read
/// as absent.
pub fn load_json(path: &Path) -> Option<Value> {
    let content = fs::read_to_string(path).ok()?;
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Selected file is not json: {}: {}", path.display(), e);
            None
        }
    }
}

/// Writes JSON with four-space indentation, following symlinks to the real file
pub fn write_json(path: &Path, value: &Value) -> Result<()> {
    let target = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());

    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut serializer)?;

    fs::write(&target, out)?;
    debug!("Wrote {}", target.display());
    Ok(())
}

/// Provenance version recorded in a sidecar
pub fn metadata_version(metadata: &Value) -> Option<&str> {
    metadata
        .get("extensions")?
        .get(PROVENANCE_KEY)?
        .get("version")?
        .as_str()
}

fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(raw) {
        return Some(version);
    }
    // Short forms such as "1.7"
    let mut parts: Vec<&str> = raw.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    while parts.len() < 3 {
        parts.push("0");
    }
    Version::parse(&parts.join(".")).ok()
}

/// `a > b` as versions. Unparseable versions sort below everything.
pub fn newer_version(a: &str, b: &str) -> bool {
    match (parse_version(a), parse_version(b)) {
        (Some(a), Some(b)) => a.cmp(&b) == Ordering::Greater,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Whether the sidecar at `path` has to be (re)written.
///
/// Absent or unreadable → needed. Present → needed only under `refetch_old`
/// when it carries no provenance or was stamped before the compat version.
pub fn metadata_needed_for(path: &Path, kind: SidecarKind, refetch_old: bool) -> bool {
    if !path.is_file() {
        return true;
    }
    if !refetch_old {
        return false;
    }

    let Some(metadata) = load_json(path) else {
        return true;
    };
    match metadata_version(&metadata) {
        Some(version) => newer_version(kind.compat_version(), version),
        None => true,
    }
}

/// Whether a model needs metadata. The host sidecar only counts when
/// `write_host` is on.
pub fn metadata_needed(model_path: &Path, refetch_old: bool, write_host: bool) -> bool {
    let need_info = metadata_needed_for(&info_path(model_path), SidecarKind::Info, refetch_old);
    let need_host =
        write_host && metadata_needed_for(&host_path(model_path), SidecarKind::Host, refetch_old);
    need_info || need_host
}

/// Stamps the provenance block into `existing` (or a fresh `extensions` map)
pub fn extension_block(existing: Option<&Value>, skeleton: bool) -> Value {
    let mut block = match existing {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    block.insert(
        PROVENANCE_KEY.to_string(),
        json!({
            "version": METADATA_VERSION,
            "last_update": Utc::now().timestamp(),
            "skeleton_file": skeleton,
        }),
    );
    Value::Object(block)
}

/// Checks that `new_data` may replace the sidecar at `path`.
///
/// A primary sidecar recording a different, non-empty id is a
/// `VersionMismatch`. A blank incoming description over a non-blank one
/// returns `Ok(false)` so the write is skipped.
pub fn verify_overwrite_eligibility(path: &Path, kind: SidecarKind, new_data: &Value) -> Result<bool> {
    if !path.is_file() {
        return Ok(true);
    }
    let Some(old_data) = load_json(path) else {
        return Ok(true);
    };

    if kind == SidecarKind::Info {
        let new_id = id_of(new_data, "id");
        let old_id = id_of(&old_data, "id");
        if new_id != old_id && !old_id.is_empty() {
            return Err(Error::VersionMismatch { new_id, old_id });
        }
    }

    let description = |data: &Value| {
        data.get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    if description(new_data).is_empty() && !description(&old_data).is_empty() {
        info!(
            "New description is blank while old description contains data. Skipping {}",
            path.display()
        );
        return Ok(false);
    }

    Ok(true)
}
