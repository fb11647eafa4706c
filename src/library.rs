//! Secondary image library: key index construction and the profile merge.
//!
//! The library is a weakly-joined auxiliary collection; rows are matched to
//! profiles by normalized name only, and only to backfill photos the
//! primary source did not provide.

use std::collections::HashMap;

use crate::normalize;
use crate::record::ProfileRecord;

/// One row projected from the image library.
#[derive(Debug, Clone, Default)]
pub struct ImageEntry {
    pub title: Option<String>,
    pub file_name: Option<String>,
    pub file_ref: Option<String>,
}

/// Resolve a library path to an absolute URL. Paths already carrying a
/// scheme pass through unchanged.
pub fn resolve_asset_url(path: &str, origin: &str) -> Option<String> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let lower = path.to_ascii_lowercase();
    if lower.starts_with("http:") || lower.starts_with("https:") {
        return Some(path.to_string());
    }
    if path.starts_with('/') {
        Some(format!("{origin}{path}"))
    } else {
        Some(format!("{origin}/{path}"))
    }
}

/// Build the normalized-key -> absolute-URL index. Each entry contributes
/// up to two keys (title and file name) so either can match. Empty keys are
/// skipped; on collision the first writer wins.
pub fn build_index(entries: &[ImageEntry], origin: &str) -> HashMap<String, String> {
    let mut index = HashMap::new();
    for entry in entries {
        let Some(url) = entry
            .file_ref
            .as_deref()
            .and_then(|path| resolve_asset_url(path, origin))
        else {
            continue;
        };

        let title_key = entry
            .title
            .as_deref()
            .map(normalize::join_key)
            .unwrap_or_default();
        let name_key = entry
            .file_name
            .as_deref()
            .map(normalize::file_key)
            .unwrap_or_default();

        for key in [title_key, name_key] {
            if key.is_empty() || index.contains_key(&key) {
                continue;
            }
            index.insert(key, url.clone());
        }
    }
    index
}

/// Join profiles against the index by normalized name, filling in a photo
/// URL only where the primary record lacks one. Functional: the input is
/// never mutated, and output order matches input order.
pub fn merge_photos(
    profiles: &[ProfileRecord],
    index: &HashMap<String, String>,
) -> Vec<ProfileRecord> {
    profiles
        .iter()
        .map(|profile| {
            let mut merged = profile.clone();
            if merged.photo_url.is_none() {
                if let Some(url) = index.get(&normalize::join_key(&merged.name)) {
                    merged.photo_url = Some(url.clone());
                }
            }
            merged
        })
        .collect()
}
