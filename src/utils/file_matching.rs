//! Matching firmware variants against already-downloaded local files
//!
//! Pure functions; all matching is case-insensitive, whitespace-trimmed and
//! exact-string. No fuzzy matching.

use std::collections::HashSet;
use url::Url;

use crate::core::models::{FirmwareVariant, LocalFile};

/// Trimmed, lower-cased filename form used for all comparisons
pub fn normalize_file_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Percent-decoded basename of a URL's path component.
///
/// Any parse failure (or an empty basename) yields `None`; the caller simply
/// loses the URL-derived candidate.
pub fn url_basename(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let last = url.path_segments()?.filter(|s| !s.is_empty()).last()?;
    let decoded = urlencoding::decode(last).ok()?;
    let normalized = normalize_file_name(&decoded);
    if normalized.is_empty() {
        None
    } else {
        Some(normalized)
    }
}

/// Filenames that plausibly identify the artifact for a variant: the
/// normalized variant name plus the normalized basename of its URL.
pub fn candidate_file_names(variant: &FirmwareVariant) -> HashSet<String> {
    let mut candidates = HashSet::new();
    let name = normalize_file_name(&variant.name);
    if !name.is_empty() {
        candidates.insert(name);
    }
    if let Some(from_url) = url_basename(&variant.url) {
        candidates.insert(from_url);
    }
    candidates
}

/// The most recently modified local file whose name matches the variant,
/// or `None` when nothing matches. Ties on `modified_at` are unspecified.
pub fn best_local_match<'a>(
    variant: &FirmwareVariant,
    files: &'a [LocalFile],
) -> Option<&'a LocalFile> {
    let candidates = candidate_file_names(variant);
    if candidates.is_empty() {
        return None;
    }
    files
        .iter()
        .filter(|file| candidates.contains(&normalize_file_name(&file.file_name)))
        .max_by_key(|file| file.modified_at)
}

/// Inverse lookup: the variant (carrying a non-empty recipe URL) whose name
/// or URL basename matches the file.
///
/// When several variants match, the last one in input order wins; downstream
/// recipe selection depends on this ordering.
pub fn best_variant_for_local_file<'a>(
    file: &LocalFile,
    variants: &'a [FirmwareVariant],
) -> Option<&'a FirmwareVariant> {
    let file_name = normalize_file_name(&file.file_name);
    if file_name.is_empty() {
        return None;
    }
    variants
        .iter()
        .filter(|variant| {
            variant
                .recipe_url
                .as_deref()
                .map(|recipe| !recipe.is_empty())
                .unwrap_or(false)
        })
        .filter(|variant| {
            normalize_file_name(&variant.name) == file_name
                || url_basename(&variant.url).as_deref() == Some(file_name.as_str())
        })
        .last()
}
