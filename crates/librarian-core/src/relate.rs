//! Name-similarity relationships between index entries.
//!
//! Two entries in the same category are related when their slugs (date
//! prefix and extension removed) share at least `min_shared_words` distinct
//! hyphen-separated words of at least `min_word_len` characters. The
//! threshold is inclusive.

use crate::models::IndexEntry;
use crate::normalize::dated_slug;

/// Thresholds for [`are_similar`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimilarityRule {
    pub min_shared_words: usize,
    pub min_word_len: usize,
}

impl Default for SimilarityRule {
    fn default() -> Self {
        Self {
            min_shared_words: 2,
            min_word_len: 4,
        }
    }
}

/// Slug of an already-indexed filename. Names without a date prefix are
/// compared with only the extension removed.
fn entry_slug(filename: &str) -> &str {
    if let Some(slug) = dated_slug(filename) {
        return slug;
    }
    match filename.rfind('.') {
        Some(pos) if pos > 0 => &filename[..pos],
        _ => filename,
    }
}

/// Number of distinct qualifying words of `a` that also occur in `b`.
///
/// A word repeated in `a` counts once, so `pipeline-pipeline-notes` shares
/// one word with `pipeline-review`, not two (see "Counting shared words"
/// in DESIGN.md).
/// Comparison is exact; slugs are already lower-case.
pub fn shared_words(a: &str, b: &str, min_word_len: usize) -> usize {
    let words_b: Vec<&str> = b.split('-').collect();
    let mut counted: Vec<&str> = Vec::new();
    for word in a.split('-') {
        if word.chars().count() < min_word_len || counted.contains(&word) {
            continue;
        }
        if words_b.contains(&word) {
            counted.push(word);
        }
    }
    counted.len()
}

pub fn are_similar(a: &str, b: &str, rule: SimilarityRule) -> bool {
    shared_words(a, b, rule.min_word_len) >= rule.min_shared_words
}

/// Ids of entries related to a newly normalized `filename` in `category`.
///
/// Entries in other categories and the entry with the same filename are
/// skipped. A filename without a date prefix relates to nothing. The result
/// follows the iteration order of `candidates`.
pub fn find_related<'a, I>(
    filename: &str,
    category: &str,
    candidates: I,
    rule: SimilarityRule,
) -> Vec<String>
where
    I: IntoIterator<Item = &'a IndexEntry>,
{
    let Some(slug) = dated_slug(filename) else {
        return Vec::new();
    };

    candidates
        .into_iter()
        .filter(|entry| entry.category == category && entry.filename != filename)
        .filter(|entry| are_similar(slug, entry_slug(&entry.filename), rule))
        .map(|entry| entry.id.clone())
        .collect()
}
