//! Canonical library filenames: `<YYYY-MM-DD>_<slug>.<ext>`.
//!
//! The date is resolved in this order:
//!
//! 1. an ISO `YYYY-MM-DD` prefix on the source file name;
//! 2. a `M-D-YY` / `MM-DD-YYYY` style date in the parent directory name,
//!    with two-digit years expanded to `20YY` and month/day zero-padded;
//! 3. the processing date supplied by the caller.
//!
//! Everything here is pure. The caller passes "today" so the same inputs
//! always produce the same filename, which is also the entry id basis.

use std::path::Path;
use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

/// Slug used when neither the title nor the file stem yields one.
const UNTITLED: &str = "untitled";

fn iso_prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4}-\d{2}-\d{2})").expect("valid regex"))
}

fn folder_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{1,2})-(\d{1,2})-(\d{2,4})").expect("valid regex"))
}

fn dated_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}_").expect("valid regex"))
}

fn non_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W+").expect("valid regex"))
}

/// Lower-cased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .filter(|e| !e.is_empty())
}

/// File name without its extension.
pub fn stem_of(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Date prefix for a source file, following the precedence in the module
/// docs.
pub fn resolve_date(source_path: &Path, today: NaiveDate) -> String {
    let stem = stem_of(source_path);
    if let Some(m) = iso_prefix_re().captures(&stem).and_then(|c| c.get(1)) {
        return m.as_str().to_string();
    }

    let folder = source_path
        .parent()
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if let Some(date) = folder_date(&folder) {
        return date;
    }

    today.format("%Y-%m-%d").to_string()
}

/// Parse a folder-style date such as `1-20-26` or `01-27-2026`.
///
/// Matches that are not a calendar date (an ISO folder name such as
/// `2026-01-27` reads as month 26) are not recognized.
pub fn folder_date(folder: &str) -> Option<String> {
    let caps = folder_date_re().captures(folder)?;
    let month: u32 = caps[1].parse().ok()?;
    let day: u32 = caps[2].parse().ok()?;
    let year = &caps[3];
    let year: i32 = if year.len() == 2 {
        format!("20{year}").parse().ok()?
    } else {
        year.parse().ok()?
    };
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    Some(date.format("%Y-%m-%d").to_string())
}

/// Lower-case, hyphenated, ASCII-only rendering of `title`.
///
/// Hyphens become word breaks; anything that is not an ASCII letter, digit,
/// or whitespace is dropped.
pub fn slugify(title: &str) -> String {
    let folded: String = title
        .chars()
        .filter_map(|ch| match ch {
            '-' => Some(' '),
            c if c.is_ascii_alphanumeric() || c.is_whitespace() => Some(c),
            _ => None,
        })
        .collect();

    folded
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_ascii_lowercase()
}

/// Normalized library filename for a document.
///
/// Falls back to the slug of the file stem, then to `untitled`, when the
/// title has no ASCII-renderable characters.
pub fn normalize_filename(title: &str, source_path: &Path, today: NaiveDate) -> String {
    let date = resolve_date(source_path, today);

    let mut slug = slugify(title);
    if slug.is_empty() {
        slug = slugify(&stem_of(source_path));
    }
    if slug.is_empty() {
        slug = UNTITLED.to_string();
    }

    match extension_of(source_path) {
        Some(ext) => format!("{date}_{slug}.{ext}"),
        None => format!("{date}_{slug}"),
    }
}

/// Entry id for a normalized filename: the name without its extension,
/// with runs of non-word characters collapsed to `-`.
pub fn entry_id(filename: &str) -> String {
    let base = match filename.rfind('.') {
        Some(pos) if pos > 0 => &filename[..pos],
        _ => filename,
    };
    non_word_re().replace_all(base, "-").into_owned()
}

/// Slug part of a normalized filename: date prefix and extension removed.
///
/// Returns `None` when the name does not carry a `YYYY-MM-DD_` prefix.
pub fn dated_slug(filename: &str) -> Option<&str> {
    let m = dated_name_re().find(filename)?;
    let rest = &filename[m.end()..];
    let slug = match rest.rfind('.') {
        Some(pos) => &rest[..pos],
        None => rest,
    };
    (!slug.is_empty()).then_some(slug)
}
