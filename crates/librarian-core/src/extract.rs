//! Metadata extraction from plain-text documents.
//!
//! Derives the title (first top-level heading), the keyword set (matches
//! against a controlled vocabulary), and a bounded preview line. Purely
//! textual: empty files and files without a heading yield the fallback
//! title, no keywords, and an empty preview.

/// Controlled vocabulary used when none is configured.
pub const DEFAULT_VOCABULARY: &[&str] = &[
    "api",
    "backend",
    "frontend",
    "database",
    "fix",
    "implementation",
    "guide",
    "setup",
    "config",
    "error",
    "deployment",
    "integration",
    "ocr",
    "records",
    "admin",
    "auth",
    "security",
    "performance",
    "daily",
    "task",
    "summary",
    "status",
    "cleanup",
];

/// Default preview length, in characters.
pub const DEFAULT_PREVIEW_CHARS: usize = 200;

/// Marker appended to a truncated preview.
const ELLIPSIS: &str = "...";

/// Metadata derived from a document body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentMetadata {
    pub title: String,
    pub keywords: Vec<String>,
    pub preview: String,
}

/// Vocabulary and preview bound for [`extract`](Extractor::extract).
#[derive(Debug, Clone)]
pub struct Extractor {
    vocabulary: Vec<String>,
    preview_chars: usize,
}

impl Extractor {
    /// Terms are lower-cased and deduplicated, keeping their first position.
    pub fn new<I, S>(vocabulary: I, preview_chars: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut terms: Vec<String> = Vec::new();
        for term in vocabulary {
            let term = term.as_ref().trim().to_lowercase();
            if !term.is_empty() && !terms.contains(&term) {
                terms.push(term);
            }
        }
        Self {
            vocabulary: terms,
            preview_chars,
        }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn extract(&self, content: &str, fallback_title: &str) -> DocumentMetadata {
        DocumentMetadata {
            title: extract_title(content, fallback_title),
            keywords: extract_keywords(content, &self.vocabulary),
            preview: extract_preview(content, self.preview_chars),
        }
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(DEFAULT_VOCABULARY.iter().copied(), DEFAULT_PREVIEW_CHARS)
    }
}

/// Text of the first `# ` heading line, else `fallback`.
///
/// Only top-level headings count: `## Section` is skipped. A heading with
/// no text after the marker is ignored.
pub fn extract_title(content: &str, fallback: &str) -> String {
    for line in content.lines() {
        let Some(rest) = line.strip_prefix('#') else {
            continue;
        };
        if !rest.starts_with(char::is_whitespace) {
            continue;
        }
        let title = rest.trim();
        if !title.is_empty() {
            return title.to_string();
        }
    }
    fallback.to_string()
}

/// Vocabulary terms that occur anywhere in the lower-cased content, in
/// vocabulary order.
pub fn extract_keywords(content: &str, vocabulary: &[String]) -> Vec<String> {
    let lower = content.to_lowercase();
    vocabulary
        .iter()
        .filter(|term| lower.contains(term.as_str()))
        .cloned()
        .collect()
}

/// First non-empty line that is not a heading, cut to `max_chars`
/// characters with an ellipsis when cut.
pub fn extract_preview(content: &str, max_chars: usize) -> String {
    let Some(line) = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
    else {
        return String::new();
    };

    if line.chars().count() > max_chars {
        let mut preview: String = line.chars().take(max_chars).collect();
        preview.push_str(ELLIPSIS);
        preview
    } else {
        line.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_first_heading() {
        let content = "intro line\n# OCR Pipeline Failure Investigation\n# Second";
        assert_eq!(
            extract_title(content, "notes"),
            "OCR Pipeline Failure Investigation"
        );
    }

    #[test]
    fn test_title_skips_subheadings() {
        let content = "## Section\n#hashtag\n# Real Title  \n";
        assert_eq!(extract_title(content, "notes"), "Real Title");
    }

    #[test]
    fn test_title_handles_crlf() {
        assert_eq!(extract_title("# Windows Doc\r\nbody", "x"), "Windows Doc");
    }

    #[test]
    fn test_title_fallback() {
        assert_eq!(extract_title("no heading here", "notes"), "notes");
        assert_eq!(extract_title("", "notes"), "notes");
        assert_eq!(extract_title("#   \nbody", "notes"), "notes");
    }

    #[test]
    fn test_keywords_in_vocabulary_order() {
        let extractor = Extractor::default();
        let meta = extractor.extract("We hit an ERROR in the OCR stage.", "x");
        assert_eq!(meta.keywords, vec!["error", "ocr"]);
    }

    #[test]
    fn test_keywords_substring_match() {
        let vocab = vec!["api".to_string(), "fix".to_string()];
        assert_eq!(extract_keywords("Rapid prefix", &vocab), vec!["api", "fix"]);
    }

    #[test]
    fn test_vocabulary_normalized() {
        let extractor = Extractor::new(["OCR", " ocr ", "", "Auth"], 10);
        assert_eq!(extractor.vocabulary(), &["ocr", "auth"]);
    }

    #[test]
    fn test_preview_skips_headings_and_blanks() {
        let content = "# Title\n\n## Sub\n   \n  First real line.  \nSecond";
        assert_eq!(extract_preview(content, 200), "First real line.");
    }

    #[test]
    fn test_preview_truncated_with_ellipsis() {
        let line = "a".repeat(250);
        let preview = extract_preview(&line, 200);
        assert_eq!(preview.len(), 203);
        assert!(preview.ends_with("..."));
    }

    #[test]
    fn test_preview_exact_length_not_truncated() {
        let line = "é".repeat(200);
        assert_eq!(extract_preview(&line, 200), line);
    }

    #[test]
    fn test_empty_content() {
        let meta = Extractor::default().extract("", "empty");
        assert_eq!(meta.title, "empty");
        assert!(meta.keywords.is_empty());
        assert!(meta.preview.is_empty());
    }
}
