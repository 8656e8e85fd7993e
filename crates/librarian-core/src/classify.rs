//! Path-pattern category classifier.
//!
//! An ordered table of `(category, patterns)` rules. The lower-cased source
//! path is tested against each rule in order; the first rule with a pattern
//! that occurs as a substring wins. Paths matching nothing get the fallback
//! category, so the result is always a member of the closed set.

use std::path::Path;

use anyhow::{bail, Result};
use serde::Deserialize;

/// One row of the classification table.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CategoryRule {
    pub name: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl CategoryRule {
    pub fn new<I, S>(name: impl Into<String>, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            patterns: patterns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Fallback category of the default taxonomy.
pub const DEFAULT_FALLBACK: &str = "technical";

/// The operational taxonomy used when nothing is configured.
pub fn default_rules() -> Vec<CategoryRule> {
    vec![
        CategoryRule::new("technical", ["dev", "DEVELOPMENT", "REFERENCE", "FEATURES"]),
        CategoryRule::new(
            "ops",
            ["ops", "OPERATIONS", "1-22-26", "01-27-2026", "1-20-26"],
        ),
        CategoryRule::new("recovery", ["records", "ocr", "ARCHIVE"]),
    ]
}

/// Whether `name` can be used as a category directory under the library root.
pub fn is_valid_category_name(name: &str) -> bool {
    !name.trim().is_empty()
        && name != "."
        && name != ".."
        && !name.contains(|c: char| c == '/' || c == '\\')
        && name.trim() == name
}

/// Validated, case-folded classification table.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<CategoryRule>,
    fallback: String,
}

impl Classifier {
    /// Build a classifier. Category names must be unique, usable as a
    /// single directory name, and the fallback must be one of them.
    pub fn new(rules: Vec<CategoryRule>, fallback: impl Into<String>) -> Result<Self> {
        let fallback = fallback.into();
        if rules.is_empty() {
            bail!("classifier needs at least one category");
        }

        let mut seen: Vec<&str> = Vec::new();
        for rule in &rules {
            if !is_valid_category_name(&rule.name) {
                bail!("invalid category name: '{}'", rule.name);
            }
            if seen.contains(&rule.name.as_str()) {
                bail!("duplicate category: '{}'", rule.name);
            }
            seen.push(&rule.name);
        }
        if !seen.contains(&fallback.as_str()) {
            bail!(
                "fallback category '{}' is not one of: {}",
                fallback,
                seen.join(", ")
            );
        }

        let rules = rules
            .into_iter()
            .map(|rule| CategoryRule {
                name: rule.name,
                patterns: rule
                    .patterns
                    .into_iter()
                    .map(|p| p.to_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect(),
            })
            .collect();

        Ok(Self { rules, fallback })
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    /// Category names in table order.
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.name.as_str())
    }

    pub fn contains(&self, category: &str) -> bool {
        self.rules.iter().any(|r| r.name == category)
    }

    /// Category for `path`; first matching rule wins.
    pub fn classify(&self, path: &Path) -> &str {
        let lower = path.to_string_lossy().to_lowercase();
        self.rules
            .iter()
            .find(|rule| rule.patterns.iter().any(|p| lower.contains(p.as_str())))
            .map(|rule| rule.name.as_str())
            .unwrap_or(&self.fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn taxonomy() -> Classifier {
        Classifier::new(default_rules(), DEFAULT_FALLBACK).unwrap()
    }

    #[test]
    fn test_routes_known_patterns() {
        let c = taxonomy();
        assert_eq!(c.classify(&PathBuf::from("/srv/docs/ops/notes.md")), "ops");
        assert_eq!(c.classify(&PathBuf::from("/srv/docs/records/a.md")), "recovery");
        assert_eq!(c.classify(&PathBuf::from("/srv/docs/dev/a.md")), "technical");
    }

    #[test]
    fn test_case_insensitive() {
        let c = taxonomy();
        assert_eq!(c.classify(&PathBuf::from("/srv/OPERATIONS/a.md")), "ops");
        assert_eq!(c.classify(&PathBuf::from("/srv/Archive/a.md")), "recovery");
    }

    #[test]
    fn test_first_rule_wins() {
        let c = taxonomy();
        // "dev" (technical) is listed before "ops".
        assert_eq!(c.classify(&PathBuf::from("/srv/dev/ops/a.md")), "technical");
    }

    #[test]
    fn test_fallback_when_unmatched() {
        let c = Classifier::new(
            vec![
                CategoryRule::new("alpha", ["aaa"]),
                CategoryRule::new("beta", ["bbb"]),
            ],
            "beta",
        )
        .unwrap();
        assert_eq!(c.classify(&PathBuf::from("/x/y/z.md")), "beta");
        assert_eq!(c.classify(&PathBuf::from("/x/AAA/z.md")), "alpha");
    }

    #[test]
    fn test_rejects_unknown_fallback() {
        let err = Classifier::new(vec![CategoryRule::new("alpha", ["a"])], "zeta");
        assert!(err.is_err());
    }

    #[test]
    fn test_rejects_duplicate_and_invalid_names() {
        let dup = Classifier::new(
            vec![CategoryRule::new("a", ["x"]), CategoryRule::new("a", ["y"])],
            "a",
        );
        assert!(dup.is_err());
        let bad = Classifier::new(vec![CategoryRule::new("../up", ["x"])], "../up");
        assert!(bad.is_err());
    }

    #[test]
    fn test_categories_in_order() {
        let c = taxonomy();
        let names: Vec<&str> = c.categories().collect();
        assert_eq!(names, vec!["technical", "ops", "recovery"]);
        assert!(c.contains("ops"));
        assert!(!c.contains("daily_tasks"));
    }
}
