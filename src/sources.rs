//! Configured source roots: path filtering, source resolution, and the
//! `sources` command.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use librarian_core::normalize::extension_of;
use std::path::{Path, PathBuf};

use crate::config::{Config, SourceConfig, BUILTIN_EXCLUDES};

/// A source root with its compiled filters.
#[derive(Debug, Clone)]
pub struct Source {
    pub name: String,
    pub root: PathBuf,
    pub recursive: bool,
    pub category: Option<String>,
    extension: String,
    excludes: GlobSet,
}

impl Source {
    pub fn new(config: &SourceConfig, extension: &str, extra_excludes: &[String]) -> Result<Self> {
        let mut patterns: Vec<String> = BUILTIN_EXCLUDES.iter().map(|s| s.to_string()).collect();
        patterns.extend(extra_excludes.iter().cloned());
        patterns.extend(config.exclude_globs.iter().cloned());
        let excludes = build_globset(&patterns)
            .with_context(|| format!("invalid exclude glob for source '{}'", config.name))?;

        Ok(Self {
            name: config.name.clone(),
            root: resolve_root(&config.path)?,
            recursive: config.recursive,
            category: config.category.clone(),
            extension: extension.to_string(),
            excludes,
        })
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }

    /// Whether `path` is a document this source emits: the configured
    /// extension, under the root (top level only when not recursive), and
    /// not excluded.
    pub fn accepts(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };
        if relative.as_os_str().is_empty() {
            return false;
        }
        if !self.recursive && relative.components().count() != 1 {
            return false;
        }
        if extension_of(path).as_deref() != Some(self.extension.as_str()) {
            return false;
        }
        !self.excludes.is_match(relative)
    }
}

/// All configured sources.
#[derive(Debug, Clone, Default)]
pub struct SourceSet {
    sources: Vec<Source>,
    ignored: Vec<PathBuf>,
}

impl SourceSet {
    pub fn from_config(config: &Config) -> Result<Self> {
        let extension = config.watch.normalized_extension();
        let sources = config
            .sources
            .iter()
            .map(|s| Source::new(s, &extension, &config.watch.exclude_globs))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            sources,
            ignored: Vec::new(),
        })
    }

    /// Never emit anything under `path`. Used for the library tree and the
    /// artifact directory when they sit inside a watched root.
    pub fn ignore(&mut self, path: &Path) -> Result<()> {
        let resolved = resolve_root(path)?;
        if !self.ignored.contains(&resolved) {
            self.ignored.push(resolved);
        }
        Ok(())
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.ignored.iter().any(|i| path.starts_with(i))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The most specific source whose root contains `path`.
    pub fn source_for(&self, path: &Path) -> Option<&Source> {
        self.sources
            .iter()
            .filter(|s| s.contains(path))
            .max_by_key(|s| s.root.components().count())
    }

    /// Whether the owning source accepts `path`.
    pub fn accepts(&self, path: &Path) -> bool {
        !self.is_ignored(path) && self.source_for(path).is_some_and(|s| s.accepts(path))
    }
}

/// Canonical root when it exists, so watcher paths and scanned paths agree.
fn resolve_root(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(p) => Ok(p),
        Err(_) => crate::fsutil::absolutize(path),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

pub fn list_sources(config: &Config) -> Result<()> {
    let sources = SourceSet::from_config(config)?;

    if sources.is_empty() {
        println!("No sources configured.");
        return Ok(());
    }

    println!(
        "{:<16} {:<10} {:<10} {:<12} PATH",
        "SOURCE", "STATUS", "RECURSIVE", "CATEGORY"
    );
    for source in sources.iter() {
        let status = if source.exists() { "OK" } else { "MISSING" };
        println!(
            "{:<16} {:<10} {:<10} {:<12} {}",
            source.name,
            status,
            source.recursive,
            source.category.as_deref().unwrap_or("-"),
            source.root.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(root: &Path, recursive: bool, excludes: &[&str]) -> Source {
        let config = SourceConfig {
            name: "docs".to_string(),
            path: root.to_path_buf(),
            recursive,
            exclude_globs: excludes.iter().map(|s| s.to_string()).collect(),
            category: None,
        };
        Source::new(&config, "md", &[]).unwrap()
    }

    #[test]
    fn test_accepts_extension_only() {
        let tmp = TempDir::new().unwrap();
        let s = source(tmp.path(), true, &[]);
        assert!(s.accepts(&s.root.join("notes.md")));
        assert!(s.accepts(&s.root.join("ops/NOTES.MD")));
        assert!(!s.accepts(&s.root.join("notes.txt")));
        assert!(!s.accepts(&s.root.join("README")));
    }

    #[test]
    fn test_builtin_excludes() {
        let tmp = TempDir::new().unwrap();
        let s = source(tmp.path(), true, &[]);
        assert!(!s.accepts(&s.root.join(".git/notes.md")));
        assert!(!s.accepts(&s.root.join("web/node_modules/pkg/readme.md")));
        assert!(!s.accepts(&s.root.join("notes.md.backup")));
    }

    #[test]
    fn test_configured_excludes() {
        let tmp = TempDir::new().unwrap();
        let s = source(tmp.path(), true, &["drafts/**"]);
        assert!(!s.accepts(&s.root.join("drafts/idea.md")));
        assert!(s.accepts(&s.root.join("final/idea.md")));
    }

    #[test]
    fn test_shallow_source_ignores_subdirs() {
        let tmp = TempDir::new().unwrap();
        let s = source(tmp.path(), false, &[]);
        assert!(s.accepts(&s.root.join("today.md")));
        assert!(!s.accepts(&s.root.join("archive/today.md")));
    }

    #[test]
    fn test_outside_root_rejected() {
        let tmp = TempDir::new().unwrap();
        let s = source(&tmp.path().join("docs"), true, &[]);
        assert!(!s.accepts(&tmp.path().join("other/notes.md")));
    }

    #[test]
    fn test_most_specific_source_wins() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("daily")).unwrap();
        let mut config = Config::default();
        config.sources.push(SourceConfig::from_root(tmp.path()));
        let mut daily = SourceConfig::from_root(&tmp.path().join("daily"));
        daily.category = Some("ops".to_string());
        config.sources.push(daily);

        let set = SourceSet::from_config(&config).unwrap();
        let root = set.iter().next().unwrap().root.clone();
        let hit = set.source_for(&root.join("daily/today.md")).unwrap();
        assert_eq!(hit.name, "daily");
        assert_eq!(hit.category.as_deref(), Some("ops"));
        assert!(set.source_for(Path::new("/elsewhere/a.md")).is_none());
    }

    #[test]
    fn test_ignored_library_inside_root() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir(tmp.path().join("library")).unwrap();
        let mut config = Config::default();
        config.sources.push(SourceConfig::from_root(tmp.path()));

        let mut set = SourceSet::from_config(&config).unwrap();
        set.ignore(&tmp.path().join("library")).unwrap();
        let root = set.iter().next().unwrap().root.clone();
        assert!(set.accepts(&root.join("notes.md")));
        assert!(!set.accepts(&root.join("library/ops/2026-01-27_notes.md")));
    }
}
