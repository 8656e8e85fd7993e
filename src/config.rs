use anyhow::{bail, Context, Result};
use librarian_core::classify::{default_rules, CategoryRule, Classifier, DEFAULT_FALLBACK};
use librarian_core::extract::{Extractor, DEFAULT_PREVIEW_CHARS, DEFAULT_VOCABULARY};
use librarian_core::relate::SimilarityRule;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Paths that are never emitted by the event source, whatever the config says.
pub const BUILTIN_EXCLUDES: &[&str] = &[
    "**/.git/**",
    "**/node_modules/**",
    "**/*.backup",
    "**/*~",
];

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub relations: RelationsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LibraryConfig {
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
    #[serde(default = "default_index_file")]
    pub index_file: PathBuf,
    #[serde(default = "default_ledger_file")]
    pub ledger_file: PathBuf,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
            index_file: default_index_file(),
            ledger_file: default_ledger_file(),
        }
    }
}

fn default_library_root() -> PathBuf {
    PathBuf::from("./library")
}
fn default_index_file() -> PathBuf {
    PathBuf::from("./.analysis/library-index.json")
}
fn default_ledger_file() -> PathBuf {
    PathBuf::from("./.analysis/library-processed.json")
}

#[derive(Debug, Deserialize, Clone)]
pub struct WatchConfig {
    #[serde(default = "default_extension")]
    pub extension: String,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            debounce_ms: default_debounce_ms(),
            exclude_globs: Vec::new(),
        }
    }
}

fn default_extension() -> String {
    "md".to_string()
}
fn default_debounce_ms() -> u64 {
    2000
}

impl WatchConfig {
    /// Configured extension without a leading dot, lower-cased.
    pub fn normalized_extension(&self) -> String {
        self.extension.trim().trim_start_matches('.').to_lowercase()
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// A watched root directory.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    pub path: PathBuf,
    /// `false` scans and watches only the top level of `path`.
    #[serde(default = "default_true")]
    pub recursive: bool,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Routes every file of this source to one category.
    #[serde(default)]
    pub category: Option<String>,
}

fn default_true() -> bool {
    true
}

impl SourceConfig {
    /// Source for a bare directory given on the command line.
    pub fn from_root(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            path: path.to_path_buf(),
            recursive: true,
            exclude_globs: Vec::new(),
            category: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClassifierConfig {
    #[serde(default = "default_fallback")]
    pub fallback: String,
    #[serde(default = "default_rules")]
    pub categories: Vec<CategoryRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            fallback: default_fallback(),
            categories: default_rules(),
        }
    }
}

fn default_fallback() -> String {
    DEFAULT_FALLBACK.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_vocabulary")]
    pub vocabulary: Vec<String>,
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            vocabulary: default_vocabulary(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_vocabulary() -> Vec<String> {
    DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect()
}
fn default_preview_chars() -> usize {
    DEFAULT_PREVIEW_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelationsConfig {
    #[serde(default = "default_min_shared_words")]
    pub min_shared_words: usize,
    #[serde(default = "default_min_word_len")]
    pub min_word_len: usize,
    /// Also link previously indexed entries back to the new one.
    #[serde(default = "default_true")]
    pub symmetric: bool,
}

impl Default for RelationsConfig {
    fn default() -> Self {
        Self {
            min_shared_words: default_min_shared_words(),
            min_word_len: default_min_word_len(),
            symmetric: true,
        }
    }
}

fn default_min_shared_words() -> usize {
    2
}
fn default_min_word_len() -> usize {
    4
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_status_interval_secs")]
    pub status_interval_secs: u64,
    /// Bound on the read and copy stages of a single file.
    #[serde(default)]
    pub file_timeout_secs: Option<u64>,
    /// Periodic forced rescan of every source.
    #[serde(default)]
    pub reindex_interval_secs: Option<u64>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            status_interval_secs: default_status_interval_secs(),
            file_timeout_secs: None,
            reindex_interval_secs: None,
        }
    }
}

fn default_status_interval_secs() -> u64 {
    60
}

/// Startup overrides from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub roots: Vec<PathBuf>,
    pub library: Option<PathBuf>,
    pub index_file: Option<PathBuf>,
    pub ledger_file: Option<PathBuf>,
}

impl Config {
    pub fn classifier(&self) -> Result<Classifier> {
        Classifier::new(
            self.classifier.categories.clone(),
            self.classifier.fallback.clone(),
        )
    }

    pub fn extractor(&self) -> Extractor {
        Extractor::new(&self.extract.vocabulary, self.extract.preview_chars)
    }

    pub fn similarity_rule(&self) -> SimilarityRule {
        SimilarityRule {
            min_shared_words: self.relations.min_shared_words,
            min_word_len: self.relations.min_word_len,
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        for root in &overrides.roots {
            self.sources.push(SourceConfig::from_root(root));
        }
        if let Some(library) = &overrides.library {
            self.library.root = library.clone();
        }
        if let Some(index_file) = &overrides.index_file {
            self.library.index_file = index_file.clone();
        }
        if let Some(ledger_file) = &overrides.ledger_file {
            self.library.ledger_file = ledger_file.clone();
        }
    }

    /// Commands that watch or scan need at least one source.
    pub fn require_sources(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("no sources configured; add a [[sources]] table or pass --root");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let ext = self.watch.normalized_extension();
        if ext.is_empty() || ext.contains(|c: char| c == '/' || c == '\\' || c == '.') {
            bail!("watch.extension must be a bare extension such as \"md\"");
        }
        if self.watch.debounce_ms == 0 {
            bail!("watch.debounce_ms must be > 0");
        }

        let classifier = self
            .classifier()
            .context("invalid [classifier] configuration")?;

        let mut names: Vec<&str> = Vec::new();
        for source in &self.sources {
            if source.name.trim().is_empty() {
                bail!("source for {} has an empty name", source.path.display());
            }
            if names.contains(&source.name.as_str()) {
                bail!("duplicate source name: '{}'", source.name);
            }
            names.push(&source.name);
            if let Some(category) = &source.category {
                if !classifier.contains(category) {
                    bail!(
                        "source '{}' pins unknown category '{}'",
                        source.name,
                        category
                    );
                }
            }
        }

        if self.extract.preview_chars == 0 {
            bail!("extract.preview_chars must be > 0");
        }
        if self.relations.min_shared_words == 0 {
            bail!("relations.min_shared_words must be >= 1");
        }
        if self.agent.status_interval_secs == 0 {
            bail!("agent.status_interval_secs must be > 0");
        }
        if self.agent.file_timeout_secs == Some(0) {
            bail!("agent.file_timeout_secs must be > 0 when set");
        }
        if self.agent.reindex_interval_secs == Some(0) {
            bail!("agent.reindex_interval_secs must be > 0 when set");
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Load `path` if it exists; otherwise start from defaults when the command
/// line supplies at least one root. Overrides are applied and the result
/// validated either way.
pub fn load_with_overrides(path: &Path, overrides: &Overrides) -> Result<Config> {
    let mut config = if path.exists() || overrides.roots.is_empty() {
        load_config(path)?
    } else {
        Config::default()
    };
    config.apply_overrides(overrides);
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("librarian.toml");
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_defaults_from_empty_file() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "");
        let config = load_config(&path).unwrap();
        assert_eq!(config.watch.extension, "md");
        assert_eq!(config.watch.debounce_ms, 2000);
        assert_eq!(config.classifier.fallback, "technical");
        assert_eq!(config.classifier.categories.len(), 3);
        assert_eq!(config.extract.preview_chars, 200);
        assert!(config.relations.symmetric);
        assert_eq!(config.agent.status_interval_secs, 60);
    }

    #[test]
    fn test_full_config() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[library]
root = "/srv/library"
index_file = "/srv/state/index.json"
ledger_file = "/srv/state/ledger.json"

[watch]
extension = ".TXT"
debounce_ms = 500
exclude_globs = ["**/drafts/**"]

[[sources]]
name = "ops-notes"
path = "/srv/docs/ops"

[[sources]]
name = "daily"
path = "/srv/daily"
recursive = false
category = "daily_tasks"

[classifier]
fallback = "misc"

[[classifier.categories]]
name = "daily_tasks"
patterns = ["daily"]

[[classifier.categories]]
name = "misc"
patterns = []

[agent]
file_timeout_secs = 30
"#,
        );
        let config = load_config(&path).unwrap();
        assert_eq!(config.watch.normalized_extension(), "txt");
        assert_eq!(config.sources.len(), 2);
        assert!(config.sources[0].recursive);
        assert!(!config.sources[1].recursive);
        let classifier = config.classifier().unwrap();
        assert_eq!(classifier.fallback(), "misc");
        assert_eq!(config.agent.file_timeout_secs, Some(30));
    }

    #[test]
    fn test_rejects_unknown_source_category() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            r#"
[[sources]]
name = "daily"
path = "/srv/daily"
category = "nope"
"#,
        );
        let err = load_config(&path).unwrap_err();
        assert!(err.to_string().contains("unknown category"));
    }

    #[test]
    fn test_rejects_bad_fallback() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[classifier]\nfallback = \"zeta\"\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_zero_debounce() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(&tmp, "[watch]\ndebounce_ms = 0\n");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_rejects_duplicate_source_names() {
        let tmp = TempDir::new().unwrap();
        let path = write_config(
            &tmp,
            "[[sources]]\nname = \"a\"\npath = \"/x\"\n[[sources]]\nname = \"a\"\npath = \"/y\"\n",
        );
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_overrides_without_config_file() {
        let tmp = TempDir::new().unwrap();
        let overrides = Overrides {
            roots: vec![tmp.path().join("docs")],
            library: Some(tmp.path().join("lib")),
            index_file: None,
            ledger_file: Some(tmp.path().join("ledger.json")),
        };
        let config = load_with_overrides(&tmp.path().join("missing.toml"), &overrides).unwrap();
        assert_eq!(config.sources.len(), 1);
        assert_eq!(config.sources[0].name, "docs");
        assert_eq!(config.library.root, tmp.path().join("lib"));
        assert_eq!(config.library.ledger_file, tmp.path().join("ledger.json"));
        assert!(config.require_sources().is_ok());
    }

    #[test]
    fn test_missing_config_without_roots_is_error() {
        let tmp = TempDir::new().unwrap();
        let result = load_with_overrides(&tmp.path().join("missing.toml"), &Overrides::default());
        assert!(result.is_err());
    }
}
