use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::errors::{SearchError, SearchResult};
use crate::results::Filter;
use crate::scanner::LocationKind;
use crate::scope::Scope;
use crate::search::{FileSystemSearchEngine, PatternDefinition, SearchQuery};
use crate::view::SortOrder;

/// Extension of stored query files
pub const QUERY_EXTENSION: &str = "rquery";

/// How file contents that are not valid UTF-8 are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// The file is reported as a scan error
    #[default]
    FailFast,
    /// Invalid sequences are replaced with U+FFFD
    Lossy,
}

/// The secondary filter as it appears in configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Regular expression over line text
    pub pattern: Option<String>,
    /// Hide lines matching `pattern` instead of showing only them
    pub hide_matching: bool,
    /// Location kinds to show, e.g. `["string", "other"]`; empty shows all
    pub accepted_locations: Vec<String>,
}

/// Configuration of a search, a filter and an optional replacement.
///
/// Loaded in order of precedence from:
/// 1. a custom file given with `--config`
/// 2. a local `.retriever.yaml` in the current directory
/// 3. the global `$CONFIG_DIR/retriever/config.yaml`
///
/// ```yaml
/// pattern: "TODO|FIXME"
/// is_regex: true
/// roots: ["src"]
/// file_patterns: ["*.rs", "*.toml"]
/// layout: hierarchical
/// filter:
///   accepted_locations: ["comment"]
/// log_level: "info"
/// ```
///
/// Command line values take precedence, see `merge_with_cli`. The same format is used
/// for stored queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub pattern: String,
    pub is_regex: bool,
    pub case_sensitive: bool,
    pub whole_word: bool,

    /// Roots to search; the current directory when empty
    pub roots: Vec<PathBuf>,

    /// File name patterns, e.g. `*.rs`; all files when empty
    pub file_patterns: Vec<String>,
    pub file_patterns_case_sensitive: bool,

    /// Search build output directories too
    pub include_derived: bool,
    /// Names of build output directories; a built-in list when empty
    pub derived_dirs: Vec<String>,

    pub layout: SortOrder,
    pub filter: FilterConfig,

    /// Replacement text, with `$1`/`${name}` group references in regex mode
    pub replacement: Option<String>,

    #[serde(default = "default_thread_count")]
    pub thread_count: NonZeroUsize,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    pub encoding_mode: EncodingMode,
}

fn default_thread_count() -> NonZeroUsize {
    NonZeroUsize::new(num_cpus::get()).unwrap_or(NonZeroUsize::MIN)
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            pattern: String::new(),
            is_regex: false,
            case_sensitive: false,
            whole_word: false,
            roots: Vec::new(),
            file_patterns: Vec::new(),
            file_patterns_case_sensitive: false,
            include_derived: false,
            derived_dirs: Vec::new(),
            layout: SortOrder::default(),
            filter: FilterConfig::default(),
            replacement: None,
            thread_count: default_thread_count(),
            log_level: default_log_level(),
            encoding_mode: EncodingMode::default(),
        }
    }
}

impl SearchConfig {
    /// Loads configuration from the default locations
    pub fn load() -> SearchResult<Self> {
        Self::load_from(None)
    }

    /// Loads configuration from the default locations plus a custom file, which has to exist
    pub fn load_from(config_path: Option<&Path>) -> SearchResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("retriever").join("config.yaml")),
            Some(PathBuf::from(".retriever.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                debug!("Reading configuration from {}", path.display());
                builder = builder.add_source(File::from(path.as_path()));
            }
        }
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| SearchError::config_error(e.to_string()))
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: SearchConfig) -> Self {
        if !cli.pattern.is_empty() {
            self.pattern = cli.pattern;
        }
        self.is_regex |= cli.is_regex;
        self.case_sensitive |= cli.case_sensitive;
        self.whole_word |= cli.whole_word;
        if !cli.roots.is_empty() {
            self.roots = cli.roots;
        }
        if !cli.file_patterns.is_empty() {
            self.file_patterns = cli.file_patterns;
        }
        self.file_patterns_case_sensitive |= cli.file_patterns_case_sensitive;
        self.include_derived |= cli.include_derived;
        if !cli.derived_dirs.is_empty() {
            self.derived_dirs = cli.derived_dirs;
        }
        if cli.layout != SortOrder::default() {
            self.layout = cli.layout;
        }
        if cli.filter.pattern.is_some() {
            self.filter.pattern = cli.filter.pattern;
            self.filter.hide_matching = cli.filter.hide_matching;
        }
        if !cli.filter.accepted_locations.is_empty() {
            self.filter.accepted_locations = cli.filter.accepted_locations;
        }
        if cli.replacement.is_some() {
            self.replacement = cli.replacement;
        }
        // Always use CLI thread count
        self.thread_count = cli.thread_count;
        if cli.log_level != default_log_level() {
            self.log_level = cli.log_level;
        }
        if cli.encoding_mode != EncodingMode::default() {
            self.encoding_mode = cli.encoding_mode;
        }
        self
    }

    pub fn pattern_definition(&self) -> PatternDefinition {
        PatternDefinition {
            text: self.pattern.clone(),
            is_regex: self.is_regex,
            case_sensitive: self.case_sensitive,
            whole_word: self.whole_word,
        }
    }

    pub fn scope(&self) -> SearchResult<Scope> {
        let roots = if self.roots.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            self.roots.clone()
        };
        let mut scope = Scope::new(
            roots,
            &self.file_patterns,
            self.file_patterns_case_sensitive,
            self.include_derived,
        )?;
        if !self.derived_dirs.is_empty() {
            scope = scope.with_derived_dirs(self.derived_dirs.clone());
        }
        Ok(scope)
    }

    pub fn filter(&self) -> SearchResult<Filter> {
        let mut filter = Filter::new().hide_matching(self.filter.hide_matching);
        if let Some(pattern) = &self.filter.pattern {
            filter = filter.with_pattern(pattern, self.case_sensitive)?;
        }
        if !self.filter.accepted_locations.is_empty() {
            let mut accepted = LocationKind::empty();
            for name in &self.filter.accepted_locations {
                accepted |= LocationKind::from_location_name(name).ok_or_else(|| {
                    SearchError::config_error(format!("Unknown location kind '{}'", name))
                })?;
            }
            filter = filter.accepting(accepted);
        }
        Ok(filter)
    }

    /// Builds the query this configuration describes, not yet run
    pub fn query(&self) -> SearchResult<SearchQuery> {
        let engine = FileSystemSearchEngine::new(self.encoding_mode, self.thread_count);
        Ok(SearchQuery::new(self.pattern_definition(), self.scope()?)?
            .with_engine(Arc::new(engine))
            .with_sort_order(self.layout))
    }

    /// Writes this configuration as a stored query. The extension is appended when
    /// missing; the path written is returned.
    pub fn store_query(&self, path: &Path) -> SearchResult<PathBuf> {
        let path = if path.extension().is_some_and(|e| e == QUERY_EXTENSION) {
            path.to_path_buf()
        } else {
            let mut name = path.as_os_str().to_os_string();
            name.push(".");
            name.push(QUERY_EXTENSION);
            PathBuf::from(name)
        };
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(&path, yaml).map_err(|e| SearchError::from_io(&path, e))?;
        debug!("Stored query in {}", path.display());
        Ok(path)
    }

    pub fn load_query(path: &Path) -> SearchResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| SearchError::from_io(path, e))?;
        Ok(serde_yaml::from_str(&yaml)?)
    }
}
