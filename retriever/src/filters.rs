/// File eligibility rules for a search scope.
///
/// A file takes part in a search when its name is accepted by the [`FileNameMatcher`]
/// (an extension set united with wildcard patterns), it is not a known binary format,
/// and it is not derived (build output) unless derived files were asked for.
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;
use std::path::Path;

use crate::errors::{SearchError, SearchResult};

/// Directory names whose contents count as derived resources
pub const DEFAULT_DERIVED_DIRS: &[&str] = &["target", "node_modules", "build", "out"];

/// Matches file names against `*.ext` patterns and general wildcards
#[derive(Debug, Clone)]
pub struct FileNameMatcher {
    extensions: HashSet<String>,
    wildcards: Vec<Pattern>,
    case_sensitive: bool,
    match_all: bool,
}

impl FileNameMatcher {
    /// Compiles the given patterns. An empty list, or any `*` pattern, accepts every file.
    pub fn new<S: AsRef<str>>(patterns: &[S], case_sensitive: bool) -> SearchResult<Self> {
        let mut extensions = HashSet::new();
        let mut wildcards = Vec::new();
        let mut match_all = patterns.is_empty();

        for raw in patterns.iter().flat_map(|p| p.as_ref().split(',')) {
            let pattern = raw.trim();
            if pattern.is_empty() {
                continue;
            }
            if pattern == "*" || pattern == "*.*" {
                match_all = true;
                continue;
            }
            match pattern.strip_prefix("*.") {
                Some(ext) if !ext.contains(['*', '?', '[', '.']) => {
                    extensions.insert(if case_sensitive {
                        ext.to_string()
                    } else {
                        ext.to_lowercase()
                    });
                }
                _ => {
                    let compiled = Pattern::new(pattern).map_err(|e| {
                        SearchError::invalid_pattern(format!("{}: {}", pattern, e))
                    })?;
                    wildcards.push(compiled);
                }
            }
        }

        Ok(Self {
            extensions,
            wildcards,
            case_sensitive,
            match_all,
        })
    }

    /// Matcher accepting every file name
    pub fn any() -> Self {
        Self {
            extensions: HashSet::new(),
            wildcards: Vec::new(),
            case_sensitive: false,
            match_all: true,
        }
    }

    /// Checks a bare file name
    pub fn matches_name(&self, name: &str) -> bool {
        if self.match_all {
            return true;
        }
        if let Some((_, ext)) = name.rsplit_once('.') {
            let found = if self.case_sensitive {
                self.extensions.contains(ext)
            } else {
                self.extensions.contains(&ext.to_lowercase())
            };
            if found {
                return true;
            }
        }
        let options = MatchOptions {
            case_sensitive: self.case_sensitive,
            ..MatchOptions::new()
        };
        self.wildcards
            .iter()
            .any(|w| w.matches_with(name, options))
    }

    /// Checks the file name component of `path`
    pub fn matches(&self, path: &Path) -> bool {
        path.file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| self.matches_name(name))
    }
}

/// Decides which files under the scope roots are eligible
#[derive(Debug, Clone)]
pub struct ScopeFilter {
    pub matcher: FileNameMatcher,
    pub include_derived: bool,
    pub derived_dirs: Vec<String>,
}

impl ScopeFilter {
    pub fn new(matcher: FileNameMatcher, include_derived: bool) -> Self {
        Self {
            matcher,
            include_derived,
            derived_dirs: DEFAULT_DERIVED_DIRS.iter().map(|d| d.to_string()).collect(),
        }
    }

    pub fn with_derived_dirs(mut self, dirs: Vec<String>) -> Self {
        self.derived_dirs = dirs;
        self
    }

    /// A path is derived when any of its directories is a build output directory.
    /// Callers pass the path relative to the scope root.
    pub fn is_derived(&self, path: &Path) -> bool {
        let parent = match path.parent() {
            Some(p) => p,
            None => return false,
        };
        parent.components().any(|c| {
            c.as_os_str()
                .to_str()
                .is_some_and(|s| self.derived_dirs.iter().any(|d| d == s))
        })
    }

    /// Determines if a file should be included in the search
    pub fn accepts(&self, path: &Path) -> bool {
        !is_likely_binary(path)
            && self.matcher.matches(path)
            && (self.include_derived || !self.is_derived(path))
    }
}

/// Checks if a file is likely to be binary
pub fn is_likely_binary(path: &Path) -> bool {
    // Common binary file extensions
    const BINARY_EXTENSIONS: &[&str] = &[
        "exe", "dll", "so", "dylib", "bin", "obj", "o", "class", "jar", "war", "ear", "png", "jpg",
        "jpeg", "gif", "bmp", "ico", "pdf", "doc", "docx", "xls", "xlsx", "zip", "tar", "gz", "7z",
        "rar",
    ];

    if let Some(ext) = path.extension() {
        if let Some(ext_str) = ext.to_str() {
            return BINARY_EXTENSIONS
                .iter()
                .any(|&bin_ext| bin_ext.eq_ignore_ascii_case(ext_str));
        }
    }
    false
}
