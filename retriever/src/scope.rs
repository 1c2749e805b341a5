use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{SearchError, SearchResult};
use crate::filters::{FileNameMatcher, ScopeFilter};
use crate::workspace::ProjectLayout;

const KEY_KIND: &str = "scope.kind";
const KEY_NAME: &str = "scope.name";
const KEY_PATHS: &str = "scope.paths";
const PATH_SEPARATOR: char = ';';

/// The set of root resources a search walks, plus the file eligibility rules
#[derive(Debug, Clone)]
pub struct Scope {
    roots: Vec<PathBuf>,
    filter: ScopeFilter,
    patterns: Vec<String>,
    case_sensitive: bool,
}

impl Scope {
    /// Builds a scope over `roots` accepting names matching `patterns`.
    pub fn new<S: AsRef<str>>(
        roots: Vec<PathBuf>,
        patterns: &[S],
        case_sensitive: bool,
        include_derived: bool,
    ) -> SearchResult<Self> {
        let matcher = FileNameMatcher::new(patterns, case_sensitive)?;
        Ok(Self {
            roots,
            filter: ScopeFilter::new(matcher, include_derived),
            patterns: patterns.iter().map(|p| p.as_ref().to_string()).collect(),
            case_sensitive,
        })
    }

    /// Scope containing just one file
    pub fn single_file(path: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![path.into()],
            filter: ScopeFilter::new(FileNameMatcher::any(), true),
            patterns: Vec::new(),
            case_sensitive: false,
        }
    }

    /// Replaces the derived directory names
    pub fn with_derived_dirs(mut self, dirs: Vec<String>) -> Self {
        self.filter = self.filter.with_derived_dirs(dirs);
        self
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn file_patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn includes_derived(&self) -> bool {
        self.filter.include_derived
    }

    /// Whether `path` lies under a root and passes the file filter.
    /// A root that is itself a file is always accepted. Derived status only looks at
    /// the directories below the root, never at where the root itself lives.
    pub fn contains(&self, path: &Path) -> bool {
        if self.roots.iter().any(|r| r == path) {
            return true;
        }
        self.roots
            .iter()
            .filter_map(|r| path.strip_prefix(r).ok())
            .any(|relative| self.filter.accepts(relative))
    }
}

/// Everything a scope description needs to resolve itself into roots
#[derive(Debug, Clone, Default)]
pub struct WorkbenchContext {
    pub workspace_root: PathBuf,
    pub current_file: Option<PathBuf>,
    pub working_sets: HashMap<String, Vec<PathBuf>>,
    pub projects: Option<ProjectLayout>,
}

/// A serializable description of where to search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScopeDescription {
    Workspace,
    CurrentProject,
    CurrentFile,
    WorkingSet { name: String },
    SelectedResources { paths: Vec<PathBuf> },
    SingleFile { path: PathBuf },
}

impl ScopeDescription {
    fn kind(&self) -> &'static str {
        match self {
            ScopeDescription::Workspace => "workspace",
            ScopeDescription::CurrentProject => "project",
            ScopeDescription::CurrentFile => "file",
            ScopeDescription::WorkingSet { .. } => "working_set",
            ScopeDescription::SelectedResources { .. } => "selection",
            ScopeDescription::SingleFile { .. } => "single_file",
        }
    }

    /// Resolves the description into root resources
    pub fn resolve(&self, ctx: &WorkbenchContext) -> SearchResult<Vec<PathBuf>> {
        let roots = match self {
            ScopeDescription::Workspace => vec![ctx.workspace_root.clone()],
            ScopeDescription::CurrentProject => {
                let file = ctx
                    .current_file
                    .as_ref()
                    .ok_or_else(|| SearchError::config_error("No current file to take a project from"))?;
                let layout = ctx
                    .projects
                    .clone()
                    .unwrap_or_else(|| ProjectLayout::new(&ctx.workspace_root));
                vec![layout.project_of_file(file)]
            }
            ScopeDescription::CurrentFile => vec![ctx
                .current_file
                .clone()
                .ok_or_else(|| SearchError::config_error("No current file"))?],
            ScopeDescription::WorkingSet { name } => ctx
                .working_sets
                .get(name)
                .cloned()
                .ok_or_else(|| SearchError::config_error(format!("Unknown working set '{}'", name)))?,
            ScopeDescription::SelectedResources { paths } => paths.clone(),
            ScopeDescription::SingleFile { path } => vec![path.clone()],
        };
        debug!("Scope {} resolved to {} roots", self.kind(), roots.len());
        Ok(roots)
    }

    /// Writes the description into a flat settings map
    pub fn to_settings(&self) -> BTreeMap<String, String> {
        let mut settings = BTreeMap::new();
        settings.insert(KEY_KIND.to_string(), self.kind().to_string());
        match self {
            ScopeDescription::WorkingSet { name } => {
                settings.insert(KEY_NAME.to_string(), name.clone());
            }
            ScopeDescription::SelectedResources { paths } => {
                let joined = paths
                    .iter()
                    .map(|p| p.to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(&PATH_SEPARATOR.to_string());
                settings.insert(KEY_PATHS.to_string(), joined);
            }
            ScopeDescription::SingleFile { path } => {
                settings.insert(KEY_PATHS.to_string(), path.to_string_lossy().into_owned());
            }
            _ => {}
        }
        settings
    }

    /// Reads a description back from a settings map
    pub fn from_settings(settings: &BTreeMap<String, String>) -> SearchResult<Self> {
        let kind = settings
            .get(KEY_KIND)
            .ok_or_else(|| SearchError::config_error(format!("Missing '{}'", KEY_KIND)))?;
        let paths = || -> Vec<PathBuf> {
            settings
                .get(KEY_PATHS)
                .map(|s| {
                    s.split(PATH_SEPARATOR)
                        .filter(|p| !p.is_empty())
                        .map(PathBuf::from)
                        .collect()
                })
                .unwrap_or_default()
        };

        match kind.as_str() {
            "workspace" => Ok(ScopeDescription::Workspace),
            "project" => Ok(ScopeDescription::CurrentProject),
            "file" => Ok(ScopeDescription::CurrentFile),
            "working_set" => settings
                .get(KEY_NAME)
                .map(|name| ScopeDescription::WorkingSet { name: name.clone() })
                .ok_or_else(|| SearchError::config_error("Working set scope without a name")),
            "selection" => Ok(ScopeDescription::SelectedResources { paths: paths() }),
            "single_file" => paths()
                .into_iter()
                .next()
                .map(|path| ScopeDescription::SingleFile { path })
                .ok_or_else(|| SearchError::config_error("Single file scope without a path")),
            other => Err(SearchError::config_error(format!(
                "Unknown scope kind '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_contains() {
        let scope = Scope::new(vec![PathBuf::from("/ws/app")], &["*.rs"], false, false).unwrap();
        assert!(scope.contains(Path::new("/ws/app/src/lib.rs")));
        assert!(!scope.contains(Path::new("/ws/app/src/lib.py")));
        assert!(!scope.contains(Path::new("/ws/other/lib.rs")));
        assert!(!scope.contains(Path::new("/ws/app/target/gen.rs")));

        let single = Scope::single_file("/ws/app/target/gen.bin");
        assert!(single.contains(Path::new("/ws/app/target/gen.bin")));
    }

    #[test]
    fn test_root_inside_derived_dir() {
        let scope = Scope::new(vec![PathBuf::from("/ws/build/proj")], &["*.rs"], false, false)
            .unwrap();
        assert!(scope.contains(Path::new("/ws/build/proj/src/lib.rs")));
        assert!(scope.contains(Path::new("/ws/build/proj/main.rs")));
        assert!(!scope.contains(Path::new("/ws/build/proj/out/gen.rs")));
    }

    #[test]
    fn test_settings_roundtrip_selection() {
        let desc = ScopeDescription::SelectedResources {
            paths: vec![PathBuf::from("/a/b"), PathBuf::from("/c")],
        };
        let settings = desc.to_settings();
        assert_eq!(settings.get("scope.kind").map(String::as_str), Some("selection"));
        assert_eq!(ScopeDescription::from_settings(&settings).unwrap(), desc);
    }

    #[test]
    fn test_settings_errors() {
        let mut settings = BTreeMap::new();
        assert!(ScopeDescription::from_settings(&settings).is_err());
        settings.insert("scope.kind".to_string(), "working_set".to_string());
        assert!(ScopeDescription::from_settings(&settings).is_err());
        settings.insert("scope.kind".to_string(), "galaxy".to_string());
        assert!(ScopeDescription::from_settings(&settings).is_err());
    }

    #[test]
    fn test_resolve_variants() {
        let mut ctx = WorkbenchContext {
            workspace_root: PathBuf::from("/ws"),
            current_file: Some(PathBuf::from("/ws/app/src/main.rs")),
            projects: Some(ProjectLayout::with_projects("/ws", vec![PathBuf::from("/ws/app")])),
            ..Default::default()
        };
        ctx.working_sets
            .insert("core".to_string(), vec![PathBuf::from("/ws/core")]);

        assert_eq!(
            ScopeDescription::Workspace.resolve(&ctx).unwrap(),
            vec![PathBuf::from("/ws")]
        );
        assert_eq!(
            ScopeDescription::CurrentProject.resolve(&ctx).unwrap(),
            vec![PathBuf::from("/ws/app")]
        );
        assert_eq!(
            ScopeDescription::CurrentFile.resolve(&ctx).unwrap(),
            vec![PathBuf::from("/ws/app/src/main.rs")]
        );
        assert_eq!(
            ScopeDescription::WorkingSet {
                name: "core".to_string()
            }
            .resolve(&ctx)
            .unwrap(),
            vec![PathBuf::from("/ws/core")]
        );
        assert!(ScopeDescription::WorkingSet {
            name: "missing".to_string()
        }
        .resolve(&ctx)
        .is_err());
    }
}
