use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::unify_path;

const MAX_UPWARD_STEPS: usize = 20;

/// File names whose presence marks a directory as a project root
pub const DEFAULT_PROJECT_MARKERS: &[&str] = &[
    ".project",
    "Cargo.toml",
    "package.json",
    "pom.xml",
    "go.mod",
    ".git",
];

/// Describes how files of a workspace group into projects.
///
/// A project is the nearest ancestor directory (inclusive) carrying one of the
/// markers, never above the workspace root. Directories inside the workspace with no
/// marked ancestor belong to the workspace root itself; anything outside the
/// workspace is its own project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectLayout {
    /// The root under which projects are discovered
    pub workspace_root: PathBuf,
    /// Marker file names
    #[serde(default = "default_markers")]
    pub markers: Vec<String>,
    /// Explicit project roots, used instead of marker detection when non-empty
    #[serde(default)]
    pub projects: Vec<PathBuf>,
}

fn default_markers() -> Vec<String> {
    DEFAULT_PROJECT_MARKERS.iter().map(|m| m.to_string()).collect()
}

impl ProjectLayout {
    /// Layout detecting projects by marker files below `workspace_root`
    pub fn new(workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            markers: default_markers(),
            projects: Vec::new(),
        }
    }

    /// Layout with an explicit list of project roots
    pub fn with_projects(workspace_root: impl Into<PathBuf>, projects: Vec<PathBuf>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            markers: Vec::new(),
            projects,
        }
    }

    /// Returns the project directory owning `dir` (a directory path).
    pub fn project_of_dir(&self, dir: &Path) -> PathBuf {
        if !self.projects.is_empty() {
            return self
                .projects
                .iter()
                .filter(|p| dir.starts_with(p))
                .max_by_key(|p| p.components().count())
                .cloned()
                .unwrap_or_else(|| self.fallback_project(dir));
        }

        let mut current = dir.to_path_buf();
        for _ in 0..MAX_UPWARD_STEPS {
            if self.markers.iter().any(|m| current.join(m).exists()) {
                return current;
            }
            if current == self.workspace_root || !current.pop() {
                break;
            }
        }
        self.fallback_project(dir)
    }

    /// Returns the project owning the file at `path`.
    pub fn project_of_file(&self, path: &Path) -> PathBuf {
        match path.parent() {
            Some(parent) => self.project_of_dir(parent),
            None => self.workspace_root.clone(),
        }
    }

    fn fallback_project(&self, dir: &Path) -> PathBuf {
        if dir.starts_with(&self.workspace_root) {
            self.workspace_root.clone()
        } else {
            dir.to_path_buf()
        }
    }
}

/// Detect the project root enclosing `starting_dir` by walking upward.
/// If no marker is found, returns the starting directory.
pub fn detect_project_root(starting_dir: &Path) -> PathBuf {
    let mut current = unify_path(starting_dir);

    for _ in 0..MAX_UPWARD_STEPS {
        if DEFAULT_PROJECT_MARKERS
            .iter()
            .any(|marker| current.join(marker).exists())
        {
            return current;
        }
        if !current.pop() {
            break;
        }
    }

    unify_path(starting_dir)
}
