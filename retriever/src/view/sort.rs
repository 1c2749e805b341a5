use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Order of files in the view, in scan reports and in replace batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// By file name, then by parent path
    #[default]
    Flat,
    /// By path segment, ancestors first
    Hierarchical,
}

fn collate(a: &OsStr, b: &OsStr) -> Ordering {
    let (a, b) = (a.to_string_lossy(), b.to_string_lossy());
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(&b))
}

fn compare_segments(a: &Path, b: &Path) -> Ordering {
    let mut left = a.components().filter(|c| !matches!(c, Component::CurDir));
    let mut right = b.components().filter(|c| !matches!(c, Component::CurDir));
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match collate(l.as_os_str(), r.as_os_str()) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

impl SortOrder {
    pub fn is_hierarchical(self) -> bool {
        self == SortOrder::Hierarchical
    }

    pub fn compare_paths(self, a: &Path, b: &Path) -> Ordering {
        match self {
            SortOrder::Flat => {
                let name = |p: &Path| p.file_name().map(OsStr::to_os_string).unwrap_or_default();
                collate(&name(a), &name(b)).then_with(|| {
                    compare_segments(
                        a.parent().unwrap_or(Path::new("")),
                        b.parent().unwrap_or(Path::new("")),
                    )
                })
            }
            SortOrder::Hierarchical => compare_segments(a, b),
        }
    }

    pub fn sort_paths(self, paths: &mut [PathBuf]) {
        paths.sort_by(|a, b| self.compare_paths(a, b));
    }
}
