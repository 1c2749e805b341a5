use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

use super::content_type::ContentTypeRegistry;
use super::lexical::{LexicalScanner, MarkupScanner, Syntax};
use super::{LineScanner, LocationKind, Scanner};
use crate::errors::SearchResult;
use crate::metrics::ScanMetrics;

/// Builds a scanner instance on first use
pub type ScannerFactory = Box<dyn Fn() -> SearchResult<Arc<dyn Scanner>> + Send + Sync>;

/// Ordering score of a scanner by what it can classify
pub fn priority(capabilities: LocationKind) -> u32 {
    let mut score = 0;
    if capabilities.contains(LocationKind::COMMENT) {
        score += 3;
    }
    if capabilities.contains(LocationKind::STRING) {
        score += 3;
    }
    if capabilities.contains(LocationKind::IMPORT) {
        score += 2;
    }
    if capabilities.contains(LocationKind::PREPROCESSOR) {
        score += 1;
    }
    if capabilities.contains(LocationKind::FUNCTION) {
        score += 1;
    }
    score
}

/// Registration record of a scanner
pub struct ScannerDescriptor {
    pub id: String,
    /// Comma separated content type ids
    pub content_types: String,
    /// Comma separated extension ids, matched against file name suffixes
    pub extensions: String,
    pub capabilities: LocationKind,
    pub factory: ScannerFactory,
}

impl ScannerDescriptor {
    pub fn new(
        id: impl Into<String>,
        content_types: impl Into<String>,
        extensions: impl Into<String>,
        capabilities: LocationKind,
        factory: ScannerFactory,
    ) -> Self {
        Self {
            id: id.into(),
            content_types: content_types.into(),
            extensions: extensions.into(),
            capabilities,
            factory,
        }
    }
}

struct ScannerEntry {
    id: String,
    content_types: Vec<String>,
    extensions: Vec<String>,
    priority: u32,
    factory: ScannerFactory,
    instance: OnceCell<Arc<dyn Scanner>>,
    disabled: AtomicBool,
}

impl ScannerEntry {
    /// Returns the scanner, building it if needed. A failed build disables the entry for good.
    fn instantiate(&self) -> Option<Arc<dyn Scanner>> {
        if self.disabled.load(Ordering::Acquire) {
            return None;
        }
        if let Some(scanner) = self.instance.get() {
            return Some(scanner.clone());
        }

        let built = panic::catch_unwind(AssertUnwindSafe(|| (self.factory)()));
        let failure = match built {
            Ok(Ok(scanner)) => return Some(self.instance.get_or_init(|| scanner).clone()),
            Ok(Err(e)) => e.to_string(),
            Err(_) => "scanner factory panicked".to_string(),
        };
        warn!("Disabling scanner '{}': {}", self.id, failure);
        self.disabled.store(true, Ordering::Release);
        None
    }
}

fn split_ids(ids: &str) -> Vec<String> {
    ids.split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Chooses the scanner classifying a file.
///
/// Candidates are looked up by content type first, walking from the file's own type
/// towards its base types; the first type with any registered candidate decides, and
/// its candidates are tried in descending priority. The decision is memoized per type
/// id, including the decision that no scanner applies. Files without a scanner for
/// their content type are matched on ever shorter name suffixes (`a.tar.gz`, `tar.gz`,
/// `gz`). When both fail, the line-only scanner is used.
pub struct ScannerRegistry {
    content_types: ContentTypeRegistry,
    entries: Vec<ScannerEntry>,
    type_cache: DashMap<String, Option<usize>>,
    suffix_cache: DashMap<String, Option<usize>>,
    line_scanner: Arc<dyn Scanner>,
    metrics: ScanMetrics,
}

impl ScannerRegistry {
    /// Registry with no scanners registered
    pub fn new(content_types: ContentTypeRegistry) -> Self {
        Self {
            content_types,
            entries: Vec::new(),
            type_cache: DashMap::new(),
            suffix_cache: DashMap::new(),
            line_scanner: Arc::new(LineScanner),
            metrics: ScanMetrics::new(),
        }
    }

    /// Registry with the built-in content types and lexical scanners
    pub fn with_builtin() -> Self {
        let mut registry = Self::new(ContentTypeRegistry::with_builtin());
        let code = LocationKind::COMMENT | LocationKind::STRING | LocationKind::IMPORT;
        let builtin: [(&str, &str, &str, LocationKind, Syntax); 6] = [
            (
                "c-scanner",
                "c-source,cpp-source",
                "c,h,cpp,cc,cxx,hpp",
                code | LocationKind::PREPROCESSOR | LocationKind::FUNCTION,
                Syntax::C,
            ),
            (
                "java-scanner",
                "java-source,csharp-source,go-source,kotlin-source",
                "java,cs,go,kt",
                code | LocationKind::FUNCTION,
                Syntax::JAVA,
            ),
            (
                "rust-scanner",
                "rust-source",
                "rs",
                code | LocationKind::FUNCTION,
                Syntax::RUST,
            ),
            (
                "javascript-scanner",
                "javascript",
                "js,ts",
                code | LocationKind::FUNCTION,
                Syntax::JAVASCRIPT,
            ),
            (
                "script-scanner",
                "python-source,shell-script,ruby-source,perl-source",
                "py,sh,rb,pl",
                code | LocationKind::FUNCTION,
                Syntax::SCRIPT,
            ),
            (
                "config-scanner",
                "yaml,toml,properties,makefile",
                "yml,yaml,toml,ini",
                LocationKind::COMMENT | LocationKind::STRING,
                Syntax::CONFIG,
            ),
        ];
        for (id, types, extensions, capabilities, syntax) in builtin {
            registry.register(ScannerDescriptor::new(
                id,
                types,
                extensions,
                capabilities,
                Box::new(move || Ok(Arc::new(LexicalScanner::new(syntax)) as Arc<dyn Scanner>)),
            ));
        }
        registry.register(ScannerDescriptor::new(
            "markup-scanner",
            "xml",
            "xml,html",
            LocationKind::COMMENT | LocationKind::STRING | LocationKind::PREPROCESSOR,
            Box::new(|| Ok(Arc::new(MarkupScanner) as Arc<dyn Scanner>)),
        ));
        registry
    }

    /// Adds a scanner. Entries stay sorted by descending priority, ties in registration order.
    pub fn register(&mut self, descriptor: ScannerDescriptor) {
        let priority = priority(descriptor.capabilities);
        debug!(
            "Registering scanner '{}' with priority {}",
            descriptor.id, priority
        );
        self.entries.push(ScannerEntry {
            id: descriptor.id,
            content_types: split_ids(&descriptor.content_types),
            extensions: split_ids(&descriptor.extensions),
            priority,
            factory: descriptor.factory,
            instance: OnceCell::new(),
            disabled: AtomicBool::new(false),
        });
        self.entries.sort_by(|a, b| b.priority.cmp(&a.priority));
        self.type_cache.clear();
        self.suffix_cache.clear();
    }

    pub fn content_types(&self) -> &ContentTypeRegistry {
        &self.content_types
    }

    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    /// Id of the scanner `find_scanner` would pick, `None` for the line-only scanner
    pub fn scanner_id_for(&self, path: &Path) -> Option<&str> {
        self.resolve(path).map(|idx| self.entries[idx].id.as_str())
    }

    /// Returns the scanner for the file at `path`
    pub fn find_scanner(&self, path: &Path) -> Arc<dyn Scanner> {
        self.resolve(path)
            .and_then(|idx| self.entries[idx].instance.get().cloned())
            .unwrap_or_else(|| {
                trace!("Using line scanner for {}", path.display());
                self.line_scanner.clone()
            })
    }

    fn resolve(&self, path: &Path) -> Option<usize> {
        if let Some(content_type) = self.content_types.content_type_for(path) {
            let id = content_type.id.as_str();
            let cached = self.type_cache.get(id).map(|entry| *entry);
            self.metrics.record_scanner_lookup(cached.is_some());
            let resolved = match cached {
                Some(resolved) => resolved,
                None => {
                    let resolved = self.resolve_type(id);
                    self.type_cache.insert(id.to_string(), resolved);
                    resolved
                }
            };
            if resolved.is_some() {
                return resolved;
            }
        }

        let name = path.file_name()?.to_str()?.to_lowercase();
        self.resolve_suffix(&name)
    }

    fn resolve_type(&self, type_id: &str) -> Option<usize> {
        for candidate_type in self.content_types.base_chain(type_id) {
            let mut candidates = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.content_types.contains(&candidate_type))
                .peekable();
            if candidates.peek().is_none() {
                continue;
            }
            let found = candidates
                .find(|(_, e)| e.instantiate().is_some())
                .map(|(idx, _)| idx);
            debug!(
                "Content type '{}' resolved through '{}' to {:?}",
                type_id,
                candidate_type,
                found.map(|idx| &self.entries[idx].id)
            );
            return found;
        }
        None
    }

    fn resolve_suffix(&self, name: &str) -> Option<usize> {
        let mut suffix = name;
        loop {
            let cached = self.suffix_cache.get(suffix).map(|entry| *entry);
            let resolved = match cached {
                Some(resolved) => resolved,
                None => {
                    let resolved = self
                        .entries
                        .iter()
                        .enumerate()
                        .filter(|(_, e)| e.extensions.iter().any(|ext| ext == suffix))
                        .find(|(_, e)| e.instantiate().is_some())
                        .map(|(idx, _)| idx);
                    self.suffix_cache.insert(suffix.to_string(), resolved);
                    resolved
                }
            };
            if resolved.is_some() {
                return resolved;
            }
            match suffix.split_once('.') {
                Some((_, rest)) if !rest.is_empty() => suffix = rest,
                _ => return None,
            }
        }
    }
}

impl Default for ScannerRegistry {
    fn default() -> Self {
        Self::with_builtin()
    }
}
