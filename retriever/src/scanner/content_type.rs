use std::collections::HashMap;
use std::path::Path;

/// A named file type with an optional more general base type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    pub id: String,
    pub base: Option<String>,
    pub extensions: Vec<String>,
    pub file_names: Vec<String>,
}

/// Resolves files to content types.
///
/// Exact file names win over extensions; both are compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct ContentTypeRegistry {
    types: HashMap<String, ContentType>,
    by_extension: HashMap<String, String>,
    by_file_name: HashMap<String, String>,
}

// (id, base, extensions, file names)
const BUILTIN_TYPES: &[(&str, Option<&str>, &[&str], &[&str])] = &[
    ("text", None, &["txt", "text", "log", "md"], &[]),
    ("c-source", Some("text"), &["c", "h"], &[]),
    (
        "cpp-source",
        Some("c-source"),
        &["cpp", "cc", "cxx", "hpp", "hh", "hxx", "inl"],
        &[],
    ),
    ("java-source", Some("text"), &["java"], &[]),
    ("csharp-source", Some("text"), &["cs"], &[]),
    ("go-source", Some("text"), &["go"], &[]),
    ("kotlin-source", Some("text"), &["kt", "kts"], &[]),
    ("rust-source", Some("text"), &["rs"], &[]),
    ("javascript", Some("text"), &["js", "mjs", "cjs", "jsx"], &[]),
    ("typescript", Some("javascript"), &["ts", "tsx", "mts"], &[]),
    ("python-source", Some("text"), &["py", "pyw", "pyi"], &[]),
    (
        "shell-script",
        Some("text"),
        &["sh", "bash", "zsh"],
        &[".bashrc", ".profile", ".zshrc"],
    ),
    (
        "ruby-source",
        Some("text"),
        &["rb", "rake"],
        &["rakefile", "gemfile"],
    ),
    ("perl-source", Some("text"), &["pl", "pm"], &[]),
    ("makefile", Some("text"), &["mk"], &["makefile", "gnumakefile"]),
    ("yaml", Some("text"), &["yml", "yaml"], &[]),
    ("toml", Some("text"), &["toml"], &[]),
    ("properties", Some("text"), &["properties", "ini", "cfg", "conf"], &[]),
    ("xml", Some("text"), &["xml", "xsd", "xsl", "xslt", "svg", "pom"], &[]),
    ("html", Some("xml"), &["html", "htm", "xhtml"], &[]),
];

impl ContentTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the common source and markup types
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for (id, base, extensions, file_names) in BUILTIN_TYPES {
            registry.register(ContentType {
                id: id.to_string(),
                base: base.map(str::to_string),
                extensions: extensions.iter().map(|e| e.to_string()).collect(),
                file_names: file_names.iter().map(|n| n.to_string()).collect(),
            });
        }
        registry
    }

    pub fn register(&mut self, content_type: ContentType) {
        for ext in &content_type.extensions {
            self.by_extension
                .insert(ext.to_lowercase(), content_type.id.clone());
        }
        for name in &content_type.file_names {
            self.by_file_name
                .insert(name.to_lowercase(), content_type.id.clone());
        }
        self.types.insert(content_type.id.clone(), content_type);
    }

    pub fn get(&self, id: &str) -> Option<&ContentType> {
        self.types.get(id)
    }

    /// Content type of the file at `path`, if any is known
    pub fn content_type_for(&self, path: &Path) -> Option<&ContentType> {
        let name = path.file_name()?.to_str()?.to_lowercase();
        if let Some(id) = self.by_file_name.get(&name) {
            return self.types.get(id);
        }
        let (_, ext) = name.rsplit_once('.')?;
        self.by_extension.get(ext).and_then(|id| self.types.get(id))
    }

    /// `id` followed by its base types, most specific first
    pub fn base_chain(&self, id: &str) -> Vec<String> {
        let mut chain = Vec::new();
        let mut current = Some(id.to_string());
        while let Some(type_id) = current {
            // a misconfigured base cycle must not loop forever
            if chain.contains(&type_id) {
                break;
            }
            current = self.types.get(&type_id).and_then(|t| t.base.clone());
            chain.push(type_id);
        }
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_by_name_and_extension() {
        let registry = ContentTypeRegistry::with_builtin();
        let id = |p: &str| {
            registry
                .content_type_for(Path::new(p))
                .map(|t| t.id.clone())
        };
        assert_eq!(id("src/main.CPP").as_deref(), Some("cpp-source"));
        assert_eq!(id("Makefile").as_deref(), Some("makefile"));
        assert_eq!(id("index.html").as_deref(), Some("html"));
        assert_eq!(id("archive.unknown"), None);
        assert_eq!(id("README"), None);
    }

    #[test]
    fn test_base_chain() {
        let registry = ContentTypeRegistry::with_builtin();
        assert_eq!(
            registry.base_chain("cpp-source"),
            vec!["cpp-source", "c-source", "text"]
        );
        assert_eq!(
            registry.base_chain("typescript"),
            vec!["typescript", "javascript", "text"]
        );
        assert_eq!(registry.base_chain("unregistered"), vec!["unregistered"]);
    }
}
