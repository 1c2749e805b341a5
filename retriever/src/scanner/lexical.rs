use super::{FileAnalysis, LocationKind, Region, Scanner};

/// Identifiers that are followed by `(` without being function names
const NOT_FUNCTIONS: &[&str] = &[
    "if", "for", "while", "switch", "return", "catch", "sizeof", "match", "elif", "and", "or",
    "not", "in", "typeof", "await", "yield", "throw", "new", "delete", "defined",
];

/// Lexical conventions of one family of languages
#[derive(Debug, Clone, Copy)]
pub struct Syntax {
    pub name: &'static str,
    pub line_comments: &'static [&'static str],
    pub block_comments: &'static [(&'static str, &'static str)],
    /// Delimiters of strings that may span lines
    pub block_strings: &'static [(&'static str, &'static str)],
    pub string_quotes: &'static [u8],
    /// Quote of single character literals, only recognized around one (escaped) character
    pub char_quote: Option<u8>,
    pub escape: Option<u8>,
    /// Leading character of preprocessor lines
    pub directive_prefix: Option<u8>,
    /// Preprocessor directives that pull in other files
    pub include_directives: &'static [&'static str],
    /// Keywords that start an import line
    pub import_keywords: &'static [&'static str],
    pub detect_functions: bool,
}

impl Syntax {
    pub const C: Syntax = Syntax {
        name: "c",
        line_comments: &["//"],
        block_comments: &[("/*", "*/")],
        block_strings: &[],
        string_quotes: b"\"",
        char_quote: Some(b'\''),
        escape: Some(b'\\'),
        directive_prefix: Some(b'#'),
        include_directives: &["include", "include_next", "import"],
        import_keywords: &[],
        detect_functions: true,
    };

    /// Java, C#, Go and Kotlin
    pub const JAVA: Syntax = Syntax {
        name: "java",
        line_comments: &["//"],
        block_comments: &[("/*", "*/")],
        block_strings: &[("\"\"\"", "\"\"\"")],
        string_quotes: b"\"`",
        char_quote: Some(b'\''),
        escape: Some(b'\\'),
        directive_prefix: None,
        include_directives: &[],
        import_keywords: &["import", "package", "using"],
        detect_functions: true,
    };

    pub const RUST: Syntax = Syntax {
        name: "rust",
        line_comments: &["//"],
        block_comments: &[("/*", "*/")],
        block_strings: &[],
        string_quotes: b"\"",
        char_quote: Some(b'\''),
        escape: Some(b'\\'),
        directive_prefix: None,
        include_directives: &[],
        import_keywords: &["use", "pub use", "extern crate"],
        detect_functions: true,
    };

    /// JavaScript and TypeScript
    pub const JAVASCRIPT: Syntax = Syntax {
        name: "javascript",
        line_comments: &["//"],
        block_comments: &[("/*", "*/")],
        block_strings: &[],
        string_quotes: b"\"'`",
        char_quote: None,
        escape: Some(b'\\'),
        directive_prefix: None,
        include_directives: &[],
        import_keywords: &["import"],
        detect_functions: true,
    };

    /// Python, shell, Ruby and Perl
    pub const SCRIPT: Syntax = Syntax {
        name: "script",
        line_comments: &["#"],
        block_comments: &[],
        block_strings: &[("\"\"\"", "\"\"\""), ("'''", "'''")],
        string_quotes: b"\"'",
        char_quote: None,
        escape: Some(b'\\'),
        directive_prefix: None,
        include_directives: &[],
        import_keywords: &["import", "from", "require", "source"],
        detect_functions: true,
    };

    /// YAML, TOML, properties and makefiles
    pub const CONFIG: Syntax = Syntax {
        name: "config",
        line_comments: &["#"],
        block_comments: &[],
        block_strings: &[],
        string_quotes: b"\"'",
        char_quote: None,
        escape: Some(b'\\'),
        directive_prefix: None,
        include_directives: &[],
        import_keywords: &[],
        detect_functions: false,
    };
}

/// Table driven scanner for C-like and script languages
#[derive(Debug, Clone, Copy)]
pub struct LexicalScanner {
    syntax: Syntax,
}

impl LexicalScanner {
    pub fn new(syntax: Syntax) -> Self {
        Self { syntax }
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }
}

impl Scanner for LexicalScanner {
    fn analyze(&self, text: &str) -> FileAnalysis {
        let regions = Lexer {
            syntax: &self.syntax,
            text,
            bytes: text.as_bytes(),
            regions: Vec::new(),
        }
        .run();
        FileAnalysis::new(text, regions)
    }
}

struct Lexer<'a> {
    syntax: &'a Syntax,
    text: &'a str,
    bytes: &'a [u8],
    regions: Vec<Region>,
}

impl Lexer<'_> {
    fn run(mut self) -> Vec<Region> {
        let len = self.bytes.len();
        let mut i = 0;
        let mut line_start = true;

        while i < len {
            let b = self.bytes[i];
            if b == b'\n' || b == b'\r' {
                line_start = true;
                i += 1;
                continue;
            }
            if line_start {
                if b == b' ' || b == b'\t' {
                    i += 1;
                    continue;
                }
                line_start = false;
                if let Some(kind) = self.directive_at(i) {
                    let end = self.directive_end(i);
                    self.push(i, end, kind);
                    i = end;
                    continue;
                }
            }
            if let Some(end) = self.comment_at(i) {
                self.push(i, end, LocationKind::COMMENT);
                i = end;
                continue;
            }
            if let Some(end) = self.string_at(i) {
                self.push(i, end, LocationKind::STRING);
                i = end;
                continue;
            }
            if b.is_ascii_digit() {
                i = self.word_end(i);
                continue;
            }
            if b.is_ascii_alphabetic() || b == b'_' {
                let end = self.word_end(i);
                if self.syntax.detect_functions
                    && self.followed_by_paren(end)
                    && !NOT_FUNCTIONS.contains(&&self.text[i..end])
                {
                    self.push(i, end, LocationKind::FUNCTION);
                }
                i = end;
                continue;
            }
            i += 1;
        }
        self.regions
    }

    fn push(&mut self, start: usize, end: usize, kind: LocationKind) {
        if end > start {
            self.regions.push(Region { start, end, kind });
        }
    }

    fn starts_with(&self, i: usize, token: &str) -> bool {
        self.bytes[i..].starts_with(token.as_bytes())
    }

    fn find_from(&self, from: usize, token: &str) -> Option<usize> {
        self.text.get(from..)?.find(token).map(|p| from + p)
    }

    fn line_end(&self, i: usize) -> usize {
        self.bytes[i..]
            .iter()
            .position(|&b| b == b'\n' || b == b'\r')
            .map_or(self.bytes.len(), |p| i + p)
    }

    fn word_end(&self, i: usize) -> usize {
        self.bytes[i..]
            .iter()
            .position(|&b| !(b.is_ascii_alphanumeric() || b == b'_'))
            .map_or(self.bytes.len(), |p| i + p)
    }

    fn followed_by_paren(&self, end: usize) -> bool {
        self.bytes[end..]
            .iter()
            .find(|&&b| b != b' ' && b != b'\t')
            .is_some_and(|&b| b == b'(')
    }

    fn comment_open_at(&self, i: usize) -> bool {
        self.syntax.line_comments.iter().any(|o| self.starts_with(i, o))
            || self
                .syntax
                .block_comments
                .iter()
                .any(|(o, _)| self.starts_with(i, o))
    }

    fn comment_at(&self, i: usize) -> Option<usize> {
        if self.syntax.line_comments.iter().any(|o| self.starts_with(i, o)) {
            return Some(self.line_end(i));
        }
        self.syntax
            .block_comments
            .iter()
            .find(|(open, _)| self.starts_with(i, open))
            .map(|(open, close)| self.block_end(i + open.len(), close))
    }

    fn block_end(&self, from: usize, close: &str) -> usize {
        self.find_from(from, close)
            .map_or(self.bytes.len(), |p| p + close.len())
    }

    fn string_at(&self, i: usize) -> Option<usize> {
        if let Some((open, close)) = self
            .syntax
            .block_strings
            .iter()
            .find(|(open, _)| self.starts_with(i, open))
        {
            return Some(self.block_end(i + open.len(), close));
        }
        let b = self.bytes[i];
        if self.syntax.string_quotes.contains(&b) {
            return Some(self.quoted_end(i, b));
        }
        if self.syntax.char_quote == Some(b) {
            return self.char_literal_end(i);
        }
        None
    }

    /// End of a quoted string; unterminated strings stop at the line end
    fn quoted_end(&self, i: usize, quote: u8) -> usize {
        let len = self.bytes.len();
        let mut j = i + 1;
        while j < len {
            let c = self.bytes[j];
            if self.syntax.escape == Some(c) {
                j += 2;
                continue;
            }
            if c == quote {
                return j + 1;
            }
            if (c == b'\n' || c == b'\r') && quote != b'`' {
                return j;
            }
            j += 1;
        }
        len
    }

    /// `'x'` or `'\n'`; anything else (a lifetime, an apostrophe) is not a literal
    fn char_literal_end(&self, i: usize) -> Option<usize> {
        let rest = self.text.get(i + 1..)?;
        let mut chars = rest.char_indices();
        let (_, first) = chars.next()?;
        if first == '\n' || first == '\r' || first == '\'' {
            return None;
        }
        if self.syntax.escape.map(char::from) == Some(first) {
            let close = rest[1..].find(['\'', '\n'])?;
            return (rest.as_bytes()[1 + close] == b'\'' && close <= 10)
                .then_some(i + 1 + 1 + close + 1);
        }
        match chars.next() {
            Some((idx, '\'')) => Some(i + 1 + idx + 1),
            _ => None,
        }
    }

    fn directive_at(&self, i: usize) -> Option<LocationKind> {
        let rest = &self.text[i..];
        if let Some(prefix) = self.syntax.directive_prefix {
            if self.bytes[i] == prefix {
                let word = rest[1..].trim_start_matches([' ', '\t']);
                let name_len = word
                    .bytes()
                    .take_while(|b| b.is_ascii_alphanumeric() || *b == b'_')
                    .count();
                let name = &word[..name_len];
                return Some(if self.syntax.include_directives.contains(&name) {
                    LocationKind::IMPORT
                } else {
                    LocationKind::PREPROCESSOR
                });
            }
        }
        self.syntax
            .import_keywords
            .iter()
            .any(|kw| starts_with_keyword(rest, kw))
            .then_some(LocationKind::IMPORT)
    }

    /// Directive lines end at the line end, a comment, or never when continued with `\`
    fn directive_end(&self, i: usize) -> usize {
        let len = self.bytes.len();
        let mut j = i;
        let mut quote: Option<u8> = None;
        while j < len {
            let b = self.bytes[j];
            if let Some(q) = quote {
                if self.syntax.escape == Some(b) {
                    j += 2;
                    continue;
                }
                if b == b'\n' || b == b'\r' {
                    break;
                }
                if b == q {
                    quote = None;
                }
            } else {
                if b == b'\n' || b == b'\r' {
                    if j > i && self.bytes[j - 1] == b'\\' {
                        j += if b == b'\r' && self.bytes.get(j + 1) == Some(&b'\n') {
                            2
                        } else {
                            1
                        };
                        continue;
                    }
                    break;
                }
                if self.comment_open_at(j) {
                    break;
                }
                if self.syntax.string_quotes.contains(&b) {
                    quote = Some(b);
                }
            }
            j += 1;
        }
        j.min(len)
    }
}

fn starts_with_keyword(rest: &str, keyword: &str) -> bool {
    let Some(after) = rest.strip_prefix(keyword) else {
        return false;
    };
    match after.chars().next() {
        None | Some(';') => true,
        Some(' ') | Some('\t') => !after.trim_start().starts_with('('),
        _ => false,
    }
}

/// Scanner for XML and HTML: comments, quoted attribute values, processing instructions
#[derive(Debug, Default, Clone, Copy)]
pub struct MarkupScanner;

impl Scanner for MarkupScanner {
    fn analyze(&self, text: &str) -> FileAnalysis {
        let bytes = text.as_bytes();
        let len = bytes.len();
        let find_end = |from: usize, close: &str| {
            text.get(from..)
                .and_then(|rest| rest.find(close))
                .map_or(len, |p| from + p + close.len())
        };

        let mut regions = Vec::new();
        let mut in_tag = false;
        let mut i = 0;
        while i < len {
            if bytes[i..].starts_with(b"<!--") {
                let end = find_end(i + 4, "-->");
                regions.push(Region {
                    start: i,
                    end,
                    kind: LocationKind::COMMENT,
                });
                i = end;
                continue;
            }
            if bytes[i..].starts_with(b"<?") {
                let end = find_end(i + 2, "?>");
                regions.push(Region {
                    start: i,
                    end,
                    kind: LocationKind::PREPROCESSOR,
                });
                i = end;
                continue;
            }
            match bytes[i] {
                b'<' => in_tag = true,
                b'>' => in_tag = false,
                quote @ (b'"' | b'\'') if in_tag => {
                    let close = if quote == b'"' { "\"" } else { "'" };
                    let end = find_end(i + 1, close);
                    regions.push(Region {
                        start: i,
                        end,
                        kind: LocationKind::STRING,
                    });
                    i = end;
                    continue;
                }
                _ => {}
            }
            i += 1;
        }
        FileAnalysis::new(text, regions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind_of(text: &str, analysis: &FileAnalysis, needle: &str, nth: usize) -> LocationKind {
        let offset = text
            .match_indices(needle)
            .nth(nth)
            .map(|(o, _)| o)
            .unwrap();
        analysis.classify(offset)
    }

    #[test]
    fn test_c_locations() {
        let text = "#include \"foo.h\"\n\
                    #define FOO 1\n\
                    int foo(void) { /* foo */ return bar(\"foo\", 'f'); } // foo\n";
        let analysis = LexicalScanner::new(Syntax::C).analyze(text);

        assert_eq!(kind_of(text, &analysis, "foo", 0), LocationKind::IMPORT);
        assert_eq!(kind_of(text, &analysis, "FOO", 0), LocationKind::PREPROCESSOR);
        assert_eq!(kind_of(text, &analysis, "int", 0), LocationKind::OTHER);
        assert_eq!(kind_of(text, &analysis, "foo", 1), LocationKind::FUNCTION);
        assert_eq!(kind_of(text, &analysis, "foo", 2), LocationKind::COMMENT);
        assert_eq!(kind_of(text, &analysis, "bar", 0), LocationKind::FUNCTION);
        assert_eq!(kind_of(text, &analysis, "foo", 3), LocationKind::STRING);
        assert_eq!(kind_of(text, &analysis, "'f'", 0), LocationKind::STRING);
        assert_eq!(kind_of(text, &analysis, "foo", 4), LocationKind::COMMENT);
        assert_eq!(kind_of(text, &analysis, "return", 0), LocationKind::OTHER);
    }

    #[test]
    fn test_block_comment_spans_lines() {
        let text = "/* start\n   middle\n*/ code\n";
        let analysis = LexicalScanner::new(Syntax::C).analyze(text);
        assert_eq!(kind_of(text, &analysis, "middle", 0), LocationKind::COMMENT);
        assert_eq!(kind_of(text, &analysis, "code", 0), LocationKind::OTHER);
    }

    #[test]
    fn test_rust_lifetimes_are_not_strings() {
        let text = "use std::fmt;\nfn parse<'a>(input: &'a str) -> &'a str { input }\n";
        let analysis = LexicalScanner::new(Syntax::RUST).analyze(text);
        assert_eq!(kind_of(text, &analysis, "fmt", 0), LocationKind::IMPORT);
        assert_eq!(kind_of(text, &analysis, "parse", 0), LocationKind::OTHER);
        assert_eq!(kind_of(text, &analysis, "input", 0), LocationKind::OTHER);
        assert_eq!(kind_of(text, &analysis, "str", 0), LocationKind::OTHER);
    }

    #[test]
    fn test_script_locations() {
        let text = "from os import path\n\"\"\"doc\nstring\"\"\"\nvalue = call('x') # note\n";
        let analysis = LexicalScanner::new(Syntax::SCRIPT).analyze(text);
        assert_eq!(kind_of(text, &analysis, "path", 0), LocationKind::IMPORT);
        assert_eq!(kind_of(text, &analysis, "string", 0), LocationKind::STRING);
        assert_eq!(kind_of(text, &analysis, "call", 0), LocationKind::FUNCTION);
        assert_eq!(kind_of(text, &analysis, "x", 0), LocationKind::STRING);
        assert_eq!(kind_of(text, &analysis, "note", 0), LocationKind::COMMENT);
        assert_eq!(kind_of(text, &analysis, "value", 0), LocationKind::OTHER);
    }

    #[test]
    fn test_markup_locations() {
        let text = "<?xml version=\"1.0\"?>\n<!-- title -->\n<a href=\"title\">title</a>\n";
        let analysis = MarkupScanner.analyze(text);
        assert_eq!(kind_of(text, &analysis, "version", 0), LocationKind::PREPROCESSOR);
        assert_eq!(kind_of(text, &analysis, "title", 0), LocationKind::COMMENT);
        assert_eq!(kind_of(text, &analysis, "title", 1), LocationKind::STRING);
        assert_eq!(kind_of(text, &analysis, "title", 2), LocationKind::OTHER);
    }
}
