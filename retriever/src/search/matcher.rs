use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::errors::{SearchError, SearchResult};

/// What the user typed into the search field, plus its flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDefinition {
    pub text: String,
    #[serde(default)]
    pub is_regex: bool,
    #[serde(default)]
    pub case_sensitive: bool,
    #[serde(default)]
    pub whole_word: bool,
}

impl PatternDefinition {
    /// A case-insensitive literal pattern
    pub fn literal(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_regex: false,
            case_sensitive: false,
            whole_word: false,
        }
    }

    /// A case-sensitive regular expression
    pub fn regex(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_regex: true,
            case_sensitive: true,
            whole_word: false,
        }
    }
}

/// A compiled search pattern
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    definition: PatternDefinition,
    regex: Regex,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

impl PatternMatcher {
    /// Compiles the definition into a single regular expression
    pub fn new(definition: PatternDefinition) -> SearchResult<Self> {
        if definition.text.is_empty() {
            return Err(SearchError::invalid_pattern("Pattern cannot be empty"));
        }

        let mut source = if definition.is_regex {
            definition.text.clone()
        } else {
            regex::escape(&definition.text)
        };

        if definition.whole_word {
            source = if definition.is_regex {
                format!(r"\b(?:{})\b", source)
            } else {
                let starts = definition.text.starts_with(is_word_char);
                let ends = definition.text.ends_with(is_word_char);
                format!(
                    "{}{}{}",
                    if starts { r"\b" } else { "" },
                    source,
                    if ends { r"\b" } else { "" }
                )
            };
        }
        if !definition.case_sensitive {
            source = format!("(?i){}", source);
        }

        let regex = Regex::new(&source).map_err(|e| SearchError::invalid_pattern(e.to_string()))?;
        Ok(Self { definition, regex })
    }

    pub fn definition(&self) -> &PatternDefinition {
        &self.definition
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    /// Byte ranges of all non-empty matches, in ascending order
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        self.regex
            .find_iter(text)
            .filter(|m| !m.is_empty())
            .map(|m| (m.start(), m.end()))
            .collect()
    }

    /// Finds the first match at or after `start` and expands `template` for it
    pub fn replacement_at(
        &self,
        text: &str,
        start: usize,
        template: &str,
    ) -> Option<(usize, usize, String)> {
        if start > text.len() || !text.is_char_boundary(start) {
            return None;
        }
        let caps = self.regex.captures_at(text, start)?;
        let whole = caps.get(0)?;
        Some((whole.start(), whole.end(), self.expand_captures(&caps, template)))
    }

    /// Expands `template` against `original` matched on its own
    pub fn expand(&self, original: &str, template: &str) -> String {
        match self.regex.captures(original) {
            Some(caps) => self.expand_captures(&caps, template),
            None => template.to_string(),
        }
    }

    fn expand_captures(&self, caps: &Captures<'_>, template: &str) -> String {
        if !self.definition.is_regex {
            return template.to_string();
        }
        let mut expanded = String::new();
        caps.expand(template, &mut expanded);
        expanded
    }

    /// Rejects templates referring to groups the pattern does not have
    pub fn validate_replacement(&self, template: &str) -> SearchResult<()> {
        if !self.definition.is_regex {
            return Ok(());
        }
        validate_capture_groups(&self.regex, template)
    }
}

fn validate_capture_groups(regex: &Regex, template: &str) -> SearchResult<()> {
    let group_count = regex.captures_len(); // includes group 0
    let names: Vec<&str> = regex.capture_names().flatten().collect();
    let unescaped = template.replace("$$", "");

    let mut rest = unescaped.as_str();
    while let Some(pos) = rest.find('$') {
        rest = &rest[pos + 1..];
        let reference = if let Some(braced) = rest.strip_prefix('{') {
            braced.split_once('}').map(|(name, _)| name)
        } else {
            let len = rest
                .find(|c: char| !is_word_char(c))
                .unwrap_or(rest.len());
            Some(&rest[..len])
        };
        let Some(reference) = reference.filter(|r| !r.is_empty()) else {
            continue;
        };
        let exists = match reference.parse::<usize>() {
            Ok(num) => num < group_count,
            Err(_) => names.contains(&reference),
        };
        if !exists {
            return Err(SearchError::invalid_pattern(format!(
                "Capture group ${} does not exist",
                reference
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_case_insensitive() {
        let matcher = PatternMatcher::new(PatternDefinition::literal("foo")).unwrap();
        let text = "Foo foo FOO f.o";
        let found: Vec<&str> = matcher
            .find_matches(text)
            .into_iter()
            .map(|(s, e)| &text[s..e])
            .collect();
        assert_eq!(found, vec!["Foo", "foo", "FOO"]);
    }

    #[test]
    fn test_literal_is_escaped() {
        let matcher = PatternMatcher::new(PatternDefinition::literal("a.b")).unwrap();
        assert_eq!(matcher.find_matches("axb a.b"), vec![(4, 7)]);
    }

    #[test]
    fn test_whole_word() {
        let mut def = PatternDefinition::literal("test");
        def.whole_word = true;
        let matcher = PatternMatcher::new(def).unwrap();
        assert_eq!(matcher.find_matches("test testing attest test"), vec![(0, 4), (20, 24)]);

        let mut def = PatternDefinition::regex(r"te\w+");
        def.whole_word = true;
        let matcher = PatternMatcher::new(def).unwrap();
        assert_eq!(matcher.find_matches("attest tested"), vec![(7, 13)]);
    }

    #[test]
    fn test_empty_and_invalid_patterns() {
        assert!(PatternMatcher::new(PatternDefinition::literal("")).is_err());
        assert!(PatternMatcher::new(PatternDefinition::regex("(unclosed")).is_err());
    }

    #[test]
    fn test_replacement_with_groups() {
        let matcher = PatternMatcher::new(PatternDefinition::regex(r"fn (\w+)\(\)")).unwrap();
        let text = "fn a() fn b()";
        let (start, end, replaced) = matcher.replacement_at(text, 1, "fn new_$1()").unwrap();
        assert_eq!((start, end), (7, 13));
        assert_eq!(replaced, "fn new_b()");
        assert_eq!(matcher.expand("fn a()", "${1}_x"), "a_x");
    }

    #[test]
    fn test_anchor_respects_start_offset() {
        let matcher = PatternMatcher::new(PatternDefinition::regex(r"^ab")).unwrap();
        assert!(matcher.replacement_at("abab", 2, "x").is_none());
        assert_eq!(matcher.replacement_at("abab", 0, "x").map(|r| r.0), Some(0));
    }

    #[test]
    fn test_literal_replacement_is_verbatim() {
        let matcher = PatternMatcher::new(PatternDefinition::literal("cost")).unwrap();
        assert_eq!(matcher.expand("cost", "$1 price"), "$1 price");
        assert!(matcher.validate_replacement("$1 price").is_ok());
    }

    #[test]
    fn test_validate_capture_groups() {
        let matcher = PatternMatcher::new(PatternDefinition::regex(r"(?P<name>\w+)=(\d+)")).unwrap();
        assert!(matcher.validate_replacement("$1 $2 ${name} $$5").is_ok());
        assert!(matcher.validate_replacement("$3").is_err());
        assert!(matcher.validate_replacement("${missing}").is_err());
    }
}
