use regex::{Regex, RegexBuilder};

use crate::errors::{SearchError, SearchResult};
use crate::scanner::LocationKind;

/// A secondary visibility predicate over found matches.
///
/// A line is filtered when a pattern is set and whether the pattern matches the line
/// text equals `hide_matching`. A match is filtered when its line is, or when its
/// location is not accepted.
#[derive(Debug, Clone)]
pub struct Filter {
    pattern: Option<Regex>,
    case_sensitive: bool,
    hide_matching: bool,
    accepted: LocationKind,
    origin: Option<String>,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            pattern: None,
            case_sensitive: false,
            hide_matching: false,
            accepted: LocationKind::all(),
            origin: None,
        }
    }
}

impl Filter {
    /// Filter that hides nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts lines by a regular expression over the line text
    pub fn with_pattern(mut self, pattern: &str, case_sensitive: bool) -> SearchResult<Self> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| SearchError::invalid_pattern(e.to_string()))?;
        self.pattern = Some(regex);
        self.case_sensitive = case_sensitive;
        Ok(self)
    }

    /// Hide lines matching the pattern instead of showing only them
    pub fn hide_matching(mut self, hide: bool) -> Self {
        self.hide_matching = hide;
        self
    }

    pub fn accepting(mut self, locations: LocationKind) -> Self {
        self.accepted = locations;
        self
    }

    /// Tags the filter with the token of whoever applied it
    pub fn from_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_ref().map(Regex::as_str)
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    pub fn hides_matching(&self) -> bool {
        self.hide_matching
    }

    pub fn accepted(&self) -> LocationKind {
        self.accepted
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Whether this filter can hide anything at all
    pub fn is_active(&self) -> bool {
        self.pattern.is_some() || !self.accepted.contains(LocationKind::all())
    }

    /// Compares everything but the origin; patterns compare by source text
    pub fn same_parameters(&self, other: &Filter) -> bool {
        self.hide_matching == other.hide_matching
            && self.accepted == other.accepted
            && self.pattern() == other.pattern()
            && (self.pattern.is_none() || self.case_sensitive == other.case_sensitive)
    }

    pub fn is_line_filtered(&self, text: &str) -> bool {
        self.pattern
            .as_ref()
            .is_some_and(|p| p.is_match(text) == self.hide_matching)
    }

    pub fn is_match_filtered(&self, line_filtered: bool, kind: LocationKind) -> bool {
        line_filtered || !self.accepted.intersects(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_hides_nothing() {
        let filter = Filter::new();
        assert!(!filter.is_active());
        assert!(!filter.is_line_filtered("anything"));
        for kind in LocationKind::all().iter() {
            assert!(!filter.is_match_filtered(false, kind));
        }
    }

    #[test]
    fn test_pattern_shows_or_hides_lines() -> SearchResult<()> {
        let show = Filter::new().with_pattern("todo", false)?;
        assert!(!show.is_line_filtered("// TODO: fix"));
        assert!(show.is_line_filtered("let x = 1;"));

        let hide = Filter::new().with_pattern("todo", false)?.hide_matching(true);
        assert!(hide.is_line_filtered("// TODO: fix"));
        assert!(!hide.is_line_filtered("let x = 1;"));
        Ok(())
    }

    #[test]
    fn test_location_acceptance() {
        let filter = Filter::new().accepting(LocationKind::all() - LocationKind::COMMENT);
        assert!(filter.is_active());
        assert!(filter.is_match_filtered(false, LocationKind::COMMENT));
        assert!(!filter.is_match_filtered(false, LocationKind::STRING));
        assert!(filter.is_match_filtered(true, LocationKind::STRING));
    }

    #[test]
    fn test_parameter_equality_ignores_origin() -> SearchResult<()> {
        let a = Filter::new().with_pattern("x+", true)?.from_origin("view");
        let b = Filter::new().with_pattern("x+", true)?;
        assert!(a.same_parameters(&b));
        assert!(!a.same_parameters(&b.clone().hide_matching(true)));
        Ok(())
    }
}
