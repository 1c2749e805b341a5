//! Remapping stale lines and matches onto a fresh scan of the same file.

use crate::results::{Line, Match};

/// The fresh line with the same trimmed text nearest to the stale line number.
/// Ties go to the smaller line number.
pub fn remap_line<'a>(stale: &Line, fresh: &'a [Line]) -> Option<&'a Line> {
    let text = stale.text().trim();
    fresh
        .iter()
        .filter(|line| line.text().trim() == text)
        .min_by_key(|line| (line.number().abs_diff(stale.number()), line.number()))
}

/// The fresh match with the same original text nearest to the stale column.
/// Ties go to the smallest offset.
pub fn remap_match<'a>(stale: &Match, fresh: &'a [Match]) -> Option<&'a Match> {
    fresh
        .iter()
        .filter(|m| m.original() == stale.original())
        .min_by_key(|m| (m.column().abs_diff(stale.column()), m.offset()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::{FileId, LineId, MatchId};
    use crate::scanner::LocationKind;

    fn line(id: u64, number: usize, text: &str) -> Line {
        Line {
            id: LineId(id),
            file: FileId(0),
            number,
            offset: 0,
            text: text.to_string(),
            matches: Vec::new(),
            filtered: false,
        }
    }

    fn found(id: u64, original: &str, column: usize) -> Match {
        Match {
            id: MatchId(id),
            file: FileId(0),
            line: LineId(0),
            original: original.to_string(),
            offset: 100 + column,
            length: original.len(),
            column,
            kind: LocationKind::OTHER,
            replacement: None,
            filtered: false,
        }
    }

    #[test]
    fn test_line_remap_prefers_nearest_then_smaller() {
        let stale = line(1, 10, "  call(foo);");
        let fresh = vec![
            line(2, 4, "call(foo);"),
            line(3, 8, "call(foo);\t"),
            line(4, 12, "call(foo);"),
            line(5, 10, "call(bar);"),
        ];
        assert_eq!(remap_line(&stale, &fresh).map(Line::number), Some(8));
        assert!(remap_line(&line(1, 1, "gone"), &fresh).is_none());
    }

    #[test]
    fn test_match_remap_breaks_ties_by_offset() {
        let stale = found(1, "foo", 6);
        let fresh = vec![found(2, "foo", 8), found(3, "foo", 4), found(4, "Foo", 6)];
        assert_eq!(remap_match(&stale, &fresh).map(Match::id), Some(MatchId(3)));
        assert!(remap_match(&found(1, "bar", 0), &fresh).is_none());
    }
}
