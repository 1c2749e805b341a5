//! Running a pattern over a scope.
//!
//! The [`FileSystemSearchEngine`] walks the scope and reads files in parallel with rayon,
//! then reports raw matches sequentially, in sort order, to a [`MatchCollector`]. The
//! [`ResultCollector`] classifies each match with the scanner registry and fills the
//! result index of a [`SearchQuery`].

mod collector;
mod engine;
mod matcher;
mod query;

pub use collector::ResultCollector;
pub use engine::{FileSystemSearchEngine, MatchCollector, RawMatch, RawSearchEngine, SearchStatus};
pub use matcher::{PatternDefinition, PatternMatcher};
pub use query::{matching_paths, SearchJob, SearchQuery};
