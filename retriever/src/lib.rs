//! Search and replace over source trees.
//!
//! A [`SearchQuery`] runs a pattern over a [`Scope`] and fills a [`SearchResults`] index
//! with lines and matches, each match classified by where it lies (comment, string,
//! import, ...). A [`Filter`] hides matches without dropping them, a [`ViewModel`]
//! keeps a tree of what is visible up to date, and a [`ReplaceOperation`] changes the
//! matched text in place.

pub mod config;
pub mod errors;
pub mod filters;
pub mod metrics;
pub mod progress;
pub mod replace;
pub mod results;
pub mod scanner;
pub mod scope;
pub mod search;
pub mod view;
pub mod workspace;

pub use config::{EncodingMode, SearchConfig};
pub use errors::{SearchError, SearchResult};
pub use progress::{CancelFlag, NullProgress, ProgressMonitor};
pub use replace::{ReplaceMode, ReplaceOperation, ReplaceOutcome, ReplaceSession, ReplaceTarget};
pub use results::{Filter, Line, Match, MatchCounts, ResultEvent, SearchResults};
pub use scanner::{LocationKind, ScannerRegistry};
pub use scope::{Scope, ScopeDescription};
pub use search::{PatternDefinition, SearchJob, SearchQuery, SearchStatus};
pub use view::{Element, SortOrder, ViewDelta, ViewModel};
