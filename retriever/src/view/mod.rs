//! Tree projection of search results.

mod element;
mod model;
mod sort;

pub use element::Element;
pub use model::{ViewDelta, ViewModel};
pub use sort::SortOrder;
