//! Data model for cached pages and the page graph
//!
//! Three persisted shapes: cached pages (keyed by slug), link candidates
//! (keyed by normalized slug) and page connections (keyed by the ordered
//! `(from, to)` pair).

pub mod link;
pub mod page;

pub use link::{CandidateObservation, EntityLink, LinkCandidate, LinkConfidence, PageConnection};
pub use page::{CachedPage, PageMetadata, PageStoreSummary, PageSummary};
