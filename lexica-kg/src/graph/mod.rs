//! Page link graph
//!
//! Every successful generation feeds its entity links through
//! [`GraphEngine::record_generation`], which keeps one [`LinkCandidate`] per
//! normalized slug and one weighted edge per ordered page pair.
//!
//! [`LinkCandidate`]: crate::schema::LinkCandidate

pub mod engine;
pub mod strength;

pub use engine::{GraphEngine, GraphStats, GraphUpdate, LinkDirection, LinkedPage, RelatedPage};
pub use strength::{connection_strength, tier_base};
