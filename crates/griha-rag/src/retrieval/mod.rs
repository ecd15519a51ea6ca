//! Retrieval adapters over the two external search collaborators.

pub mod semantic;
pub mod structured;

pub use semantic::{SemanticSearchAdapter, VectorStore};
pub use structured::{predicates_for, Predicate, StructuredSearchAdapter, StructuredStore};
