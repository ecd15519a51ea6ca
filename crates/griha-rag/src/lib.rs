//! griha-rag — conversational query engine for real-estate sales.
//!
//! Blends exact structured filtering over unit/project data with semantic
//! similarity search over document text, carries conversational state
//! across turns, and composes a bounded sales-oriented response envelope.
//! The stores behind both retrieval paths, the session cache and the
//! prose-phrasing LLM are external collaborators behind traits.

pub mod compose;
pub mod config;
pub mod engine;
pub mod query;
pub mod retrieval;
pub mod session;
pub mod types;

// Re-export primary types for convenience
pub use compose::HybridComposer;
pub use config::EngineConfig;
pub use engine::{ProseGenerator, QueryEngine};
pub use query::{ConstraintExtractor, Gazetteer, IntentClassifier, ProjectRef};
pub use retrieval::{
    Predicate, SemanticSearchAdapter, StructuredSearchAdapter, StructuredStore, VectorStore,
};
pub use session::{InMemorySessionCache, SessionCache, SessionStore};
pub use types::{
    CandidateRecord, Confidence, ConstraintSet, EngineError, Intent, PassageResult,
    PossessionStatus, QueryRequest, ResponseEnvelope, SessionContext,
};

// Re-export common types
pub use anyhow::{Error, Result};
pub use uuid::Uuid;
