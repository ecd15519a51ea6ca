//! Query understanding: constraint extraction and intent classification.

pub mod extractor;
pub mod gazetteer;
pub mod intent;

pub use extractor::ConstraintExtractor;
pub use gazetteer::{Gazetteer, ProjectRef};
pub use intent::IntentClassifier;
