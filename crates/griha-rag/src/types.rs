use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

/// Construction/possession status of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PossessionStatus {
    Upcoming,
    Ongoing,
    Completed,
}

/// Intent assigned to a single query turn. Exactly one per query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    PropertySearch,
    ProjectDetails,
    Comparison,
    SalesConversation,
    Unsupported,
}

/// Coarse trust signal attached to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    High,
    Medium,
    #[serde(rename = "Not Available")]
    NotAvailable,
}

/// Structured filter set extracted from one query turn.
///
/// Immutable value: merges and overlays produce new instances. Empty
/// collections and `None` fields mean "unconstrained" — they impose no
/// predicate downstream and inherit prior-turn values on merge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConstraintSet {
    pub bedrooms: BTreeSet<u8>,
    /// Lower budget bound in whole rupees.
    pub budget_min: Option<i64>,
    /// Upper budget bound in whole rupees.
    pub budget_max: Option<i64>,
    pub localities: BTreeSet<String>,
    pub possession_year: Option<i32>,
    pub statuses: BTreeSet<PossessionStatus>,
    pub amenities: BTreeSet<String>,
}

impl ConstraintSet {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.bedrooms.is_empty()
            && self.budget_min.is_none()
            && self.budget_max.is_none()
            && self.localities.is_empty()
            && self.possession_year.is_none()
            && self.statuses.is_empty()
            && self.amenities.is_empty()
    }

    /// True when at least one filter a buyer would call "concrete" is set:
    /// bedrooms, budget, or locality.
    pub fn has_concrete_filter(&self) -> bool {
        !self.bedrooms.is_empty()
            || self.budget_min.is_some()
            || self.budget_max.is_some()
            || !self.localities.is_empty()
    }

    /// Field-wise override: fields populated in `self` replace the
    /// corresponding fields of `prior`; unpopulated fields inherit.
    /// This is what lets "what about 3BHK?" keep locality and budget
    /// from the previous turn while overriding bedrooms.
    pub fn merge_onto(&self, prior: &ConstraintSet) -> ConstraintSet {
        ConstraintSet {
            bedrooms: if self.bedrooms.is_empty() {
                prior.bedrooms.clone()
            } else {
                self.bedrooms.clone()
            },
            budget_min: self.budget_min.or(prior.budget_min),
            budget_max: self.budget_max.or(prior.budget_max),
            localities: if self.localities.is_empty() {
                prior.localities.clone()
            } else {
                self.localities.clone()
            },
            possession_year: self.possession_year.or(prior.possession_year),
            statuses: if self.statuses.is_empty() {
                prior.statuses.clone()
            } else {
                self.statuses.clone()
            },
            amenities: if self.amenities.is_empty() {
                prior.amenities.clone()
            } else {
                self.amenities.clone()
            },
        }
        .normalized()
    }

    /// Copy of this set with the budget ceiling replaced. Used by the
    /// composer's relaxation ladder.
    pub fn with_budget_max(&self, budget_max: i64) -> ConstraintSet {
        ConstraintSet {
            budget_max: Some(budget_max),
            ..self.clone()
        }
        .normalized()
    }

    /// Enforce budget_min <= budget_max by swapping a reversed pair.
    pub fn normalized(mut self) -> ConstraintSet {
        if let (Some(min), Some(max)) = (self.budget_min, self.budget_max) {
            if min > max {
                self.budget_min = Some(max);
                self.budget_max = Some(min);
            }
        }
        self
    }
}

/// One project/unit row returned by the structured collaborator.
/// Produced fresh per query; never cached by the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub project_id: Uuid,
    pub name: String,
    /// Asking price in whole rupees.
    pub price: i64,
    pub bedrooms: u8,
    pub locality: String,
    pub status: PossessionStatus,
    pub possession_year: Option<i32>,
    pub possession_quarter: Option<u8>,
    pub available: bool,
    pub rera_id: Option<String>,
    pub amenities: Vec<String>,
}

/// One similarity-scored passage from the vector collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassageResult {
    pub doc_id: Uuid,
    pub text: String,
    /// Cosine similarity in [0, 1].
    pub similarity: f32,
    pub project_id: Option<Uuid>,
}

/// Incoming request for one conversational turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub conversation_id: String,
    pub query: String,
    /// Explicit per-turn constraint override. Takes precedence over
    /// extracted constraints for this turn only; fields it does not set
    /// are untouched in persisted context.
    #[serde(default)]
    pub filters: Option<ConstraintSet>,
}

/// The engine's output for one turn. Built fresh every turn, never
/// persisted. The `answer` bullets are material for the downstream
/// text-generation collaborator, not final prose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub projects: Vec<CandidateRecord>,
    /// 3-5 fact bullets, or exactly one explanatory bullet on refusal.
    pub answer: Vec<String>,
    pub confidence: Confidence,
    pub pitch_help: String,
    pub next_suggestion: String,
    pub is_refusal: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refusal_reason: Option<String>,
    pub intent: Intent,
    /// The constraints the retrieval actually ran with, echoed back so the
    /// formatting consumer has the full material.
    pub constraints: ConstraintSet,
}

pub const REFUSAL_NO_INVENTORY: &str = "no_matching_inventory";
pub const REFUSAL_NO_CONTENT: &str = "no_relevant_content";
pub const REFUSAL_UNSUPPORTED: &str = "unsupported_query";

/// Boundary validation errors. Malformed requests are rejected before the
/// pipeline runs; nothing inside the pipeline raises these.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("conversation_id must not be empty")]
    EmptyConversationId,
    #[error("query must not be empty")]
    EmptyQuery,
}

/// Render whole rupees the way sales teams quote them: lakhs below a
/// crore, crores above.
pub fn format_inr(rupees: i64) -> String {
    const LAKH: i64 = 100_000;
    const CRORE: i64 = 10_000_000;
    if rupees >= CRORE {
        let crores = rupees as f64 / CRORE as f64;
        if (crores - crores.round()).abs() < 1e-9 {
            format!("\u{20b9}{} Cr", crores.round() as i64)
        } else {
            format!("\u{20b9}{:.2} Cr", crores)
        }
    } else if rupees >= LAKH {
        let lakhs = rupees as f64 / LAKH as f64;
        if (lakhs - lakhs.round()).abs() < 1e-9 {
            format!("\u{20b9}{} L", lakhs.round() as i64)
        } else {
            format!("\u{20b9}{:.1} L", lakhs)
        }
    } else {
        format!("\u{20b9}{}", rupees)
    }
}

/// Per-conversation state carried across turns. Owned exclusively by the
/// session store; expires with the external cache TTL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    pub constraints: ConstraintSet,
    pub last_intent: Option<Intent>,
    pub turn_count: u32,
    pub created_at: DateTime<Utc>,
    pub last_updated_at: DateTime<Utc>,
}

impl SessionContext {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            constraints: ConstraintSet::unconstrained(),
            last_intent: None,
            turn_count: 0,
            created_at: now,
            last_updated_at: now,
        }
    }

    /// Fold one turn into the context: field-wise constraint override,
    /// intent recorded, turn count incremented.
    pub fn merge_turn(&self, new: &ConstraintSet, intent: Intent) -> SessionContext {
        SessionContext {
            constraints: new.merge_onto(&self.constraints),
            last_intent: Some(intent),
            turn_count: self.turn_count + 1,
            created_at: self.created_at,
            last_updated_at: Utc::now(),
        }
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}
