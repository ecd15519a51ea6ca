//! Hybrid Result Composer
//!
//! Merges structured and semantic results into the response envelope.
//! Owns the budget relaxation ladder, the confidence label, and bullet
//! construction. Every adapter interaction at this layer is
//! catch-and-degrade: a failing side never prevents an answer from the
//! other.

use std::sync::Arc;

use crate::retrieval::structured::StructuredSearchAdapter;
use crate::types::{
    CandidateRecord, Confidence, ConstraintSet, Intent, PassageResult, PossessionStatus,
    ResponseEnvelope, format_inr, REFUSAL_NO_CONTENT, REFUSAL_NO_INVENTORY, REFUSAL_UNSUPPORTED,
};

pub struct HybridComposer {
    structured: Arc<StructuredSearchAdapter>,
    relaxation_factors: Vec<f64>,
}

impl HybridComposer {
    pub fn new(structured: Arc<StructuredSearchAdapter>, relaxation_factors: Vec<f64>) -> Self {
        Self {
            structured,
            relaxation_factors,
        }
    }

    /// Build the response envelope for one turn.
    pub async fn compose(
        &self,
        intent: Intent,
        constraints: &ConstraintSet,
        structured: Vec<CandidateRecord>,
        semantic: Vec<PassageResult>,
    ) -> ResponseEnvelope {
        if intent == Intent::Unsupported {
            return refusal_envelope(
                intent,
                constraints,
                REFUSAL_UNSUPPORTED,
                "That question falls outside residential real estate, which is all this assistant covers.",
            );
        }

        let mut records = structured;
        let mut relaxed_factor: Option<f64> = None;

        // Budget relaxation: property search with a stated ceiling and an
        // empty strict result. Factors are tried in order and stop at the
        // first that yields anything; after the last one fails the answer
        // is a refusal, never a wider search. The refusal holds even when
        // semantic passages came back — a prose snippet is not inventory.
        if intent == Intent::PropertySearch && records.is_empty() {
            if let Some(budget_max) = constraints.budget_max {
                for factor in &self.relaxation_factors {
                    let widened =
                        constraints.with_budget_max((budget_max as f64 * factor).round() as i64);
                    let hits = self.structured.search(&widened).await;
                    tracing::debug!(factor = *factor, hits = hits.len(), "budget relaxation attempt");
                    if !hits.is_empty() {
                        records = hits;
                        relaxed_factor = Some(*factor);
                        break;
                    }
                }
                if records.is_empty() {
                    return refusal_envelope(
                        intent,
                        constraints,
                        REFUSAL_NO_INVENTORY,
                        "No matching inventory was found for these requirements, even after widening the budget.",
                    );
                }
            }
        }

        let confidence = assign_confidence(records.len(), relaxed_factor.is_some(), semantic.len());

        if confidence == Confidence::NotAvailable {
            let (reason, bullet) = if intent == Intent::PropertySearch {
                (
                    REFUSAL_NO_INVENTORY,
                    "No matching inventory was found for these requirements.",
                )
            } else {
                (
                    REFUSAL_NO_CONTENT,
                    "Nothing reliable enough was found to answer this; rather than guess, the honest answer is no.",
                )
            };
            return refusal_envelope(intent, constraints, reason, bullet);
        }

        let answer = build_bullets(constraints, &records, &semantic, relaxed_factor);
        let pitch_help = pitch_for(intent, relaxed_factor.is_some());
        let next_suggestion = next_for(intent, &records, relaxed_factor.is_some());

        tracing::info!(
            intent = ?intent,
            confidence = ?confidence,
            records = records.len(),
            passages = semantic.len(),
            relaxed = ?relaxed_factor,
            "composed response"
        );

        ResponseEnvelope {
            projects: records,
            answer,
            confidence,
            pitch_help,
            next_suggestion,
            is_refusal: false,
            refusal_reason: None,
            intent,
            constraints: constraints.clone(),
        }
    }
}

/// High: at least one structured record at the originally stated
/// constraints. Medium: relaxed hit, or semantic-only above threshold.
/// NotAvailable: nothing usable.
pub(crate) fn assign_confidence(
    structured_count: usize,
    relaxed: bool,
    semantic_count: usize,
) -> Confidence {
    if structured_count > 0 && !relaxed {
        Confidence::High
    } else if structured_count > 0 || semantic_count > 0 {
        Confidence::Medium
    } else {
        Confidence::NotAvailable
    }
}

/// 3-5 prioritized fact bullets: direct answer, differentiator,
/// alternative, relaxation disclosure, then padding facts up to the floor.
pub(crate) fn build_bullets(
    constraints: &ConstraintSet,
    records: &[CandidateRecord],
    semantic: &[PassageResult],
    relaxed_factor: Option<f64>,
) -> Vec<String> {
    let mut bullets = Vec::with_capacity(5);

    if records.is_empty() {
        // Semantic-only answer: the passages themselves are the facts.
        for passage in semantic.iter().take(3) {
            bullets.push(snippet(&passage.text));
        }
        if bullets.len() < 3 {
            bullets.push("This is drawn from project documentation and FAQs on record.".to_string());
        }
        if bullets.len() < 3 {
            bullets.push(
                "Share a locality or budget and matching projects can be pulled up alongside."
                    .to_string(),
            );
        }
        bullets.truncate(5);
        return bullets;
    }

    // (a) direct answer to the explicit constraint.
    bullets.push(format!(
        "{} match{} {}.",
        count_phrase(records.len()),
        if records.len() == 1 { "es" } else { "" },
        describe_constraints(constraints)
    ));

    // (b) one supporting differentiator from the top record.
    let top = &records[0];
    bullets.push(differentiator(top));

    // (c) one alternative when there is one.
    if let Some(second) = records.get(1) {
        bullets.push(format!(
            "{} in {} at {} is the closest alternative.",
            second.name,
            second.locality,
            format_inr(second.price)
        ));
    } else if let Some(passage) = semantic.first() {
        bullets.push(snippet(&passage.text));
    }

    // (d) disclosure — silently widening a budget is a correctness
    // violation, so this bullet is unconditional whenever relaxation ran.
    if let Some(factor) = relaxed_factor {
        let pct = ((factor - 1.0) * 100.0).round() as i64;
        let stated = constraints
            .budget_max
            .map(format_inr)
            .unwrap_or_else(|| "your stated budget".to_string());
        bullets.push(format!(
            "These options run up to {}% above your stated budget of {} — slightly above what you asked for.",
            pct, stated
        ));
    }

    // Padding facts up to the 3-bullet floor. The differentiator may
    // already have fallen back to the possession fact, so skip any fact
    // that was emitted once.
    if bullets.len() < 3 {
        if records.len() >= 2 {
            bullets.push(format!(
                "Prices range from {} to {} across the shortlist.",
                format_inr(records[0].price),
                format_inr(records[records.len() - 1].price)
            ));
        } else {
            let fact = possession_fact(top);
            if bullets.contains(&fact) {
                bullets.push(format!("{} is priced at {}.", top.name, format_inr(top.price)));
            } else {
                bullets.push(fact);
            }
        }
    }
    if bullets.len() < 3 {
        let available = records.iter().filter(|r| r.available).count();
        bullets.push(format!(
            "{} of {} shortlisted options currently have units available.",
            available,
            records.len()
        ));
    }

    bullets.truncate(5);
    bullets
}

fn count_phrase(n: usize) -> String {
    if n == 1 {
        "1 option".to_string()
    } else {
        format!("{} options", n)
    }
}

fn describe_constraints(c: &ConstraintSet) -> String {
    let mut parts = Vec::new();
    if !c.bedrooms.is_empty() {
        let beds: Vec<String> = c.bedrooms.iter().map(|b| b.to_string()).collect();
        parts.push(format!("your {} BHK requirement", beds.join("/")));
    } else {
        parts.push("your search".to_string());
    }
    if !c.localities.is_empty() {
        let locs: Vec<&str> = c.localities.iter().map(|l| l.as_str()).collect();
        parts.push(format!("in {}", locs.join(" / ")));
    }
    match (c.budget_min, c.budget_max) {
        (Some(min), Some(max)) => {
            parts.push(format!("between {} and {}", format_inr(min), format_inr(max)))
        }
        (None, Some(max)) => parts.push(format!("under {}", format_inr(max))),
        (Some(min), None) => parts.push(format!("above {}", format_inr(min))),
        (None, None) => {}
    }
    parts.join(" ")
}

fn differentiator(record: &CandidateRecord) -> String {
    if !record.amenities.is_empty() {
        let listed: Vec<&str> = record.amenities.iter().take(3).map(|a| a.as_str()).collect();
        format!("{} offers {}.", record.name, listed.join(", "))
    } else if let Some(rera) = &record.rera_id {
        format!("{} is RERA-registered ({}).", record.name, rera)
    } else {
        possession_fact(record)
    }
}

fn possession_fact(record: &CandidateRecord) -> String {
    let status = match record.status {
        PossessionStatus::Completed => "ready to move",
        PossessionStatus::Ongoing => "under construction",
        PossessionStatus::Upcoming => "launching soon",
    };
    match (record.possession_year, record.possession_quarter) {
        (Some(year), Some(quarter)) => format!(
            "{} is {} with possession by Q{} {}.",
            record.name, status, quarter, year
        ),
        (Some(year), None) => format!("{} is {} with possession by {}.", record.name, status, year),
        _ => format!("{} is currently {}.", record.name, status),
    }
}

fn snippet(text: &str) -> String {
    const MAX: usize = 180;
    let trimmed = text.trim();
    if trimmed.len() <= MAX {
        return trimmed.to_string();
    }
    let mut end = MAX;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &trimmed[..end].trim_end())
}

fn pitch_for(intent: Intent, relaxed: bool) -> String {
    match intent {
        Intent::PropertySearch if relaxed => {
            "Acknowledge the budget stretch upfront and anchor the conversation on value rather than price.".to_string()
        }
        Intent::PropertySearch => {
            "Lead with how closely these options match the stated requirement before widening the conversation.".to_string()
        }
        Intent::ProjectDetails => {
            "Answer the factual question first, then tie it back to the buyer's stated needs.".to_string()
        }
        Intent::Comparison => {
            "Contrast on possession timeline and price per square foot rather than brand alone.".to_string()
        }
        Intent::SalesConversation => {
            "Address the concern directly before steering back to the shortlisted options.".to_string()
        }
        Intent::Unsupported => {
            "Be upfront that this is outside scope and bring the conversation back to their property search.".to_string()
        }
    }
}

fn next_for(intent: Intent, records: &[CandidateRecord], relaxed: bool) -> String {
    match intent {
        Intent::PropertySearch if relaxed => {
            "Shall I also check nearby localities that fit the original budget?".to_string()
        }
        Intent::PropertySearch => match records.first() {
            Some(top) => format!("Would you like to schedule a site visit for {}?", top.name),
            None => "Want me to widen the search to nearby localities?".to_string(),
        },
        Intent::ProjectDetails => {
            "I can share the floor plans and payment schedule next.".to_string()
        }
        Intent::Comparison => {
            "I can line these up side by side on price, possession and amenities.".to_string()
        }
        Intent::SalesConversation => {
            "Whenever you're ready, I can pull up projects that fit your requirements.".to_string()
        }
        Intent::Unsupported => {
            "Ask about residential projects, pricing or localities and I can help.".to_string()
        }
    }
}

fn refusal_envelope(
    intent: Intent,
    constraints: &ConstraintSet,
    reason: &str,
    bullet: &str,
) -> ResponseEnvelope {
    ResponseEnvelope {
        projects: Vec::new(),
        answer: vec![bullet.to_string()],
        confidence: Confidence::NotAvailable,
        pitch_help: pitch_for(intent, false),
        next_suggestion: match intent {
            Intent::Unsupported => next_for(intent, &[], false),
            _ => "Try widening the locality or adjusting the budget slightly.".to_string(),
        },
        is_refusal: true,
        refusal_reason: Some(reason.to_string()),
        intent,
        constraints: constraints.clone(),
    }
}
