//! Intent Classifier
//!
//! Assigns each query exactly one intent from a fixed rule cascade. The
//! rule order is the tie-break policy: property search, project details,
//! comparison, unsupported, then the sales-conversation catch-all. Every
//! sales-conversation query flows through one uniform downstream path;
//! there is deliberately no sub-intent routing.

use std::sync::Arc;

use crate::query::gazetteer::Gazetteer;
use crate::types::{ConstraintSet, Intent, SessionContext};

/// Verbs and phrases that signal a search action. A bedroom/budget/locality
/// mention with no other framing also reads as a search ("2BHK under 50L").
const SEARCH_VERBS: &[&str] = &[
    "show",
    "find",
    "looking for",
    "look for",
    "search",
    "list",
    "suggest",
    "recommend",
    "browse",
    "need a",
    "want a",
    "want to buy",
    "options",
    "available",
    "what about",
    "any ",
];

const ATTRIBUTE_CUES: &[&str] = &[
    "price",
    "cost",
    "amenit",
    "rera",
    "configuration",
    "config",
    "floor plan",
    "possession",
    "carpet area",
    "location",
    "address",
    "details",
    "tell me about",
    "what is",
];

const COMPARISON_CUES: &[&str] = &[
    " vs ",
    " vs.",
    "versus",
    "compare",
    "better",
    "difference between",
    "which one",
    "which is",
];

/// Lexical anchors that mark a query as in-domain even when nothing
/// structured could be extracted from it.
const DOMAIN_ANCHORS: &[&str] = &[
    "property",
    "properties",
    "flat",
    "apartment",
    "villa",
    "plot",
    "home",
    "house",
    "bhk",
    "project",
    "builder",
    "rera",
    "possession",
    "site visit",
    "loan",
    "emi",
    "down payment",
    "registration",
    "stamp duty",
    "price",
    "budget",
    "buy",
    "rent",
    "invest",
    "real estate",
    "carpet area",
    "locality",
    "broker",
    "resale",
];

pub struct IntentClassifier {
    gazetteer: Arc<Gazetteer>,
}

impl IntentClassifier {
    pub fn new(gazetteer: Arc<Gazetteer>) -> Self {
        Self { gazetteer }
    }

    /// First matching rule wins. Never fails; unresolvable queries land on
    /// `SalesConversation`, not `Unsupported`, unless rule 4 is unambiguous.
    pub fn classify(
        &self,
        query: &str,
        constraints: &ConstraintSet,
        prior: Option<&SessionContext>,
    ) -> Intent {
        let lower = query.to_lowercase();
        let projects = self.gazetteer.projects_in(query);

        // Rule 1: concrete filter + a search action signal.
        if constraints.has_concrete_filter() && self.has_search_signal(&lower, constraints) {
            return Intent::PropertySearch;
        }

        // Rule 3's cues outrank rule 2 when two projects are named, but the
        // cascade checks rule 2 first, so guard on the project count here.
        if projects.len() == 1 && ATTRIBUTE_CUES.iter().any(|c| lower.contains(c)) {
            return Intent::ProjectDetails;
        }

        if projects.len() >= 2 || COMPARISON_CUES.iter().any(|c| lower.contains(c)) {
            return Intent::Comparison;
        }

        // Rule 4: clearly out of domain — zero entities, zero extracted
        // constraints, zero prior context.
        if self.is_out_of_domain(&lower, constraints, &projects, prior) {
            return Intent::Unsupported;
        }

        // Rule 5: catch-all for objections, FAQs, general advice.
        Intent::SalesConversation
    }

    fn has_search_signal(&self, lower: &str, constraints: &ConstraintSet) -> bool {
        if SEARCH_VERBS.iter().any(|v| lower.contains(v)) {
            return true;
        }
        // A bare constraint utterance ("2BHK under 50L in Whitefield") is a
        // search even without a verb.
        !constraints.bedrooms.is_empty()
            || constraints.budget_max.is_some()
            || constraints.budget_min.is_some()
    }

    fn is_out_of_domain(
        &self,
        lower: &str,
        constraints: &ConstraintSet,
        projects: &[crate::query::gazetteer::ProjectRef],
        prior: Option<&SessionContext>,
    ) -> bool {
        if !constraints.is_unconstrained() || !projects.is_empty() {
            return false;
        }
        if DOMAIN_ANCHORS.iter().any(|a| lower.contains(a)) {
            return false;
        }
        // Prior context keeps the conversation in-domain: a short follow-up
        // with no anchors is still about the ongoing search.
        match prior {
            Some(ctx) => ctx.turn_count == 0 && ctx.constraints.is_unconstrained(),
            None => true,
        }
    }
}
