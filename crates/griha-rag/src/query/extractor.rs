//! Constraint Extractor
//!
//! Parses a raw query string into a `ConstraintSet`. Pure and infallible:
//! an unparseable query yields the fully-unconstrained set. Heuristics are
//! lexical — bedroom mentions, lakh/crore amounts with budget qualifiers,
//! gazetteer localities, possession phrases, amenities.

use std::sync::{Arc, LazyLock};

use crate::query::gazetteer::Gazetteer;
use crate::types::{ConstraintSet, PossessionStatus};

const LAKH: f64 = 100_000.0;
const CRORE: f64 = 10_000_000.0;
const THOUSAND: f64 = 1_000.0;

static BHK_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(\d{1,2})\s*(?:bhk|bed\s?rooms?|beds?)\b")
        .expect("bhk regex is valid")
});
static BHK_PAIR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(\d{1,2})\s*(?:,|/|&|-|and|or)\s*(\d{1,2})\s*(?:bhk|bed\s?rooms?)")
        .expect("bhk pair regex is valid")
});
static AMOUNT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(\d+(?:\.\d+)?)\s*(crores?|cr|lakhs?|lacs?|l|k)\b")
        .expect("amount regex is valid")
});
static BETWEEN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)\bbetween\s+(\d+(?:\.\d+)?)\s*(crores?|cr|lakhs?|lacs?|l|k)?\s*and\s+(\d+(?:\.\d+)?)\s*(crores?|cr|lakhs?|lacs?|l|k)\b",
    )
    .expect("between regex is valid")
});
static TO_RANGE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)\b(\d+(?:\.\d+)?)\s*(crores?|cr|lakhs?|lacs?|l|k)?\s*(?:to|-)\s*(\d+(?:\.\d+)?)\s*(crores?|cr|lakhs?|lacs?|l|k)\b",
    )
    .expect("to-range regex is valid")
});
static POSSESSION_YEAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(?:by|before|ready by|possession(?: in| by)?|moving in)\s+(20\d{2})\b")
        .expect("possession year regex is valid")
});

const MIN_QUALIFIERS: &[&str] = &[
    "above",
    "over",
    "more than",
    "at least",
    "minimum",
    "min",
    "starting",
    "from",
];

pub struct ConstraintExtractor {
    gazetteer: Arc<Gazetteer>,
}

impl ConstraintExtractor {
    pub fn new(gazetteer: Arc<Gazetteer>) -> Self {
        Self { gazetteer }
    }

    /// Extract every structured constraint the query states. Never fails.
    pub fn extract(&self, query: &str) -> ConstraintSet {
        let mut constraints = ConstraintSet::unconstrained();

        self.extract_bedrooms(query, &mut constraints);
        self.extract_budget(query, &mut constraints);
        self.extract_possession(query, &mut constraints);

        for locality in self.gazetteer.localities_in(query) {
            constraints.localities.insert(locality);
        }
        for amenity in self.gazetteer.amenities_in(query) {
            constraints.amenities.insert(amenity);
        }

        constraints.normalized()
    }

    fn extract_bedrooms(&self, query: &str, constraints: &mut ConstraintSet) {
        // "2 and 3 BHK" — the first count is not followed by its own unit
        // so the plain pattern misses it.
        if let Some(caps) = BHK_PAIR_RE.captures(query) {
            for idx in 1..=2 {
                if let Some(n) = caps.get(idx).and_then(|m| m.as_str().parse::<u8>().ok()) {
                    if (1..=10).contains(&n) {
                        constraints.bedrooms.insert(n);
                    }
                }
            }
        }
        for caps in BHK_RE.captures_iter(query) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<u8>().ok()) {
                if (1..=10).contains(&n) {
                    constraints.bedrooms.insert(n);
                }
            }
        }
    }

    fn extract_budget(&self, query: &str, constraints: &mut ConstraintSet) {
        // Explicit ranges first; the matched span is excluded from the
        // single-amount pass so its numbers are not classified twice.
        let mut consumed: Option<std::ops::Range<usize>> = None;

        let range_caps = BETWEEN_RE
            .captures(query)
            .or_else(|| TO_RANGE_RE.captures(query));
        if let Some(caps) = range_caps {
            let second_unit = caps.get(4).map(|m| m.as_str());
            // "between 40 and 50 lakhs" — the first amount inherits the
            // second amount's unit.
            let first_unit = caps.get(2).map(|m| m.as_str()).or(second_unit);
            let lo = caps
                .get(1)
                .zip(first_unit)
                .and_then(|(m, u)| parse_amount(m.as_str(), u));
            let hi = caps
                .get(3)
                .zip(second_unit)
                .and_then(|(m, u)| parse_amount(m.as_str(), u));
            if let (Some(lo), Some(hi)) = (lo, hi) {
                constraints.budget_min = Some(lo.min(hi));
                constraints.budget_max = Some(lo.max(hi));
                let whole = caps.get(0).expect("group 0 always present");
                consumed = Some(whole.range());
            }
        }

        for caps in AMOUNT_RE.captures_iter(query) {
            let whole = caps.get(0).expect("group 0 always present");
            if let Some(ref range) = consumed {
                if whole.start() >= range.start && whole.end() <= range.end {
                    continue;
                }
            }
            let amount = match caps
                .get(1)
                .zip(caps.get(2))
                .and_then(|(n, u)| parse_amount(n.as_str(), u.as_str()))
            {
                Some(a) => a,
                None => continue,
            };
            if has_min_qualifier(query, whole.start()) {
                constraints.budget_min.get_or_insert(amount);
            } else {
                // Bare amounts and "under X" both read as a ceiling; a
                // buyer quoting a single figure is stating their budget.
                constraints.budget_max.get_or_insert(amount);
            }
        }
    }

    fn extract_possession(&self, query: &str, constraints: &mut ConstraintSet) {
        let lower = query.to_lowercase();

        let completed = ["ready to move", "ready-to-move", "ready possession", "rtm"];
        if completed.iter().any(|p| lower.contains(p)) {
            constraints.statuses.insert(PossessionStatus::Completed);
        }
        if lower.contains("under construction") || lower.contains("ongoing project") {
            constraints.statuses.insert(PossessionStatus::Ongoing);
        }
        let upcoming = ["upcoming", "new launch", "pre-launch", "prelaunch"];
        if upcoming.iter().any(|p| lower.contains(p)) {
            constraints.statuses.insert(PossessionStatus::Upcoming);
        }

        if let Some(caps) = POSSESSION_YEAR_RE.captures(query) {
            if let Some(year) = caps.get(1).and_then(|m| m.as_str().parse::<i32>().ok()) {
                constraints.possession_year = Some(year);
            }
        }
    }
}

/// Collapse "50" + "lakh"/"cr"/"k" into whole rupees.
fn parse_amount(number: &str, unit: &str) -> Option<i64> {
    let value: f64 = number.parse().ok()?;
    let unit = unit.to_lowercase();
    let multiplier = if unit.starts_with("cr") {
        CRORE
    } else if unit.starts_with('l') {
        LAKH
    } else if unit.starts_with('k') {
        THOUSAND
    } else {
        return None;
    };
    let rupees = (value * multiplier).round() as i64;
    (rupees > 0).then_some(rupees)
}

/// Does the text just before an amount carry a lower-bound qualifier?
fn has_min_qualifier(query: &str, amount_start: usize) -> bool {
    let mut start = amount_start.saturating_sub(24);
    while !query.is_char_boundary(start) {
        start -= 1;
    }
    let window = query[start..amount_start].to_lowercase();
    MIN_QUALIFIERS.iter().any(|q| window.contains(q))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor() -> ConstraintExtractor {
        ConstraintExtractor::new(Arc::new(Gazetteer::new()))
    }

    #[test]
    fn test_bedroom_mentions() {
        let c = extractor().extract("show me a 2BHK");
        assert_eq!(c.bedrooms, [2].into_iter().collect());

        let c = extractor().extract("looking for a 3 bedroom flat");
        assert_eq!(c.bedrooms, [3].into_iter().collect());
    }

    #[test]
    fn test_multiple_bedrooms_are_a_set() {
        let c = extractor().extract("2 and 3 BHK options please");
        assert_eq!(c.bedrooms, [2, 3].into_iter().collect());

        let c = extractor().extract("2/3 bhk in whitefield");
        assert_eq!(c.bedrooms, [2, 3].into_iter().collect());
    }

    #[test]
    fn test_under_budget_sets_max() {
        let c = extractor().extract("2BHK under 50 lakhs");
        assert_eq!(c.budget_max, Some(5_000_000));
        assert_eq!(c.budget_min, None);
    }

    #[test]
    fn test_crore_amounts() {
        let c = extractor().extract("villa within 1.5 cr");
        assert_eq!(c.budget_max, Some(15_000_000));
    }

    #[test]
    fn test_above_sets_min() {
        let c = extractor().extract("premium flats above 80L");
        assert_eq!(c.budget_min, Some(8_000_000));
        assert_eq!(c.budget_max, None);
    }

    #[test]
    fn test_between_range() {
        let c = extractor().extract("between 40 and 60 lakhs");
        assert_eq!(c.budget_min, Some(4_000_000));
        assert_eq!(c.budget_max, Some(6_000_000));
    }

    #[test]
    fn test_reversed_range_is_reordered() {
        let c = extractor().extract("between 60L and 40L");
        assert_eq!(c.budget_min, Some(4_000_000));
        assert_eq!(c.budget_max, Some(6_000_000));
    }

    #[test]
    fn test_to_range() {
        let c = extractor().extract("budget 50L to 70L");
        assert_eq!(c.budget_min, Some(5_000_000));
        assert_eq!(c.budget_max, Some(7_000_000));
    }

    #[test]
    fn test_ready_to_move_sets_completed() {
        let c = extractor().extract("ready to move flats in hebbal");
        assert!(c.statuses.contains(&PossessionStatus::Completed));
        assert!(c.localities.contains("Hebbal"));
    }

    #[test]
    fn test_possession_year() {
        let c = extractor().extract("possession by 2027 please");
        assert_eq!(c.possession_year, Some(2027));

        let c = extractor().extract("need it by 2026");
        assert_eq!(c.possession_year, Some(2026));
    }

    #[test]
    fn test_locality_and_amenities() {
        let c = extractor().extract("apartment in whitefield with pool and gym");
        assert!(c.localities.contains("Whitefield"));
        assert!(c.amenities.contains("swimming pool"));
        assert!(c.amenities.contains("gym"));
    }

    #[test]
    fn test_unparseable_query_is_unconstrained() {
        let c = extractor().extract("tell me a joke");
        assert!(c.is_unconstrained());
    }

    #[test]
    fn test_full_scenario_query() {
        let c = extractor().extract("2BHK under 50L in Whitefield");
        assert_eq!(c.bedrooms, [2].into_iter().collect());
        assert_eq!(c.budget_max, Some(5_000_000));
        assert!(c.localities.contains("Whitefield"));
    }

    #[test]
    fn test_year_without_possession_cue_is_ignored() {
        let c = extractor().extract("is 2027 a good year for the market");
        assert_eq!(c.possession_year, None);
    }
}
