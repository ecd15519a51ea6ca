//! Structured Search Adapter
//!
//! Translates a `ConstraintSet` into exact/range/set-membership predicates
//! for the tabular collaborator. Unconstrained fields impose no predicate —
//! nothing is ever silently defaulted. Empty results are not errors; the
//! composer's relaxation ladder keys off them. Timeouts and collaborator
//! errors degrade to an empty result set.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{CandidateRecord, ConstraintSet, PossessionStatus};

/// One filter predicate against the tabular collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    BedroomsIn(BTreeSet<u8>),
    PriceAtLeast(i64),
    PriceAtMost(i64),
    LocalityIn(BTreeSet<String>),
    /// "by 2027" means handover no later than 2027.
    PossessionYearAtMost(i32),
    StatusIn(BTreeSet<PossessionStatus>),
    AmenitiesContainAll(BTreeSet<String>),
}

/// Translate each populated field into a predicate. An empty vector means
/// "no filtering" and the collaborator must return its unfiltered ranking.
pub fn predicates_for(constraints: &ConstraintSet) -> Vec<Predicate> {
    let mut predicates = Vec::new();
    if !constraints.bedrooms.is_empty() {
        predicates.push(Predicate::BedroomsIn(constraints.bedrooms.clone()));
    }
    if let Some(min) = constraints.budget_min {
        predicates.push(Predicate::PriceAtLeast(min));
    }
    if let Some(max) = constraints.budget_max {
        predicates.push(Predicate::PriceAtMost(max));
    }
    if !constraints.localities.is_empty() {
        predicates.push(Predicate::LocalityIn(constraints.localities.clone()));
    }
    if let Some(year) = constraints.possession_year {
        predicates.push(Predicate::PossessionYearAtMost(year));
    }
    if !constraints.statuses.is_empty() {
        predicates.push(Predicate::StatusIn(constraints.statuses.clone()));
    }
    if !constraints.amenities.is_empty() {
        predicates.push(Predicate::AmenitiesContainAll(constraints.amenities.clone()));
    }
    predicates
}

/// Tabular query collaborator: accepts a predicate set, returns ranked
/// records. Must support "no predicates = no filtering".
#[async_trait]
pub trait StructuredStore: Send + Sync {
    async fn query(&self, predicates: &[Predicate], limit: usize) -> Result<Vec<CandidateRecord>>;
}

pub struct StructuredSearchAdapter {
    store: Arc<dyn StructuredStore>,
    limit: usize,
    timeout: Duration,
}

impl StructuredSearchAdapter {
    pub fn new(store: Arc<dyn StructuredStore>, limit: usize, timeout: Duration) -> Self {
        Self {
            store,
            limit,
            timeout,
        }
    }

    /// Issue the filter query. Results come back ordered ascending by
    /// price; the sort is stable so the collaborator's ranking survives
    /// among equal-priced records.
    pub async fn search(&self, constraints: &ConstraintSet) -> Vec<CandidateRecord> {
        let predicates = predicates_for(constraints);
        let outcome = tokio::time::timeout(
            self.timeout,
            self.store.query(&predicates, self.limit),
        )
        .await;
        let mut records = match outcome {
            Ok(Ok(records)) => records,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "structured search failed, degrading to empty result");
                return Vec::new();
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "structured search timed out");
                return Vec::new();
            }
        };
        records.sort_by_key(|r| r.price);
        records.truncate(self.limit);
        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    pub(crate) fn record(name: &str, price: i64, bedrooms: u8, locality: &str) -> CandidateRecord {
        CandidateRecord {
            project_id: Uuid::new_v4(),
            name: name.to_string(),
            price,
            bedrooms,
            locality: locality.to_string(),
            status: PossessionStatus::Ongoing,
            possession_year: Some(2026),
            possession_quarter: Some(4),
            available: true,
            rera_id: Some(format!("PRM/KA/RERA/{}", name.len())),
            amenities: vec!["gym".to_string(), "swimming pool".to_string()],
        }
    }

    struct FixedStore {
        records: Vec<CandidateRecord>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl StructuredStore for FixedStore {
        async fn query(
            &self,
            _predicates: &[Predicate],
            _limit: usize,
        ) -> Result<Vec<CandidateRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.records.clone())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl StructuredStore for FailingStore {
        async fn query(
            &self,
            _predicates: &[Predicate],
            _limit: usize,
        ) -> Result<Vec<CandidateRecord>> {
            Err(anyhow!("store unreachable"))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl StructuredStore for SlowStore {
        async fn query(
            &self,
            _predicates: &[Predicate],
            _limit: usize,
        ) -> Result<Vec<CandidateRecord>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
    }

    #[test]
    fn test_unconstrained_set_yields_no_predicates() {
        assert!(predicates_for(&ConstraintSet::unconstrained()).is_empty());
    }

    #[test]
    fn test_each_field_maps_to_one_predicate() {
        let mut c = ConstraintSet::unconstrained();
        c.bedrooms.insert(2);
        c.budget_min = Some(4_000_000);
        c.budget_max = Some(6_000_000);
        c.localities.insert("Whitefield".to_string());
        c.possession_year = Some(2027);
        c.statuses.insert(PossessionStatus::Completed);
        c.amenities.insert("gym".to_string());

        let predicates = predicates_for(&c);
        assert_eq!(predicates.len(), 7);
        assert!(predicates.contains(&Predicate::PriceAtMost(6_000_000)));
        assert!(predicates.contains(&Predicate::PossessionYearAtMost(2027)));
    }

    #[tokio::test]
    async fn test_results_sorted_ascending_by_price() {
        let store = Arc::new(FixedStore {
            records: vec![
                record("Costly Towers", 9_000_000, 3, "Hebbal"),
                record("Budget Nest", 4_500_000, 2, "Whitefield"),
            ],
            calls: AtomicUsize::new(0),
        });
        let adapter =
            StructuredSearchAdapter::new(store, 10, Duration::from_millis(500));
        let results = adapter.search(&ConstraintSet::unconstrained()).await;
        assert_eq!(results[0].name, "Budget Nest");
        assert_eq!(results[1].name, "Costly Towers");
    }

    #[tokio::test]
    async fn test_limit_is_applied() {
        let store = Arc::new(FixedStore {
            records: (0..8)
                .map(|i| record(&format!("P{}", i), 4_000_000 + i * 100_000, 2, "Whitefield"))
                .collect(),
            calls: AtomicUsize::new(0),
        });
        let adapter = StructuredSearchAdapter::new(store, 3, Duration::from_millis(500));
        let results = adapter.search(&ConstraintSet::unconstrained()).await;
        assert_eq!(results.len(), 3);
    }

    #[tokio::test]
    async fn test_store_error_degrades_to_empty() {
        let adapter = StructuredSearchAdapter::new(
            Arc::new(FailingStore),
            10,
            Duration::from_millis(500),
        );
        assert!(adapter.search(&ConstraintSet::unconstrained()).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_empty() {
        let adapter =
            StructuredSearchAdapter::new(Arc::new(SlowStore), 10, Duration::from_millis(20));
        assert!(adapter.search(&ConstraintSet::unconstrained()).await.is_empty());
    }
}
