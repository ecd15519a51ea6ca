//! Query Engine
//!
//! Per-request pipeline: extract constraints, classify intent, fold the
//! turn into session context, fan out to both retrieval adapters
//! concurrently, then compose the envelope. The two adapters have no data
//! dependency on each other and are awaited jointly so end-to-end latency
//! is bounded by the slower one, not their sum. Dropping the returned
//! future abandons any outstanding collaborator calls.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::compose::HybridComposer;
use crate::config::EngineConfig;
use crate::query::{ConstraintExtractor, Gazetteer, IntentClassifier};
use crate::retrieval::{SemanticSearchAdapter, StructuredSearchAdapter, StructuredStore, VectorStore};
use crate::session::{SessionCache, SessionStore};
use crate::types::{EngineError, Intent, QueryRequest, ResponseEnvelope};

/// Text-generation collaborator. Given the envelope's bullets and
/// metadata, produces the final user-facing prose. Pure formatting
/// consumer — the engine decides what facts it gets, nothing more.
#[async_trait]
pub trait ProseGenerator: Send + Sync {
    async fn phrase(&self, envelope: &ResponseEnvelope) -> Result<String>;
}

pub struct QueryEngine {
    extractor: ConstraintExtractor,
    classifier: IntentClassifier,
    gazetteer: Arc<Gazetteer>,
    sessions: SessionStore,
    structured: Arc<StructuredSearchAdapter>,
    semantic: SemanticSearchAdapter,
    composer: HybridComposer,
    prose: Option<Arc<dyn ProseGenerator>>,
}

impl QueryEngine {
    pub fn new(
        config: EngineConfig,
        structured_store: Arc<dyn StructuredStore>,
        vector_store: Arc<dyn VectorStore>,
        cache: Arc<dyn SessionCache>,
        gazetteer: Gazetteer,
    ) -> Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;

        let gazetteer = Arc::new(gazetteer);
        let structured = Arc::new(StructuredSearchAdapter::new(
            structured_store,
            config.search.structured_limit,
            std::time::Duration::from_millis(config.timeouts.structured_ms),
        ));
        let semantic = SemanticSearchAdapter::new(
            vector_store,
            config.search.semantic_top_k,
            config.search.min_similarity,
            std::time::Duration::from_millis(config.timeouts.semantic_ms),
        );
        let sessions = SessionStore::new(
            cache,
            config.session.ttl(),
            std::time::Duration::from_millis(config.timeouts.cache_ms),
        );
        let composer = HybridComposer::new(
            structured.clone(),
            config.search.relaxation_factors.clone(),
        );

        Ok(Self {
            extractor: ConstraintExtractor::new(gazetteer.clone()),
            classifier: IntentClassifier::new(gazetteer.clone()),
            gazetteer,
            sessions,
            structured,
            semantic,
            composer,
            prose: None,
        })
    }

    pub fn with_prose_generator(mut self, prose: Arc<dyn ProseGenerator>) -> Self {
        self.prose = Some(prose);
        self
    }

    /// Process one conversational turn.
    pub async fn respond(&self, request: QueryRequest) -> Result<ResponseEnvelope> {
        if request.conversation_id.trim().is_empty() {
            return Err(EngineError::EmptyConversationId.into());
        }
        if request.query.trim().is_empty() {
            return Err(EngineError::EmptyQuery.into());
        }
        let start = std::time::Instant::now();

        let extracted = self.extractor.extract(&request.query);
        let prior = self.sessions.load(&request.conversation_id).await;
        let intent = self
            .classifier
            .classify(&request.query, &extracted, prior.as_ref());

        // Session persists the *extracted* constraints; the explicit
        // per-turn override below never touches stored context.
        let merged = self
            .sessions
            .merge_and_save(&request.conversation_id, &extracted, intent)
            .await;

        let effective = match &request.filters {
            Some(filters) => filters.merge_onto(&merged.constraints),
            None => merged.constraints.clone(),
        };

        // Scope semantic search to the named project for factual lookups.
        let scope = match intent {
            Intent::ProjectDetails => self
                .gazetteer
                .projects_in(&request.query)
                .first()
                .map(|p| p.id),
            _ => None,
        };

        let (records, passages) = futures::join!(
            self.structured.search(&effective),
            self.semantic.search(&request.query, scope),
        );

        let envelope = self
            .composer
            .compose(intent, &effective, records, passages)
            .await;

        tracing::info!(
            conversation_id = %request.conversation_id,
            intent = ?envelope.intent,
            confidence = ?envelope.confidence,
            turn = merged.turn_count,
            latency_ms = start.elapsed().as_millis() as u64,
            "turn processed"
        );

        Ok(envelope)
    }

    /// Process a turn and, when a prose collaborator is configured, phrase
    /// the final reply. Phrasing failures degrade to the raw bullets —
    /// the facts still reach the caller.
    pub async fn respond_with_prose(&self, request: QueryRequest) -> Result<(ResponseEnvelope, String)> {
        let envelope = self.respond(request).await?;
        let prose = match &self.prose {
            Some(generator) => match generator.phrase(&envelope).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(error = %e, "prose generation failed, returning raw bullets");
                    envelope.answer.join("\n")
                }
            },
            None => envelope.answer.join("\n"),
        };
        Ok((envelope, prose))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::gazetteer::ProjectRef;
    use crate::retrieval::structured::Predicate;
    use crate::session::InMemorySessionCache;
    use crate::types::{
        CandidateRecord, ConstraintSet, Confidence, PassageResult, PossessionStatus,
        REFUSAL_UNSUPPORTED,
    };
    use anyhow::anyhow;
    use std::time::Duration;
    use uuid::Uuid;

    /// Catalog store that actually applies the predicates.
    struct CatalogStore {
        records: Vec<CandidateRecord>,
    }

    fn matches(record: &CandidateRecord, predicates: &[Predicate]) -> bool {
        predicates.iter().all(|p| match p {
            Predicate::BedroomsIn(set) => set.contains(&record.bedrooms),
            Predicate::PriceAtLeast(min) => record.price >= *min,
            Predicate::PriceAtMost(max) => record.price <= *max,
            Predicate::LocalityIn(set) => set.contains(&record.locality),
            Predicate::PossessionYearAtMost(year) => {
                record.possession_year.map_or(false, |y| y <= *year)
            }
            Predicate::StatusIn(set) => set.contains(&record.status),
            Predicate::AmenitiesContainAll(set) => {
                set.iter().all(|a| record.amenities.contains(a))
            }
        })
    }

    #[async_trait]
    impl StructuredStore for CatalogStore {
        async fn query(
            &self,
            predicates: &[Predicate],
            limit: usize,
        ) -> Result<Vec<CandidateRecord>> {
            Ok(self
                .records
                .iter()
                .filter(|r| matches(r, predicates))
                .take(limit)
                .cloned()
                .collect())
        }
    }

    struct FaqStore(Vec<PassageResult>);

    #[async_trait]
    impl VectorStore for FaqStore {
        async fn similar(
            &self,
            _query: &str,
            _scope: Option<Uuid>,
            _top_k: usize,
        ) -> Result<Vec<PassageResult>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenCache;

    #[async_trait]
    impl SessionCache for BrokenCache {
        async fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(anyhow!("cache down"))
        }
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<()> {
            Err(anyhow!("cache down"))
        }
        async fn delete(&self, _key: &str) -> Result<()> {
            Err(anyhow!("cache down"))
        }
    }

    fn record(
        name: &str,
        price: i64,
        bedrooms: u8,
        locality: &str,
    ) -> CandidateRecord {
        CandidateRecord {
            project_id: Uuid::new_v4(),
            name: name.to_string(),
            price,
            bedrooms,
            locality: locality.to_string(),
            status: PossessionStatus::Ongoing,
            possession_year: Some(2026),
            possession_quarter: Some(3),
            available: true,
            rera_id: Some("PRM/KA/RERA/1251/446".to_string()),
            amenities: vec!["gym".to_string(), "swimming pool".to_string()],
        }
    }

    fn catalog() -> Vec<CandidateRecord> {
        vec![
            record("Serene Meadows", 4_800_000, 2, "Whitefield"),
            record("Lakefront Residency", 5_800_000, 2, "Whitefield"),
            record("Garden Vista", 5_900_000, 3, "Whitefield"),
            record("Hebbal Skyline", 7_200_000, 3, "Hebbal"),
        ]
    }

    fn engine_with(records: Vec<CandidateRecord>) -> QueryEngine {
        QueryEngine::new(
            EngineConfig::default(),
            Arc::new(CatalogStore { records }),
            Arc::new(FaqStore(vec![PassageResult {
                doc_id: Uuid::new_v4(),
                text: "RERA registration gives buyers a legal remedy against handover delays."
                    .to_string(),
                similarity: 0.86,
                project_id: None,
            }])),
            Arc::new(InMemorySessionCache::new()),
            Gazetteer::with_projects(vec![ProjectRef {
                id: Uuid::new_v4(),
                name: "Serene Meadows".to_string(),
            }]),
        )
        .unwrap()
    }

    fn request(conversation: &str, query: &str) -> QueryRequest {
        QueryRequest {
            conversation_id: conversation.to_string(),
            query: query.to_string(),
            filters: None,
        }
    }

    #[tokio::test]
    async fn test_strict_match_is_high_confidence() {
        let engine = engine_with(catalog());
        let envelope = engine
            .respond(request("c1", "2BHK under 50L in Whitefield"))
            .await
            .unwrap();

        assert_eq!(envelope.intent, Intent::PropertySearch);
        assert_eq!(envelope.confidence, Confidence::High);
        assert_eq!(envelope.projects.len(), 1);
        assert_eq!(envelope.projects[0].name, "Serene Meadows");
        assert!(!envelope.is_refusal);
        assert!(envelope.answer.len() >= 3 && envelope.answer.len() <= 5);
    }

    #[tokio::test]
    async fn test_relaxation_scenario_is_medium_with_disclosure() {
        // Only a 5.8M 2BHK exists: 1.0x (5.0M) and 1.1x (5.5M) miss,
        // 1.2x (6.0M) hits.
        let engine = engine_with(vec![record("Lakefront Residency", 5_800_000, 2, "Whitefield")]);
        let envelope = engine
            .respond(request("c1", "2BHK under 50L in Whitefield"))
            .await
            .unwrap();

        assert_eq!(envelope.confidence, Confidence::Medium);
        assert!(!envelope.is_refusal);
        assert!(envelope
            .answer
            .iter()
            .any(|b| b.contains("above your stated budget")));
    }

    #[tokio::test]
    async fn test_follow_up_turn_reuses_context() {
        let engine = engine_with(catalog());
        engine
            .respond(request("c7", "show me 2BHK in Whitefield under 60L"))
            .await
            .unwrap();

        let envelope = engine
            .respond(request("c7", "what about 3BHK?"))
            .await
            .unwrap();

        assert_eq!(envelope.intent, Intent::PropertySearch);
        assert_eq!(envelope.constraints.bedrooms, [3].into_iter().collect());
        assert!(envelope.constraints.localities.contains("Whitefield"));
        assert_eq!(envelope.projects.len(), 1);
        assert_eq!(envelope.projects[0].name, "Garden Vista");
    }

    #[tokio::test]
    async fn test_small_talk_is_unsupported_refusal() {
        let engine = engine_with(catalog());
        let envelope = engine
            .respond(request("c1", "who won the cricket match yesterday?"))
            .await
            .unwrap();

        assert_eq!(envelope.intent, Intent::Unsupported);
        assert!(envelope.is_refusal);
        assert_eq!(
            envelope.refusal_reason.as_deref(),
            Some(REFUSAL_UNSUPPORTED)
        );
        assert_eq!(envelope.answer.len(), 1);
    }

    #[tokio::test]
    async fn test_broken_cache_still_answers() {
        let engine = QueryEngine::new(
            EngineConfig::default(),
            Arc::new(CatalogStore { records: catalog() }),
            Arc::new(FaqStore(vec![])),
            Arc::new(BrokenCache),
            Gazetteer::new(),
        )
        .unwrap();

        let envelope = engine
            .respond(request("c1", "2BHK under 50L in Whitefield"))
            .await
            .unwrap();
        assert_eq!(envelope.confidence, Confidence::High);
        assert!(!envelope.is_refusal);
    }

    #[tokio::test]
    async fn test_explicit_filters_bind_for_the_turn_only() {
        let engine = engine_with(catalog());

        let mut override_filters = ConstraintSet::unconstrained();
        override_filters.bedrooms.insert(3);
        let first = engine
            .respond(QueryRequest {
                conversation_id: "c9".to_string(),
                query: "2BHK in Whitefield under 60L".to_string(),
                filters: Some(override_filters),
            })
            .await
            .unwrap();
        // Override wins for this turn.
        assert_eq!(first.constraints.bedrooms, [3].into_iter().collect());
        assert_eq!(first.projects[0].name, "Garden Vista");

        // The persisted context kept the extracted 2BHK.
        let second = engine
            .respond(request("c9", "and with a swimming pool?"))
            .await
            .unwrap();
        assert_eq!(second.constraints.bedrooms, [2].into_iter().collect());
    }

    #[tokio::test]
    async fn test_sales_conversation_uses_semantic_passages() {
        let engine = engine_with(vec![]);
        let envelope = engine
            .respond(request("c1", "is buying an under construction flat risky?"))
            .await
            .unwrap();

        assert_eq!(envelope.intent, Intent::SalesConversation);
        assert_eq!(envelope.confidence, Confidence::Medium);
        assert!(envelope.answer.iter().any(|b| b.contains("RERA")));
    }

    #[tokio::test]
    async fn test_boundary_rejects_empty_input() {
        let engine = engine_with(catalog());
        assert!(engine.respond(request("", "2BHK")).await.is_err());
        assert!(engine.respond(request("c1", "   ")).await.is_err());
    }

    #[tokio::test]
    async fn test_prose_fallback_joins_bullets() {
        struct FailingProse;
        #[async_trait]
        impl ProseGenerator for FailingProse {
            async fn phrase(&self, _envelope: &ResponseEnvelope) -> Result<String> {
                Err(anyhow!("llm offline"))
            }
        }

        let engine = engine_with(catalog()).with_prose_generator(Arc::new(FailingProse));
        let (envelope, prose) = engine
            .respond_with_prose(request("c1", "2BHK under 50L in Whitefield"))
            .await
            .unwrap();
        assert_eq!(prose, envelope.answer.join("\n"));
    }
}
