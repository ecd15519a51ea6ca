use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub search: SearchConfig,
    pub session: SessionConfig,
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum candidate records returned by the structured adapter.
    pub structured_limit: usize,
    /// Passages requested from the vector collaborator.
    pub semantic_top_k: usize,
    /// Passages scoring below this cosine similarity are discarded entirely,
    /// never returned with a low score.
    pub min_similarity: f32,
    /// Budget ceiling multipliers tried in order when a property search with
    /// a stated budget comes back empty. Stops at the first factor that
    /// yields results.
    pub relaxation_factors: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Inactivity window after which conversation context expires. Expiry is
    /// intentional information loss, not a bug.
    pub ttl_minutes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    pub structured_ms: u64,
    pub semantic_ms: u64,
    pub cache_ms: u64,
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_minutes * 60)
    }
}

impl EngineConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.search.structured_limit == 0 {
            return Err("search.structured_limit must be > 0".into());
        }
        if self.search.semantic_top_k == 0 {
            return Err("search.semantic_top_k must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.search.min_similarity) {
            return Err("search.min_similarity must be in [0.0, 1.0]".into());
        }
        if self.search.relaxation_factors.iter().any(|f| *f <= 1.0) {
            return Err("search.relaxation_factors must all be > 1.0".into());
        }
        if self
            .search
            .relaxation_factors
            .windows(2)
            .any(|w| w[0] >= w[1])
        {
            return Err("search.relaxation_factors must be strictly increasing".into());
        }
        if self.session.ttl_minutes == 0 {
            return Err("session.ttl_minutes must be > 0".into());
        }
        if self.timeouts.structured_ms == 0
            || self.timeouts.semantic_ms == 0
            || self.timeouts.cache_ms == 0
        {
            return Err("timeouts must all be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig {
                structured_limit: 10,
                semantic_top_k: 5,
                min_similarity: 0.75,
                relaxation_factors: vec![1.1, 1.2, 1.3],
            },
            session: SessionConfig { ttl_minutes: 90 },
            timeouts: TimeoutConfig {
                structured_ms: 2_000,
                semantic_ms: 2_000,
                cache_ms: 500,
            },
        }
    }
}
