//! Locality, amenity and project-name gazetteer.
//!
//! Lexical entity lookup over a fixed vocabulary. Matching is
//! longest-alias-first and a matched span is consumed, so "Electronic City
//! Phase 1" never also matches "Electronic City".

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A project the engine knows about, used for project-details and
/// comparison intent resolution and for scoping semantic search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectRef {
    pub id: Uuid,
    pub name: String,
}

pub struct Gazetteer {
    /// (lowercased alias, canonical name), sorted longest alias first.
    localities: Vec<(String, String)>,
    amenities: Vec<(String, String)>,
    projects: Vec<ProjectRef>,
}

const DEFAULT_LOCALITIES: &[(&str, &str)] = &[
    ("electronic city phase 1", "Electronic City Phase 1"),
    ("electronic city phase 2", "Electronic City Phase 2"),
    ("electronic city", "Electronic City"),
    ("e-city", "Electronic City"),
    ("whitefield", "Whitefield"),
    ("sarjapur road", "Sarjapur Road"),
    ("sarjapur", "Sarjapur Road"),
    ("hsr layout", "HSR Layout"),
    ("hsr", "HSR Layout"),
    ("koramangala", "Koramangala"),
    ("indiranagar", "Indiranagar"),
    ("jp nagar", "JP Nagar"),
    ("jayanagar", "Jayanagar"),
    ("hebbal", "Hebbal"),
    ("yelahanka", "Yelahanka"),
    ("marathahalli", "Marathahalli"),
    ("bellandur", "Bellandur"),
    ("varthur", "Varthur"),
    ("bannerghatta road", "Bannerghatta Road"),
    ("bannerghatta", "Bannerghatta Road"),
    ("kanakapura road", "Kanakapura Road"),
    ("kanakapura", "Kanakapura Road"),
    ("devanahalli", "Devanahalli"),
    ("kr puram", "KR Puram"),
    ("thanisandra", "Thanisandra"),
    ("rajajinagar", "Rajajinagar"),
];

const DEFAULT_AMENITIES: &[(&str, &str)] = &[
    ("swimming pool", "swimming pool"),
    ("pool", "swimming pool"),
    ("gymnasium", "gym"),
    ("gym", "gym"),
    ("club house", "clubhouse"),
    ("clubhouse", "clubhouse"),
    ("kids play area", "play area"),
    ("children's play area", "play area"),
    ("play area", "play area"),
    ("jogging track", "jogging track"),
    ("tennis court", "tennis court"),
    ("badminton court", "badminton court"),
    ("power backup", "power backup"),
    ("gated community", "gated community"),
    ("covered parking", "covered parking"),
    ("security", "24x7 security"),
];

impl Gazetteer {
    /// Gazetteer with the built-in locality/amenity vocabulary and no
    /// known projects.
    pub fn new() -> Self {
        Self::with_projects(Vec::new())
    }

    pub fn with_projects(projects: Vec<ProjectRef>) -> Self {
        let mut localities: Vec<(String, String)> = DEFAULT_LOCALITIES
            .iter()
            .map(|(a, c)| (a.to_string(), c.to_string()))
            .collect();
        localities.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        let mut amenities: Vec<(String, String)> = DEFAULT_AMENITIES
            .iter()
            .map(|(a, c)| (a.to_string(), c.to_string()))
            .collect();
        amenities.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Self {
            localities,
            amenities,
            projects,
        }
    }

    pub fn localities_in(&self, text: &str) -> Vec<String> {
        Self::consume_matches(&text.to_lowercase(), &self.localities)
    }

    pub fn amenities_in(&self, text: &str) -> Vec<String> {
        Self::consume_matches(&text.to_lowercase(), &self.amenities)
    }

    /// Known projects mentioned in the text, in catalog order.
    pub fn projects_in(&self, text: &str) -> Vec<ProjectRef> {
        let lower = text.to_lowercase();
        self.projects
            .iter()
            .filter(|p| lower.contains(&p.name.to_lowercase()))
            .cloned()
            .collect()
    }

    pub fn knows_projects(&self) -> bool {
        !self.projects.is_empty()
    }

    /// Longest-alias-first scan. Each matched span is blanked out of the
    /// working copy so shorter aliases cannot re-match inside it.
    fn consume_matches(lower: &str, table: &[(String, String)]) -> Vec<String> {
        let mut working = lower.to_string();
        let mut found = Vec::new();
        for (alias, canonical) in table {
            if let Some(pos) = working.find(alias.as_str()) {
                if !found.contains(canonical) {
                    found.push(canonical.clone());
                }
                let blank = " ".repeat(alias.len());
                working.replace_range(pos..pos + alias.len(), &blank);
            }
        }
        found
    }
}

impl Default for Gazetteer {
    fn default() -> Self {
        Self::new()
    }
}
