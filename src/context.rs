//! Grounding context assembly.
//!
//! Gathers curated locations and approved knowledge for a message before it
//! reaches the model. Assembly never fails: every tier degrades to the next
//! one, and the worst case is an empty context.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::knowledge::KnowledgeStore;
use crate::places::{Place, PlaceSearch};
use crate::store::{Database, KnowledgeItem, StoredLocation};

const LOCATION_LIMIT: usize = 5;
const EXTERNAL_LIMIT: usize = 3;

/// Multi-character stopwords removed before tokenizing.
const STOP_PHRASES: &[&str] = &["什麼", "怎麼", "哪裡", "哪邊", "可以", "有沒有", "請問"];

/// Single characters treated as token separators.
const STOP_CHARS: &[char] = &[
    '的', '有', '嗎', '呢', '啊', '喔', '了', '在', '去', '到', '跟', '和', '與', '或', '我',
    '你', '想', '要', '是',
];

/// Search keywords from a free-text message: stop phrases removed, split on
/// punctuation and function characters, 2–8 character segments kept.
pub fn keyword_tokens(message: &str) -> Vec<String> {
    let mut cleaned = message.to_string();
    for phrase in STOP_PHRASES {
        cleaned = cleaned.replace(phrase, " ");
    }
    let mut tokens: Vec<String> = Vec::new();
    for part in cleaned.split(|c: char| {
        c.is_whitespace() || c.is_ascii_punctuation() || "，。？！、：；「」".contains(c)
            || STOP_CHARS.contains(&c)
    }) {
        let part = part.trim();
        let chars = part.chars().count();
        if !(2..=8).contains(&chars) {
            continue;
        }
        let token = part.to_string();
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.truncate(4);
    tokens
}

/// Everything gathered for one turn.
#[derive(Debug, Clone, Default)]
pub struct GroundingContext {
    pub locations: Vec<Place>,
    pub knowledge: Vec<KnowledgeItem>,
}

impl GroundingContext {
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty() && self.knowledge.is_empty()
    }
}

fn to_place(location: StoredLocation) -> Place {
    Place {
        id: location.id,
        name: location.name,
        address: location.address,
        lat: location.lat,
        lng: location.lng,
        rating: None,
        is_external: false,
    }
}

pub struct ContextAssembler {
    db: Arc<dyn Database>,
    knowledge: Arc<KnowledgeStore>,
    places: Option<Arc<dyn PlaceSearch>>,
}

impl ContextAssembler {
    pub fn new(
        db: Arc<dyn Database>,
        knowledge: Arc<KnowledgeStore>,
        places: Option<Arc<dyn PlaceSearch>>,
    ) -> Self {
        Self {
            db,
            knowledge,
            places,
        }
    }

    /// Gather grounding for a message. Infallible by construction.
    pub async fn assemble(&self, message: &str) -> GroundingContext {
        let (locations, knowledge) = tokio::join!(
            self.lookup_locations(message),
            self.knowledge.grounding_snippets(message)
        );
        let context = GroundingContext {
            locations,
            knowledge,
        };
        debug!(
            locations = context.locations.len(),
            knowledge = context.knowledge.len(),
            "Grounding context assembled"
        );
        context
    }

    /// Map a free-text endpoint to its curated location name. Walks the
    /// curated tiers only; distance lookups fall back to the raw text when
    /// nothing matches.
    pub async fn resolve_place_name(&self, text: &str) -> Option<String> {
        match self.db.find_locations(text, 1).await {
            Ok(found) if !found.is_empty() => {
                return found.into_iter().next().map(|l| l.name);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Endpoint substring lookup failed"),
        }

        let tokens = keyword_tokens(text);
        if tokens.len() >= 2 {
            match self.db.find_locations_by_keywords(&tokens, 1).await {
                Ok(found) if !found.is_empty() => {
                    return found.into_iter().next().map(|l| l.name);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Endpoint keyword lookup failed"),
            }
        }
        None
    }

    /// Tiered lookup: curated substring match, then curated keyword match,
    /// then external search as the last resort.
    async fn lookup_locations(&self, message: &str) -> Vec<Place> {
        match self.db.find_locations(message, LOCATION_LIMIT).await {
            Ok(found) if !found.is_empty() => {
                return found.into_iter().map(to_place).collect();
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Location substring lookup failed"),
        }

        let tokens = keyword_tokens(message);
        if tokens.len() >= 2 {
            match self
                .db
                .find_locations_by_keywords(&tokens, LOCATION_LIMIT)
                .await
            {
                Ok(found) if !found.is_empty() => {
                    return found.into_iter().map(to_place).collect();
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Location keyword lookup failed"),
            }
        }

        let Some(places) = &self.places else {
            return Vec::new();
        };
        match places.search(message, EXTERNAL_LIMIT).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, "External place search failed");
                Vec::new()
            }
        }
    }
}
