//! Community knowledge: retrieval for grounding and fire-and-forget capture.
//!
//! Only approved items are ever surfaced to the model. Capture runs off the
//! request path; new items land as pending and wait for moderation.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::context::keyword_tokens;
use crate::store::{ApprovalStatus, Database, KnowledgeCategory, KnowledgeItem};

const SNIPPET_LIMIT: usize = 5;

/// Signals that a message is worth capturing as local knowledge.
const VALUE_SIGNALS: &[&str] = &[
    "推薦", "好吃", "必吃", "老店", "秘境", "私房", "在地人才知道", "以前", "傳統", "故事",
];

const FOOD_SIGNALS: &[&str] = &["吃", "餐", "小吃", "海鮮", "冰", "美食", "料理"];
const SPOT_SIGNALS: &[&str] = &["景點", "沙灘", "海邊", "玄武岩", "燈塔", "秘境", "步道"];
const STORY_SIGNALS: &[&str] = &["故事", "以前", "傳說", "歷史", "老一輩"];

pub struct KnowledgeStore {
    db: Arc<dyn Database>,
}

impl KnowledgeStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Approved snippets relevant to a message, deduplicated across keyword
    /// queries. Retrieval failures degrade to an empty list: grounding is
    /// optional, answering is not.
    pub async fn grounding_snippets(&self, message: &str) -> Vec<KnowledgeItem> {
        let mut tokens = keyword_tokens(message);
        if tokens.is_empty() {
            tokens.push(message.trim().to_string());
        }

        let mut items: Vec<KnowledgeItem> = Vec::new();
        for token in &tokens {
            match self
                .db
                .search_knowledge(token, ApprovalStatus::Approved, SNIPPET_LIMIT)
                .await
            {
                Ok(found) => {
                    for item in found {
                        if !items.iter().any(|existing| existing.id == item.id) {
                            items.push(item);
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, %token, "Knowledge lookup failed; continuing without it");
                    return Vec::new();
                }
            }
            if items.len() >= SNIPPET_LIMIT {
                break;
            }
        }
        items.truncate(SNIPPET_LIMIT);
        debug!(count = items.len(), "Knowledge snippets assembled");
        items
    }

    /// Whether a message carries capturable local knowledge.
    pub fn looks_valuable(message: &str) -> bool {
        let trimmed = message.trim();
        if trimmed.chars().count() < 12 {
            return false;
        }
        // Questions ask for knowledge, they don't contribute it.
        if trimmed.ends_with('?') || trimmed.ends_with('？') || trimmed.contains('嗎') {
            return false;
        }
        VALUE_SIGNALS.iter().any(|s| trimmed.contains(s))
    }

    pub fn categorize(text: &str) -> KnowledgeCategory {
        if FOOD_SIGNALS.iter().any(|s| text.contains(s)) {
            KnowledgeCategory::Food
        } else if SPOT_SIGNALS.iter().any(|s| text.contains(s)) {
            KnowledgeCategory::Spot
        } else if STORY_SIGNALS.iter().any(|s| text.contains(s)) {
            KnowledgeCategory::Story
        } else {
            KnowledgeCategory::General
        }
    }

    /// Capture a contribution off the request path. A failed insert is
    /// logged and dropped; it never affects the reply.
    pub fn spawn_capture(&self, message: &str, from_local: bool) {
        if !Self::looks_valuable(message) {
            return;
        }
        let db = Arc::clone(&self.db);
        let text = message.trim().to_string();
        let category = Self::categorize(&text);
        let confidence = if from_local { 0.7 } else { 0.5 };
        tokio::spawn(async move {
            match db
                .insert_knowledge_item(&text, category, ApprovalStatus::Pending, confidence)
                .await
            {
                Ok(id) => debug!(%id, "Knowledge contribution captured"),
                Err(e) => warn!(error = %e, "Knowledge capture failed"),
            }
        });
    }
}
