//! Unified `Database` trait — single async interface for all persistence.
//!
//! Dialog states, the append-only turn log, relationship profiles,
//! knowledge items, curated locations, flow-completion domain rows, and the
//! distance cache all go through this trait so tests can run on an
//! in-memory database.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dialog::{CollectedData, FlowType, IdentityData, MerchantData, TravelerData};
use crate::error::DatabaseError;
use crate::relationship::Stage;

/// Role of one entry in the turn log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
    /// The front end reported a location pick; logged, never interpreted.
    LocationSelected,
}

impl TurnRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::LocationSelected => "location_selected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "assistant" => Self::Assistant,
            "location_selected" => Self::LocationSelected,
            _ => Self::User,
        }
    }
}

/// One persisted message. Append-only; never mutated after creation.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub id: String,
    pub session_id: String,
    pub role: TurnRole,
    pub content: String,
    /// Structured grounding context attached to assistant turns.
    pub context: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// The active dialog record for a (session, user) pair.
#[derive(Debug, Clone)]
pub struct DialogStateRow {
    pub session_id: String,
    pub user_id: Option<String>,
    pub flow: FlowType,
    pub step: String,
    pub collected: CollectedData,
    pub is_complete: bool,
    pub rounds: i64,
    pub last_depth: f64,
    pub last_stage: Stage,
    pub updated_at: DateTime<Utc>,
}

impl DialogStateRow {
    pub fn new(session_id: &str, user_id: Option<&str>, flow: FlowType, step: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            user_id: user_id.map(str::to_string),
            flow,
            step: step.to_string(),
            collected: CollectedData::new_for(flow),
            is_complete: false,
            rounds: 0,
            last_depth: 0.0,
            last_stage: Stage::Initial,
            updated_at: Utc::now(),
        }
    }
}

/// Slow-moving relationship summary keyed by user id (or session id for
/// anonymous sessions). Created on first score computation, never deleted.
#[derive(Debug, Clone)]
pub struct RelationshipProfileRow {
    pub user_key: String,
    pub total_rounds: i64,
    pub identity: Option<String>,
    pub region: Option<String>,
    pub interests: Vec<String>,
    pub visit_period: Option<String>,
    pub planned_period: Option<String>,
    pub revisit_count: i64,
    pub last_depth: f64,
    pub last_stage: Stage,
    pub updated_at: DateTime<Utc>,
}

impl RelationshipProfileRow {
    pub fn new(user_key: &str) -> Self {
        Self {
            user_key: user_key.to_string(),
            total_rounds: 0,
            identity: None,
            region: None,
            interests: Vec::new(),
            visit_period: None,
            planned_period: None,
            revisit_count: 0,
            last_depth: 0.0,
            last_stage: Stage::Initial,
            updated_at: Utc::now(),
        }
    }
}

/// Category of a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeCategory {
    Food,
    Spot,
    Story,
    General,
}

impl KnowledgeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Spot => "spot",
            Self::Story => "story",
            Self::General => "general",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "food" => Self::Food,
            "spot" => Self::Spot,
            "story" => Self::Story,
            _ => Self::General,
        }
    }
}

/// Moderation status of a knowledge item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "approved" => Self::Approved,
            "rejected" => Self::Rejected,
            _ => Self::Pending,
        }
    }
}

/// A contributed or curated fact. Content is immutable; only the status
/// changes, via moderation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub id: String,
    pub text: String,
    pub category: KnowledgeCategory,
    pub status: ApprovalStatus,
    /// 0.0–1.0, used when the fact is rendered as a remembered fact.
    pub confidence: f64,
}

/// A curated location row.
#[derive(Debug, Clone)]
pub struct StoredLocation {
    pub id: String,
    pub name: String,
    pub address: String,
    pub lat: f64,
    pub lng: f64,
    pub category: Option<String>,
}

/// A cached distance lookup.
#[derive(Debug, Clone)]
pub struct CachedDistance {
    pub origin: String,
    pub destination: String,
    pub mode: String,
    pub distance_text: String,
    pub duration_text: String,
    pub distance_meters: i64,
    pub duration_seconds: i64,
    pub cached_at: DateTime<Utc>,
}

/// Backend-agnostic database trait.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Dialog states ───────────────────────────────────────────────

    /// Latest dialog state for a (session, user) pair, complete or not.
    async fn get_dialog_state(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<DialogStateRow>, DatabaseError>;

    /// Insert or replace the dialog state for its (session, user) pair.
    async fn upsert_dialog_state(&self, row: &DialogStateRow) -> Result<(), DatabaseError>;

    // ── Turn log ────────────────────────────────────────────────────

    /// Append one turn; returns the generated id.
    async fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<String, DatabaseError>;

    /// Turns for a session, oldest first, up to `limit`.
    async fn list_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, DatabaseError>;

    // ── Relationship profiles ───────────────────────────────────────

    async fn get_profile(
        &self,
        user_key: &str,
    ) -> Result<Option<RelationshipProfileRow>, DatabaseError>;

    async fn upsert_profile(&self, row: &RelationshipProfileRow) -> Result<(), DatabaseError>;

    /// Bump round counters on the (session, user) dialog state row and on
    /// the profile, creating the profile if absent. Called once per
    /// successful turn.
    async fn increment_rounds(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        user_key: &str,
    ) -> Result<(), DatabaseError>;

    // ── Knowledge items ─────────────────────────────────────────────

    /// Substring search over items with the given status, newest first.
    async fn search_knowledge(
        &self,
        query: &str,
        status: ApprovalStatus,
        limit: usize,
    ) -> Result<Vec<KnowledgeItem>, DatabaseError>;

    async fn insert_knowledge_item(
        &self,
        text: &str,
        category: KnowledgeCategory,
        status: ApprovalStatus,
        confidence: f64,
    ) -> Result<String, DatabaseError>;

    // ── Locations ───────────────────────────────────────────────────

    /// Exact/substring match against names and addresses.
    async fn find_locations(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoredLocation>, DatabaseError>;

    /// AND-of-LIKE keyword search; every token must match name or address.
    async fn find_locations_by_keywords(
        &self,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<StoredLocation>, DatabaseError>;

    async fn insert_location(&self, location: &StoredLocation) -> Result<(), DatabaseError>;

    // ── Flow-completion domain writes ───────────────────────────────

    async fn save_merchant_setup(
        &self,
        session_id: &str,
        data: &MerchantData,
    ) -> Result<(), DatabaseError>;

    async fn save_travel_memory(
        &self,
        session_id: &str,
        user_key: &str,
        data: &TravelerData,
    ) -> Result<(), DatabaseError>;

    /// Merge identity answers into the relationship profile.
    async fn save_identity_profile(
        &self,
        user_key: &str,
        data: &IdentityData,
    ) -> Result<(), DatabaseError>;

    // ── Distance cache ──────────────────────────────────────────────

    /// A cached distance no older than `max_age`, if any.
    async fn get_cached_distance(
        &self,
        origin: &str,
        destination: &str,
        mode: &str,
        max_age: Duration,
    ) -> Result<Option<CachedDistance>, DatabaseError>;

    async fn put_cached_distance(&self, entry: &CachedDistance) -> Result<(), DatabaseError>;
}
