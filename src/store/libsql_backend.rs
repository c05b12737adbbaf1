//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases; the in-memory constructor
//! backs the test suite.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::info;
use uuid::Uuid;

use crate::dialog::{CollectedData, FlowType, IdentityData, MerchantData, TravelerData};
use crate::error::DatabaseError;
use crate::relationship::Stage;
use crate::store::migrations;
use crate::store::traits::{
    ApprovalStatus, CachedDistance, Database, DialogStateRow, KnowledgeCategory, KnowledgeItem,
    RelationshipProfileRow, StoredLocation, TurnRecord, TurnRole,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to a libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// LIKE pattern for a substring match.
fn like(query: &str) -> String {
    format!("%{}%", query.trim())
}

fn row_to_dialog_state(row: &libsql::Row) -> Result<DialogStateRow, DatabaseError> {
    let session_id: String = row
        .get(0)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let user_id: String = row
        .get(1)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let flow_str: String = row
        .get(2)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let step: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let collected_json: String = row
        .get(4)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let is_complete: i64 = row
        .get(5)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let rounds: i64 = row
        .get(6)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let last_depth: f64 = row
        .get(7)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let stage_str: String = row
        .get(8)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let updated_str: String = row
        .get(9)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

    let collected: CollectedData = serde_json::from_str(&collected_json)
        .map_err(|e| DatabaseError::Serialization(format!("collected data: {e}")))?;

    Ok(DialogStateRow {
        session_id,
        user_id: if user_id.is_empty() { None } else { Some(user_id) },
        flow: FlowType::parse(&flow_str),
        step,
        collected,
        is_complete: is_complete != 0,
        rounds,
        last_depth,
        last_stage: Stage::parse(&stage_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_profile(row: &libsql::Row) -> Result<RelationshipProfileRow, DatabaseError> {
    let interests_json: String = row
        .get(3)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let interests: Vec<String> = serde_json::from_str(&interests_json).unwrap_or_default();
    let stage_str: String = row
        .get(9)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;
    let updated_str: String = row
        .get(10)
        .map_err(|e| DatabaseError::Query(e.to_string()))?;

    Ok(RelationshipProfileRow {
        user_key: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
        total_rounds: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
        identity: row.get(2).ok(),
        interests,
        region: row.get(4).ok(),
        visit_period: row.get(5).ok(),
        planned_period: row.get(6).ok(),
        revisit_count: row.get(7).map_err(|e| DatabaseError::Query(e.to_string()))?,
        last_depth: row.get(8).map_err(|e| DatabaseError::Query(e.to_string()))?,
        last_stage: Stage::parse(&stage_str),
        updated_at: parse_datetime(&updated_str),
    })
}

const PROFILE_COLUMNS: &str = "user_key, total_rounds, identity, interests, region, \
     visit_period, planned_period, revisit_count, last_depth, last_stage, updated_at";

const DIALOG_COLUMNS: &str = "session_id, user_id, flow, step, collected, is_complete, \
     rounds, last_depth, last_stage, updated_at";

const LOCATION_COLUMNS: &str = "id, name, address, lat, lng, category";

fn row_to_location(row: &libsql::Row) -> Result<StoredLocation, DatabaseError> {
    Ok(StoredLocation {
        id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
        name: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
        address: row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?,
        lat: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
        lng: row.get(4).map_err(|e| DatabaseError::Query(e.to_string()))?,
        category: row.get(5).ok(),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Dialog states ───────────────────────────────────────────────

    async fn get_dialog_state(
        &self,
        session_id: &str,
        user_id: Option<&str>,
    ) -> Result<Option<DialogStateRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {DIALOG_COLUMNS} FROM dialog_states \
                     WHERE session_id = ?1 AND user_id = ?2 \
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![session_id, user_id.unwrap_or("")],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_dialog_state: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_dialog_state(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_dialog_state(&self, row: &DialogStateRow) -> Result<(), DatabaseError> {
        let collected_json = serde_json::to_string(&row.collected)
            .map_err(|e| DatabaseError::Serialization(format!("collected data: {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO dialog_states \
                 (session_id, user_id, flow, step, collected, is_complete, rounds, \
                  last_depth, last_stage, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
                 ON CONFLICT(session_id, user_id) DO UPDATE SET \
                  flow = excluded.flow, step = excluded.step, \
                  collected = excluded.collected, is_complete = excluded.is_complete, \
                  last_depth = excluded.last_depth, last_stage = excluded.last_stage, \
                  updated_at = excluded.updated_at",
                params![
                    row.session_id.as_str(),
                    row.user_id.as_deref().unwrap_or(""),
                    row.flow.as_str(),
                    row.step.as_str(),
                    collected_json,
                    row.is_complete as i64,
                    row.rounds,
                    row.last_depth,
                    row.last_stage.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_dialog_state: {e}")))?;
        Ok(())
    }

    // ── Turn log ────────────────────────────────────────────────────

    async fn append_turn(
        &self,
        session_id: &str,
        role: TurnRole,
        content: &str,
        context: Option<&serde_json::Value>,
    ) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let context_json = context.map(|v| v.to_string());
        self.conn()
            .execute(
                "INSERT INTO turns (id, session_id, role, content, context, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    session_id,
                    role.as_str(),
                    content,
                    opt_text(context_json.as_deref()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_turn: {e}")))?;
        Ok(id)
    }

    async fn list_turns(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<TurnRecord>, DatabaseError> {
        // Take the most recent `limit` rows, then restore arrival order.
        let mut rows = self
            .conn()
            .query(
                "SELECT id, session_id, role, content, context, created_at FROM turns \
                 WHERE session_id = ?1 ORDER BY created_at DESC, rowid DESC LIMIT ?2",
                params![session_id, limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_turns: {e}")))?;

        let mut turns = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let role_str: String = row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?;
            let context_str: Option<String> = row.get(4).ok();
            let created_str: String =
                row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?;
            turns.push(TurnRecord {
                id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
                session_id: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
                role: TurnRole::parse(&role_str),
                content: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
                context: context_str.and_then(|s| serde_json::from_str(&s).ok()),
                created_at: parse_datetime(&created_str),
            });
        }
        turns.reverse();
        Ok(turns)
    }

    // ── Relationship profiles ───────────────────────────────────────

    async fn get_profile(
        &self,
        user_key: &str,
    ) -> Result<Option<RelationshipProfileRow>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PROFILE_COLUMNS} FROM relationship_profiles WHERE user_key = ?1"
                ),
                params![user_key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_profile: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            Some(row) => Ok(Some(row_to_profile(&row)?)),
            None => Ok(None),
        }
    }

    async fn upsert_profile(&self, row: &RelationshipProfileRow) -> Result<(), DatabaseError> {
        let interests_json = serde_json::to_string(&row.interests)
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?;
        self.conn()
            .execute(
                "INSERT INTO relationship_profiles \
                 (user_key, total_rounds, identity, interests, region, visit_period, \
                  planned_period, revisit_count, last_depth, last_stage, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
                 ON CONFLICT(user_key) DO UPDATE SET \
                  total_rounds = excluded.total_rounds, identity = excluded.identity, \
                  interests = excluded.interests, region = excluded.region, \
                  visit_period = excluded.visit_period, \
                  planned_period = excluded.planned_period, \
                  revisit_count = excluded.revisit_count, \
                  last_depth = excluded.last_depth, last_stage = excluded.last_stage, \
                  updated_at = excluded.updated_at",
                params![
                    row.user_key.as_str(),
                    row.total_rounds,
                    opt_text(row.identity.as_deref()),
                    interests_json,
                    opt_text(row.region.as_deref()),
                    opt_text(row.visit_period.as_deref()),
                    opt_text(row.planned_period.as_deref()),
                    row.revisit_count,
                    row.last_depth,
                    row.last_stage.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_profile: {e}")))?;
        Ok(())
    }

    async fn increment_rounds(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        user_key: &str,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE dialog_states SET rounds = rounds + 1, updated_at = ?2 \
                 WHERE session_id = ?1 AND user_id = ?3",
                params![session_id, now.as_str(), user_id.unwrap_or("")],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_rounds (dialog): {e}")))?;

        self.conn()
            .execute(
                "INSERT INTO relationship_profiles (user_key, total_rounds, updated_at) \
                 VALUES (?1, 1, ?2) \
                 ON CONFLICT(user_key) DO UPDATE SET \
                  total_rounds = total_rounds + 1, updated_at = ?2",
                params![user_key, now.as_str()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("increment_rounds (profile): {e}")))?;
        Ok(())
    }

    // ── Knowledge items ─────────────────────────────────────────────

    async fn search_knowledge(
        &self,
        query: &str,
        status: ApprovalStatus,
        limit: usize,
    ) -> Result<Vec<KnowledgeItem>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT id, text, category, status, confidence FROM knowledge_items \
                 WHERE status = ?1 AND text LIKE ?2 \
                 ORDER BY created_at DESC LIMIT ?3",
                params![status.as_str(), like(query), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("search_knowledge: {e}")))?;

        let mut items = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            let category_str: String =
                row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?;
            let status_str: String =
                row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?;
            items.push(KnowledgeItem {
                id: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
                text: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
                category: KnowledgeCategory::parse(&category_str),
                status: ApprovalStatus::parse(&status_str),
                confidence: row.get(4).map_err(|e| DatabaseError::Query(e.to_string()))?,
            });
        }
        Ok(items)
    }

    async fn insert_knowledge_item(
        &self,
        text: &str,
        category: KnowledgeCategory,
        status: ApprovalStatus,
        confidence: f64,
    ) -> Result<String, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO knowledge_items (id, text, category, status, confidence, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.as_str(),
                    text,
                    category.as_str(),
                    status.as_str(),
                    confidence,
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_knowledge_item: {e}")))?;
        Ok(id)
    }

    // ── Locations ───────────────────────────────────────────────────

    async fn find_locations(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoredLocation>, DatabaseError> {
        // Matches both ways: the query names a location, or the query text
        // contains a stored location name.
        let pattern = like(query);
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LOCATION_COLUMNS} FROM locations \
                     WHERE name LIKE ?1 OR address LIKE ?1 \
                        OR ?2 LIKE '%' || name || '%' \
                     LIMIT ?3"
                ),
                params![pattern, query.trim(), limit as i64],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_locations: {e}")))?;

        let mut locations = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            locations.push(row_to_location(&row)?);
        }
        Ok(locations)
    }

    async fn find_locations_by_keywords(
        &self,
        tokens: &[String],
        limit: usize,
    ) -> Result<Vec<StoredLocation>, DatabaseError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }
        // Fixed four-slot AND-of-LIKE; unused slots match everything.
        let mut patterns = ["%".to_string(), "%".into(), "%".into(), "%".into()];
        for (slot, token) in patterns.iter_mut().zip(tokens.iter()) {
            *slot = like(token);
        }
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {LOCATION_COLUMNS} FROM locations \
                     WHERE (name LIKE ?1 OR address LIKE ?1) \
                       AND (name LIKE ?2 OR address LIKE ?2) \
                       AND (name LIKE ?3 OR address LIKE ?3) \
                       AND (name LIKE ?4 OR address LIKE ?4) \
                     LIMIT ?5"
                ),
                params![
                    patterns[0].as_str(),
                    patterns[1].as_str(),
                    patterns[2].as_str(),
                    patterns[3].as_str(),
                    limit as i64
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_locations_by_keywords: {e}")))?;

        let mut locations = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        {
            locations.push(row_to_location(&row)?);
        }
        Ok(locations)
    }

    async fn insert_location(&self, location: &StoredLocation) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO locations (id, name, address, lat, lng, category) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    location.id.as_str(),
                    location.name.as_str(),
                    location.address.as_str(),
                    location.lat,
                    location.lng,
                    opt_text(location.category.as_deref()),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_location: {e}")))?;
        Ok(())
    }

    // ── Flow-completion domain writes ───────────────────────────────

    async fn save_merchant_setup(
        &self,
        session_id: &str,
        data: &MerchantData,
    ) -> Result<(), DatabaseError> {
        let location_name = data.location_name.as_deref().unwrap_or("");
        for product in &data.products {
            self.conn()
                .execute(
                    "INSERT INTO merchant_products \
                     (id, session_id, location_name, business_type, opening_hours, \
                      product_name, price_cents, duration_min, created_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        Uuid::new_v4().to_string(),
                        session_id,
                        location_name,
                        opt_text(data.business_type.as_deref()),
                        opt_text(data.opening_hours.as_deref()),
                        product.name.as_str(),
                        product.price_cents,
                        product
                            .duration_min
                            .map(libsql::Value::Integer)
                            .unwrap_or(libsql::Value::Null),
                        Utc::now().to_rfc3339(),
                    ],
                )
                .await
                .map_err(|e| DatabaseError::Query(format!("save_merchant_setup: {e}")))?;
        }
        Ok(())
    }

    async fn save_travel_memory(
        &self,
        session_id: &str,
        user_key: &str,
        data: &TravelerData,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO travel_memories \
                 (id, session_id, user_key, location_name, memory_text, companions, \
                  visit_date, revisit_intent, revisit_reason, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    Uuid::new_v4().to_string(),
                    session_id,
                    user_key,
                    data.location_name.as_deref().unwrap_or(""),
                    opt_text(data.memory_text.as_deref()),
                    opt_text(data.companions.as_deref()),
                    opt_text(data.visit_date.as_deref()),
                    data.revisit_intent
                        .map(|v| libsql::Value::Integer(v as i64))
                        .unwrap_or(libsql::Value::Null),
                    opt_text(data.revisit_reason.as_deref()),
                    Utc::now().to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_travel_memory: {e}")))?;

        // A declared revisit intent counts toward the relationship score.
        if data.revisit_intent == Some(true) {
            let mut profile = self
                .get_profile(user_key)
                .await?
                .unwrap_or_else(|| RelationshipProfileRow::new(user_key));
            profile.revisit_count += 1;
            self.upsert_profile(&profile).await?;
        }
        Ok(())
    }

    async fn save_identity_profile(
        &self,
        user_key: &str,
        data: &IdentityData,
    ) -> Result<(), DatabaseError> {
        let mut profile = self
            .get_profile(user_key)
            .await?
            .unwrap_or_else(|| RelationshipProfileRow::new(user_key));

        if let Some(kind) = data.identity {
            profile.identity = Some(kind.as_str().to_string());
        }
        if data.region.is_some() {
            profile.region = data.region.clone();
        }
        if data.visit_period.is_some() {
            profile.visit_period = data.visit_period.clone();
        }
        if data.planned_period.is_some() {
            profile.planned_period = data.planned_period.clone();
        }
        for interest in &data.interests {
            if !profile.interests.contains(interest) {
                profile.interests.push(interest.clone());
            }
        }
        if data.revisit_intent == Some(true) {
            profile.revisit_count += 1;
        }
        self.upsert_profile(&profile).await
    }

    // ── Distance cache ──────────────────────────────────────────────

    async fn get_cached_distance(
        &self,
        origin: &str,
        destination: &str,
        mode: &str,
        max_age: Duration,
    ) -> Result<Option<CachedDistance>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT origin, destination, mode, distance_text, duration_text, \
                        distance_meters, duration_seconds, cached_at \
                 FROM distance_cache \
                 WHERE origin = ?1 AND destination = ?2 AND mode = ?3",
                params![origin, destination, mode],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_cached_distance: {e}")))?;

        let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(e.to_string()))?
        else {
            return Ok(None);
        };

        let cached_str: String = row.get(7).map_err(|e| DatabaseError::Query(e.to_string()))?;
        let cached_at = parse_datetime(&cached_str);
        let age = Utc::now().signed_duration_since(cached_at);
        if age.num_seconds() < 0 || age.num_seconds() as u64 > max_age.as_secs() {
            return Ok(None);
        }

        Ok(Some(CachedDistance {
            origin: row.get(0).map_err(|e| DatabaseError::Query(e.to_string()))?,
            destination: row.get(1).map_err(|e| DatabaseError::Query(e.to_string()))?,
            mode: row.get(2).map_err(|e| DatabaseError::Query(e.to_string()))?,
            distance_text: row.get(3).map_err(|e| DatabaseError::Query(e.to_string()))?,
            duration_text: row.get(4).map_err(|e| DatabaseError::Query(e.to_string()))?,
            distance_meters: row.get(5).map_err(|e| DatabaseError::Query(e.to_string()))?,
            duration_seconds: row.get(6).map_err(|e| DatabaseError::Query(e.to_string()))?,
            cached_at,
        }))
    }

    async fn put_cached_distance(&self, entry: &CachedDistance) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO distance_cache \
                 (origin, destination, mode, distance_text, duration_text, \
                  distance_meters, duration_seconds, cached_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8) \
                 ON CONFLICT(origin, destination, mode) DO UPDATE SET \
                  distance_text = excluded.distance_text, \
                  duration_text = excluded.duration_text, \
                  distance_meters = excluded.distance_meters, \
                  duration_seconds = excluded.duration_seconds, \
                  cached_at = excluded.cached_at",
                params![
                    entry.origin.as_str(),
                    entry.destination.as_str(),
                    entry.mode.as_str(),
                    entry.distance_text.as_str(),
                    entry.duration_text.as_str(),
                    entry.distance_meters,
                    entry.duration_seconds,
                    entry.cached_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_cached_distance: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::{IdentityKind, field, FieldUpdate};

    async fn backend() -> LibSqlBackend {
        LibSqlBackend::new_memory().await.unwrap()
    }

    #[tokio::test]
    async fn local_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("assist.db");
        {
            let db = LibSqlBackend::new_local(&path).await.unwrap();
            db.append_turn("s1", TurnRole::User, "hello", None)
                .await
                .unwrap();
        }
        let db = LibSqlBackend::new_local(&path).await.unwrap();
        let turns = db.list_turns("s1", 10).await.unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].content, "hello");
    }

    #[tokio::test]
    async fn dialog_state_roundtrip() {
        let db = backend().await;
        let mut row = DialogStateRow::new("s1", None, FlowType::IdentityGuide, "ask_identity");
        row.collected
            .apply(field::IDENTITY, FieldUpdate::Identity(IdentityKind::Local));
        row.step = "collect_identity_info".to_string();
        db.upsert_dialog_state(&row).await.unwrap();

        let loaded = db.get_dialog_state("s1", None).await.unwrap().unwrap();
        assert_eq!(loaded.flow, FlowType::IdentityGuide);
        assert_eq!(loaded.step, "collect_identity_info");
        assert_eq!(loaded.collected.identity(), Some(IdentityKind::Local));
        assert!(!loaded.is_complete);
    }

    #[tokio::test]
    async fn dialog_state_is_scoped_per_user() {
        let db = backend().await;
        let anon = DialogStateRow::new("s1", None, FlowType::General, "complete");
        let known = DialogStateRow::new("s1", Some("u1"), FlowType::MerchantSetup, "ask_location");
        db.upsert_dialog_state(&anon).await.unwrap();
        db.upsert_dialog_state(&known).await.unwrap();

        let loaded = db.get_dialog_state("s1", Some("u1")).await.unwrap().unwrap();
        assert_eq!(loaded.flow, FlowType::MerchantSetup);
        let loaded = db.get_dialog_state("s1", None).await.unwrap().unwrap();
        assert_eq!(loaded.flow, FlowType::General);
    }

    #[tokio::test]
    async fn turns_keep_arrival_order() {
        let db = backend().await;
        db.append_turn("s1", TurnRole::User, "first", None).await.unwrap();
        db.append_turn("s1", TurnRole::Assistant, "second", None)
            .await
            .unwrap();
        db.append_turn("s1", TurnRole::User, "third", None).await.unwrap();

        let turns = db.list_turns("s1", 10).await.unwrap();
        let contents: Vec<&str> = turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, ["first", "second", "third"]);
        assert_eq!(turns[1].role, TurnRole::Assistant);
    }

    #[tokio::test]
    async fn increment_rounds_creates_profile() {
        let db = backend().await;
        let row = DialogStateRow::new("s1", None, FlowType::General, "complete");
        db.upsert_dialog_state(&row).await.unwrap();

        db.increment_rounds("s1", None, "s1").await.unwrap();
        db.increment_rounds("s1", None, "s1").await.unwrap();

        let profile = db.get_profile("s1").await.unwrap().unwrap();
        assert_eq!(profile.total_rounds, 2);
        let state = db.get_dialog_state("s1", None).await.unwrap().unwrap();
        assert_eq!(state.rounds, 2);
    }

    #[tokio::test]
    async fn increment_rounds_only_touches_the_matching_user_row() {
        let db = backend().await;
        let anon = DialogStateRow::new("s1", None, FlowType::General, "complete");
        db.upsert_dialog_state(&anon).await.unwrap();
        let registered = DialogStateRow::new("s1", Some("u1"), FlowType::General, "complete");
        db.upsert_dialog_state(&registered).await.unwrap();

        db.increment_rounds("s1", Some("u1"), "u1").await.unwrap();

        let registered = db.get_dialog_state("s1", Some("u1")).await.unwrap().unwrap();
        assert_eq!(registered.rounds, 1);
        let anon = db.get_dialog_state("s1", None).await.unwrap().unwrap();
        assert_eq!(anon.rounds, 0);
    }

    #[tokio::test]
    async fn knowledge_search_filters_by_status() {
        let db = backend().await;
        db.insert_knowledge_item(
            "花菜干是澎湖的傳統家常菜",
            KnowledgeCategory::Food,
            ApprovalStatus::Approved,
            0.9,
        )
        .await
        .unwrap();
        db.insert_knowledge_item(
            "花菜干餐廳其實有兩家",
            KnowledgeCategory::Food,
            ApprovalStatus::Pending,
            0.4,
        )
        .await
        .unwrap();

        let approved = db
            .search_knowledge("花菜干", ApprovalStatus::Approved, 10)
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn keyword_location_search_requires_all_tokens() {
        let db = backend().await;
        db.insert_location(&StoredLocation {
            id: "l1".into(),
            name: "山水沙灘".into(),
            address: "馬公市山水里".into(),
            lat: 23.51,
            lng: 119.59,
            category: Some("beach".into()),
        })
        .await
        .unwrap();

        let hits = db
            .find_locations_by_keywords(&["山水".into(), "馬公".into()], 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = db
            .find_locations_by_keywords(&["山水".into(), "湖西".into()], 5)
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn distance_cache_expires() {
        let db = backend().await;
        let entry = CachedDistance {
            origin: "馬公港".into(),
            destination: "跨海大橋".into(),
            mode: "driving".into(),
            distance_text: "18 公里".into(),
            duration_text: "25 分鐘".into(),
            distance_meters: 18_000,
            duration_seconds: 1_500,
            cached_at: Utc::now() - chrono::Duration::days(10),
        };
        db.put_cached_distance(&entry).await.unwrap();

        let fresh = db
            .get_cached_distance("馬公港", "跨海大橋", "driving", Duration::from_secs(7 * 86_400))
            .await
            .unwrap();
        assert!(fresh.is_none(), "10-day-old entry is stale at a 7-day TTL");

        let lenient = db
            .get_cached_distance("馬公港", "跨海大橋", "driving", Duration::from_secs(30 * 86_400))
            .await
            .unwrap();
        assert!(lenient.is_some());
    }

    #[tokio::test]
    async fn identity_save_merges_into_profile() {
        let db = backend().await;
        let data = IdentityData {
            identity: Some(IdentityKind::Visited),
            visit_period: Some("2023-07".into()),
            interests: vec!["美食".into(), "浮潛".into()],
            revisit_intent: Some(true),
            ..Default::default()
        };
        db.save_identity_profile("u1", &data).await.unwrap();

        let profile = db.get_profile("u1").await.unwrap().unwrap();
        assert_eq!(profile.identity.as_deref(), Some("visited"));
        assert_eq!(profile.interests.len(), 2);
        assert_eq!(profile.revisit_count, 1);
    }
}
