//! Conversation orchestrator: one entry point per user turn.
//!
//! Order of operations is deliberate: the user message is logged before any
//! fallible work, grounding assembly cannot fail the turn, and dialog state
//! plus round counters are committed only after the model call succeeds. A
//! failed turn leaves state exactly where it was and answers with a coarse
//! apology, never internals.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::Utc;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::context::{ContextAssembler, GroundingContext};
use crate::dialog::{CollectedData, DialogAdvance, DialogEngine, FlowType, IdentityKind};
use crate::error::{Error, FailureCause, ValidationError};
use crate::knowledge::KnowledgeStore;
use crate::llm::{
    BackendKind, ChatMessage, CompletionRequest, ModelRouter, PromptInputs, RememberedFact,
    render_grounding, system_prompt,
};
use crate::places::{PlaceSearch, TravelMode};
use crate::relationship::{RelationshipScore, RelationshipScorer, Stage};
use crate::store::{CachedDistance, Database, TurnRole};

const MAX_MESSAGE_CHARS: usize = 2000;
const HISTORY_TURNS: usize = 10;
const DISTANCE_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

static DISTANCE_QUERY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:從)?(.{1,20}?)到(.{1,20}?)(?:有多遠|多遠|的距離|距離|怎麼去|要多久)").unwrap()
});

/// One incoming turn.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Explicit backend override ("knowledge" or "traveler").
    #[serde(default)]
    pub mode: Option<String>,
    /// A location picked in the UI; logged for context, never interpreted.
    #[serde(default)]
    pub selected_location: Option<String>,
}

/// The reply for one turn. Always well-formed, even on failure.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub success: bool,
    pub message: String,
    pub flow: FlowType,
    pub step: String,
    pub depth: f64,
    pub stage: Stage,
}

impl TurnResponse {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            flow: FlowType::General,
            step: String::new(),
            depth: 0.0,
            stage: Stage::Initial,
        }
    }
}

fn parse_distance_query(message: &str) -> Option<(String, String)> {
    let caps = DISTANCE_QUERY_RE.captures(message)?;
    let origin = caps[1].trim().to_string();
    let destination = caps[2].trim().to_string();
    if origin.is_empty() || destination.is_empty() {
        return None;
    }
    Some((origin, destination))
}

fn validate(request: &TurnRequest) -> Result<(), ValidationError> {
    if request.session_id.trim().is_empty() {
        return Err(ValidationError::EmptySessionId);
    }
    if request.message.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    let length = request.message.chars().count();
    if length > MAX_MESSAGE_CHARS {
        return Err(ValidationError::MessageTooLong {
            length,
            max: MAX_MESSAGE_CHARS,
        });
    }
    Ok(())
}

fn validation_reply(err: &ValidationError) -> &'static str {
    match err {
        ValidationError::EmptyMessage => "訊息不能是空的喔，想聊什麼都可以跟我說。",
        ValidationError::MessageTooLong { .. } => "訊息有點太長了，麻煩分段傳給我。",
        ValidationError::EmptySessionId => FailureCause::Unknown.user_message(),
    }
}

pub struct ConversationOrchestrator {
    db: Arc<dyn Database>,
    engine: DialogEngine,
    assembler: ContextAssembler,
    scorer: RelationshipScorer,
    router: ModelRouter,
    knowledge: Arc<KnowledgeStore>,
    places: Option<Arc<dyn PlaceSearch>>,
}

impl ConversationOrchestrator {
    pub fn new(
        db: Arc<dyn Database>,
        router: ModelRouter,
        places: Option<Arc<dyn PlaceSearch>>,
        config: &AppConfig,
    ) -> Self {
        let knowledge = Arc::new(KnowledgeStore::new(Arc::clone(&db)));
        Self {
            engine: DialogEngine::new(Arc::clone(&db), config.keywords.clone()),
            assembler: ContextAssembler::new(
                Arc::clone(&db),
                Arc::clone(&knowledge),
                places.clone(),
            ),
            scorer: RelationshipScorer::new(Arc::clone(&db)),
            router,
            knowledge,
            places,
            db,
        }
    }

    /// Handle one user turn end to end. Infallible at this boundary: every
    /// error becomes a `success: false` reply with an apology.
    pub async fn handle_message(&self, request: TurnRequest) -> TurnResponse {
        if let Err(e) = validate(&request) {
            debug!(error = %e, "Rejected invalid turn");
            return TurnResponse::failed(validation_reply(&e));
        }

        let session_id = request.session_id.clone();
        let user_key = request
            .user_id
            .clone()
            .unwrap_or_else(|| session_id.clone());

        if let Some(location) = &request.selected_location {
            if let Err(e) = self
                .db
                .append_turn(&session_id, TurnRole::LocationSelected, location, None)
                .await
            {
                warn!(error = %e, "Failed to log location selection");
            }
        }

        // The user message is logged before anything that can fail, so a
        // broken turn is still visible in the transcript.
        if let Err(e) = self
            .db
            .append_turn(&session_id, TurnRole::User, &request.message, None)
            .await
        {
            error!(error = %e, %session_id, "Failed to log user turn");
            return TurnResponse::failed(FailureCause::Unknown.user_message());
        }

        match self.process_turn(&request, &user_key).await {
            Ok(outcome) => self.finish_turn(&request, &user_key, outcome).await,
            Err(e) => {
                let cause = FailureCause::classify(&e);
                error!(error = %e, ?cause, %session_id, "Turn failed");
                TurnResponse::failed(cause.user_message())
            }
        }
    }

    async fn process_turn(
        &self,
        request: &TurnRequest,
        user_key: &str,
    ) -> Result<TurnOutcome, Error> {
        let mut advance = self
            .engine
            .advance(&request.session_id, request.user_id.as_deref(), &request.message)
            .await?;

        let score = self.scorer.score(user_key).await?;
        advance.state.last_depth = score.depth;
        advance.state.last_stage = score.stage;

        let context = self.assembler.assemble(&request.message).await;
        let distance_note = if advance.is_distance {
            self.resolve_distance(&request.message).await
        } else {
            None
        };

        let reply = self
            .invoke_model(request, user_key, &score, &context, distance_note)
            .await?;

        Ok(TurnOutcome {
            advance,
            reply,
            score,
            context,
        })
    }

    /// Commit everything a successful turn produced. Write failures at this
    /// point are logged but no longer fail the reply.
    async fn finish_turn(
        &self,
        request: &TurnRequest,
        user_key: &str,
        outcome: TurnOutcome,
    ) -> TurnResponse {
        let TurnOutcome {
            advance,
            reply,
            score,
            context,
        } = outcome;

        let mut message = reply;
        if let Some(question) = &advance.question {
            message.push_str("\n\n");
            message.push_str(question);
        }

        if let Err(e) = self.engine.commit(&advance, user_key).await {
            error!(error = %e, "Failed to commit dialog state");
            return TurnResponse::failed(FailureCause::Unknown.user_message());
        }
        if let Err(e) = self
            .db
            .increment_rounds(
                &advance.state.session_id,
                advance.state.user_id.as_deref(),
                user_key,
            )
            .await
        {
            warn!(error = %e, "Failed to increment round counters");
        }

        let context_json = serde_json::json!({
            "locations": context.locations,
            "knowledge_ids": context.knowledge.iter().map(|k| k.id.as_str()).collect::<Vec<_>>(),
            "flow": advance.state.flow,
            "step": advance.state.step,
        });
        if let Err(e) = self
            .db
            .append_turn(
                &advance.state.session_id,
                TurnRole::Assistant,
                &message,
                Some(&context_json),
            )
            .await
        {
            warn!(error = %e, "Failed to log assistant turn");
        }

        // Contribution capture runs off the request path.
        let from_local = matches!(
            &advance.state.collected,
            CollectedData::Identity(d) if d.identity == Some(IdentityKind::Local)
        ) || request.user_id.is_some();
        self.knowledge.spawn_capture(&request.message, from_local);

        info!(
            session_id = %advance.state.session_id,
            flow = %advance.state.flow,
            step = %advance.state.step,
            depth = score.depth,
            "Turn completed"
        );
        TurnResponse {
            success: true,
            message,
            flow: advance.state.flow,
            step: advance.state.step.clone(),
            depth: score.depth,
            stage: score.stage,
        }
    }

    async fn invoke_model(
        &self,
        request: &TurnRequest,
        user_key: &str,
        score: &RelationshipScore,
        context: &GroundingContext,
        distance_note: Option<String>,
    ) -> Result<String, Error> {
        let profile = self.db.get_profile(user_key).await?;

        let mut facts = Vec::new();
        if let Some(profile) = &profile {
            if let Some(region) = &profile.region {
                facts.push(RememberedFact {
                    text: format!("對方住在{region}"),
                    confidence: 0.9,
                });
            }
            if let Some(period) = &profile.visit_period {
                facts.push(RememberedFact {
                    text: format!("對方上次來澎湖大約是{period}"),
                    confidence: 0.8,
                });
            }
            if let Some(period) = &profile.planned_period {
                facts.push(RememberedFact {
                    text: format!("對方預計{period}來澎湖"),
                    confidence: 0.8,
                });
            }
        }
        for item in &context.knowledge {
            facts.push(RememberedFact {
                text: item.text.clone(),
                confidence: item.confidence,
            });
        }

        let inputs = PromptInputs {
            stage: score.stage,
            depth: score.depth,
            rounds: profile.as_ref().map(|p| p.total_rounds).unwrap_or(0),
            identity: profile.as_ref().and_then(|p| p.identity.clone()),
            interests: profile.map(|p| p.interests).unwrap_or_default(),
            facts,
        };

        let explicit = request.mode.as_deref().and_then(|m| match m {
            "knowledge" => Some(BackendKind::Knowledge),
            "traveler" => Some(BackendKind::Traveler),
            _ => None,
        });
        let backend = self
            .router
            .choose(explicit, request.user_id.is_some(), &request.message);

        let mut messages = vec![ChatMessage::system(system_prompt(backend, &inputs))];
        if let Some(block) = render_grounding(context) {
            messages.push(ChatMessage::system(block));
        }
        if let Some(note) = distance_note {
            messages.push(ChatMessage::system(note));
        }

        let history = self
            .db
            .list_turns(&request.session_id, HISTORY_TURNS)
            .await?;
        for turn in &history {
            match turn.role {
                TurnRole::User => messages.push(ChatMessage::user(&turn.content)),
                TurnRole::Assistant => messages.push(ChatMessage::assistant(&turn.content)),
                TurnRole::LocationSelected => {}
            }
        }
        // The current message was already appended to the turn log; make
        // sure it closes the conversation even if the log read raced.
        if history
            .last()
            .map(|t| t.role != TurnRole::User || t.content != request.message)
            .unwrap_or(true)
        {
            messages.push(ChatMessage::user(&request.message));
        }

        let response = self
            .router
            .invoke(backend, CompletionRequest::new(messages))
            .await?;
        Ok(response.content)
    }

    /// Resolve a distance question through the cache, then the external
    /// backend. Every failure degrades to `None`: the model answers without
    /// the number rather than the turn failing.
    async fn resolve_distance(&self, message: &str) -> Option<String> {
        let (origin, destination) = parse_distance_query(message)?;
        // Prefer curated location names over the raw captures so known
        // places resolve consistently and cache under one key.
        let origin = self
            .assembler
            .resolve_place_name(&origin)
            .await
            .unwrap_or(origin);
        let destination = self
            .assembler
            .resolve_place_name(&destination)
            .await
            .unwrap_or(destination);
        let mode = TravelMode::Driving;

        match self
            .db
            .get_cached_distance(&origin, &destination, mode.as_str(), DISTANCE_CACHE_TTL)
            .await
        {
            Ok(Some(cached)) => {
                debug!(%origin, %destination, "Distance served from cache");
                return Some(format!(
                    "已查到距離：從{origin}到{destination}開車約{}（{}）。",
                    cached.duration_text, cached.distance_text
                ));
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Distance cache lookup failed"),
        }

        let places = self.places.as_ref()?;
        match places.distance(&origin, &destination, mode).await {
            Ok(result) => {
                let entry = CachedDistance {
                    origin: origin.clone(),
                    destination: destination.clone(),
                    mode: mode.as_str().to_string(),
                    distance_text: result.distance_text.clone(),
                    duration_text: result.duration_text.clone(),
                    distance_meters: result.distance_meters,
                    duration_seconds: result.duration_seconds,
                    cached_at: Utc::now(),
                };
                if let Err(e) = self.db.put_cached_distance(&entry).await {
                    warn!(error = %e, "Failed to cache distance");
                }
                Some(format!(
                    "已查到距離：從{origin}到{destination}開車約{}（{}）。",
                    result.duration_text, result.distance_text
                ))
            }
            Err(e) => {
                warn!(error = %e, %origin, %destination, "Distance lookup failed");
                None
            }
        }
    }
}

struct TurnOutcome {
    advance: DialogAdvance,
    reply: String,
    score: RelationshipScore,
    context: GroundingContext,
}
