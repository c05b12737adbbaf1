//! Dialog engine: advances guided flows one turn at a time.
//!
//! `advance` is read-only — it loads state, interprets the message, and
//! returns the updated state without persisting anything. `commit` writes
//! the result, running domain saves before the state is marked complete so
//! a failed save never strands a finished flow.

use std::sync::Arc;

use tracing::{debug, info};

use crate::config::KeywordConfig;
use crate::error::DatabaseError;
use crate::store::{Database, DialogStateRow};

use super::analyzer::{FlowAction, UserType, analyze};
use super::collected::CollectedData;
use super::extract::extract_structured_info;
use super::flow::{COMPLETE, FlowType, identity_step, merchant_step, traveler_step};
use super::questions::{expected_field, next_question};

/// The outcome of advancing one turn. Nothing is persisted yet.
#[derive(Debug, Clone)]
pub struct DialogAdvance {
    /// Updated dialog state to commit once the turn succeeds.
    pub state: DialogStateRow,
    /// Guided question to append to the assistant reply.
    pub question: Option<String>,
    /// Set when a flow finished on this turn; triggers a domain save.
    pub completed: Option<CollectedData>,
    /// The message also asks a distance question; answered outside dialog
    /// state, alongside whatever the flow does.
    pub is_distance: bool,
}

fn entry_step(flow: FlowType) -> &'static str {
    match flow {
        FlowType::IdentityGuide => identity_step::ASK_IDENTITY,
        FlowType::MerchantSetup => merchant_step::ASK_LOCATION,
        FlowType::TravelerMemory => traveler_step::ASK_LOCATION,
        FlowType::General | FlowType::DistanceQuery => COMPLETE,
    }
}

/// Advances and persists guided dialog state.
pub struct DialogEngine {
    db: Arc<dyn Database>,
    keywords: KeywordConfig,
}

impl DialogEngine {
    pub fn new(db: Arc<dyn Database>, keywords: KeywordConfig) -> Self {
        Self { db, keywords }
    }

    /// Interpret one message against the stored dialog state.
    pub async fn advance(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        message: &str,
    ) -> Result<DialogAdvance, DatabaseError> {
        let existing = self.db.get_dialog_state(session_id, user_id).await?;
        let user_type = match user_id {
            Some(_) => UserType::Registered,
            None => UserType::Anonymous,
        };
        let analysis = analyze(message, user_type, existing.as_ref(), &self.keywords);
        debug!(session_id, ?analysis, "Turn analyzed");
        let is_distance = analysis.wants_distance;

        match analysis.action {
            FlowAction::General => {
                let state = existing.unwrap_or_else(|| {
                    DialogStateRow::new(session_id, user_id, FlowType::General, COMPLETE)
                });
                Ok(DialogAdvance {
                    state,
                    question: None,
                    completed: None,
                    is_distance,
                })
            }
            FlowAction::StartFlow(flow) => {
                let mut state =
                    DialogStateRow::new(session_id, user_id, flow, entry_step(flow));
                if let Some(old) = &existing {
                    state.rounds = old.rounds;
                    state.last_depth = old.last_depth;
                    state.last_stage = old.last_stage;
                }
                let plan = next_question(flow, &state.step, &state.collected);
                state.step = plan.next_step.to_string();
                info!(session_id, flow = %flow, "Flow started");
                Ok(DialogAdvance {
                    state,
                    question: plan.question,
                    completed: None,
                    is_distance,
                })
            }
            FlowAction::Continue { flow, step } => {
                let mut state = existing.unwrap_or_else(|| {
                    // First-turn self-identification enters the flow with
                    // the message already counting as the first answer.
                    DialogStateRow::new(session_id, user_id, flow, &step)
                });
                if state.flow != flow {
                    state.flow = flow;
                    state.collected = CollectedData::new_for(flow);
                    state.is_complete = false;
                }

                let mut current_step = step.clone();
                if let Some(field_name) = expected_field(flow, &step) {
                    let update = extract_structured_info(message, field_name);
                    if let Some(redirect) = state.collected.apply(field_name, update) {
                        current_step = redirect.to_string();
                    }
                }

                let plan = next_question(flow, &current_step, &state.collected);
                state.step = plan.next_step.to_string();
                let completed = if plan.question.is_none() {
                    state.is_complete = true;
                    info!(session_id, flow = %flow, "Flow completed");
                    Some(state.collected.clone())
                } else {
                    None
                };
                Ok(DialogAdvance {
                    state,
                    question: plan.question,
                    completed,
                    is_distance,
                })
            }
        }
    }

    /// Persist an advance. Domain saves run first so the state is only
    /// marked complete once its data is safely written.
    pub async fn commit(
        &self,
        advance: &DialogAdvance,
        user_key: &str,
    ) -> Result<(), DatabaseError> {
        if let Some(completed) = &advance.completed {
            match completed {
                CollectedData::Identity(data) => {
                    self.db.save_identity_profile(user_key, data).await?;
                }
                CollectedData::Merchant(data) => {
                    self.db
                        .save_merchant_setup(&advance.state.session_id, data)
                        .await?;
                }
                CollectedData::Traveler(data) => {
                    self.db
                        .save_travel_memory(&advance.state.session_id, user_key, data)
                        .await?;
                }
                CollectedData::General => {}
            }
        }
        self.db.upsert_dialog_state(&advance.state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::LibSqlBackend;

    async fn engine() -> DialogEngine {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        DialogEngine::new(db, KeywordConfig::default())
    }

    #[tokio::test]
    async fn anonymous_first_message_starts_identity_flow() {
        let engine = engine().await;
        let advance = engine.advance("s1", None, "澎湖有什麼好吃的").await.unwrap();

        assert_eq!(advance.state.flow, FlowType::IdentityGuide);
        assert_eq!(advance.state.step, identity_step::COLLECT_IDENTITY_INFO);
        assert!(advance.question.is_some());
        assert!(advance.completed.is_none());

        // Nothing is persisted until commit.
        let stored = engine.db.get_dialog_state("s1", None).await.unwrap();
        assert!(stored.is_none());

        engine.commit(&advance, "s1").await.unwrap();
        let stored = engine.db.get_dialog_state("s1", None).await.unwrap().unwrap();
        assert_eq!(stored.step, identity_step::COLLECT_IDENTITY_INFO);
    }

    #[tokio::test]
    async fn identity_answer_branches_to_region() {
        let engine = engine().await;
        let first = engine.advance("s1", None, "你好").await.unwrap();
        engine.commit(&first, "s1").await.unwrap();

        let second = engine.advance("s1", None, "我是澎湖在地人").await.unwrap();
        assert_eq!(second.state.step, identity_step::ASK_REGION);
        assert!(second.question.unwrap().contains("哪一區"));
    }

    #[tokio::test]
    async fn unparseable_answer_repeats_the_question() {
        let engine = engine().await;
        let first = engine.advance("s1", None, "你好").await.unwrap();
        engine.commit(&first, "s1").await.unwrap();

        let second = engine.advance("s1", None, "嗯…").await.unwrap();
        assert_eq!(second.state.step, identity_step::COLLECT_IDENTITY_INFO);
        assert!(second.question.is_some());
        assert!(second.completed.is_none());
    }

    #[tokio::test]
    async fn traveler_flow_runs_to_completion_and_saves() {
        let engine = engine().await;
        // Identity gate satisfied up front.
        let gate = engine.advance("s1", None, "我來過澎湖").await.unwrap();
        engine.commit(&gate, "s1").await.unwrap();

        let answers = [
            "2023年7月",            // visit period
            "美食、浮潛",            // interests
            "不想",                  // revisit: no -> identity flow completes
        ];
        let mut last = None;
        for answer in answers {
            let advance = engine.advance("s1", None, answer).await.unwrap();
            engine.commit(&advance, "s1").await.unwrap();
            last = Some(advance);
        }
        let last = last.unwrap();
        assert!(last.completed.is_some());
        assert!(last.state.is_complete);

        let profile = engine.db.get_profile("s1").await.unwrap().unwrap();
        assert_eq!(profile.identity.as_deref(), Some("visited"));
        assert_eq!(profile.interests, ["美食", "浮潛"]);
    }

    #[tokio::test]
    async fn merchant_keyword_starts_flow_after_gate() {
        let engine = engine().await;
        let gate = engine.advance("s1", None, "我是澎湖居民").await.unwrap();
        engine.commit(&gate, "s1").await.unwrap();
        // Finish the identity flow quickly.
        for answer in ["馬公", "美食", "山水沙灘"] {
            let advance = engine.advance("s1", None, answer).await.unwrap();
            engine.commit(&advance, "s1").await.unwrap();
        }

        let advance = engine.advance("s1", None, "我開店，想上架行程").await.unwrap();
        assert_eq!(advance.state.flow, FlowType::MerchantSetup);
        assert_eq!(advance.state.step, merchant_step::ASK_LOCATION);
        assert!(advance.question.unwrap().contains("店名"));
    }

    #[tokio::test]
    async fn merchant_product_loop_collects_two_products() {
        let engine = engine().await;
        let gate = engine.advance("s1", Some("u1"), "我開店，想上架").await.unwrap();
        engine.commit(&gate, "u1").await.unwrap();

        let answers = [
            "夜釣小管體驗站",  // location
            "沒錯",            // confirm
            "水上活動",        // business type
            "每天 16:00-22:00", // hours
            "夜釣小管",        // product 1 name
            "1500元",          // price
            "2小時",           // duration
            "還有喔",          // more -> loop
            "潮間帶導覽",      // product 2 name
            "800元",           // price
            "90分鐘",          // duration
            "沒有了",          // done
        ];
        let mut last = None;
        for answer in answers {
            let advance = engine.advance("s1", Some("u1"), answer).await.unwrap();
            engine.commit(&advance, "u1").await.unwrap();
            last = Some(advance);
        }
        let last = last.unwrap();
        assert!(last.state.is_complete);
        let Some(CollectedData::Merchant(data)) = last.completed else {
            panic!("expected merchant completion");
        };
        assert_eq!(data.products.len(), 2);
        assert_eq!(data.products[0].price_cents, 150_000);
        assert_eq!(data.products[1].duration_min, Some(90));
    }

    #[tokio::test]
    async fn distance_question_does_not_touch_flow_state() {
        let engine = engine().await;
        let advance = engine
            .advance("s1", Some("u1"), "馬公到吉貝多遠")
            .await
            .unwrap();
        assert!(advance.is_distance);
        assert_eq!(advance.state.flow, FlowType::General);
        assert!(advance.question.is_none());
    }

    #[tokio::test]
    async fn flow_trigger_with_distance_phrase_keeps_both() {
        let engine = engine().await;
        let advance = engine
            .advance("s1", Some("u1"), "我的店到馬公多遠")
            .await
            .unwrap();
        assert!(advance.is_distance);
        assert_eq!(advance.state.flow, FlowType::MerchantSetup);
        assert!(advance.question.is_some());
    }
}
