//! Message analysis: decides which guided flow (if any) handles a turn.
//!
//! Priority order: an active incomplete flow always continues; then the
//! first-turn identity gate for anonymous users; then merchant triggers
//! before traveler triggers; otherwise general. The distance check is
//! independent of all of these and can co-occur with any of them.

use tracing::debug;

use crate::config::KeywordConfig;
use crate::store::DialogStateRow;

use super::flow::{FlowType, identity_step};

/// Whether the caller supplied an authenticated user id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    Anonymous,
    Registered,
}

/// The analyzer's routing decision for one message.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    /// Which guided flow (if any) owns the turn.
    pub action: FlowAction,
    /// The message also asks a distance question. Independent of the flow
    /// decision; one message can trigger both.
    pub wants_distance: bool,
}

/// How the guided-flow side of a turn proceeds.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowAction {
    /// No guided flow applies; the model answers directly.
    General,
    /// Enter a flow at its first question. The current message triggered
    /// the flow but is not an answer to it.
    StartFlow(FlowType),
    /// The message answers the waiting step of an active flow.
    Continue { flow: FlowType, step: String },
}

fn contains_any(message: &str, phrases: &[String]) -> bool {
    phrases.iter().any(|p| message.contains(p.as_str()))
}

/// Route one message given the persisted dialog state (if any).
pub fn analyze(
    message: &str,
    user_type: UserType,
    state: Option<&DialogStateRow>,
    keywords: &KeywordConfig,
) -> Analysis {
    Analysis {
        action: flow_action(message, user_type, state, keywords),
        wants_distance: contains_any(message, &keywords.distance_keywords),
    }
}

fn flow_action(
    message: &str,
    user_type: UserType,
    state: Option<&DialogStateRow>,
    keywords: &KeywordConfig,
) -> FlowAction {
    // An active guided flow owns the turn regardless of content.
    if let Some(state) = state {
        if !state.is_complete && state.flow != FlowType::General {
            debug!(flow = %state.flow, step = %state.step, "Continuing active flow");
            return FlowAction::Continue {
                flow: state.flow,
                step: state.step.clone(),
            };
        }
    }

    // Identity gate: anonymous users answer "who are you to Penghu?"
    // before anything else. Registered users already have a profile, and a
    // completed flow of any kind counts as having passed the gate.
    let gate_passed = state.map(|s| s.is_complete || s.rounds > 0).unwrap_or(false);
    if user_type == UserType::Anonymous && !gate_passed {
        if contains_any(message, &keywords.identity_phrases) {
            // The message itself is a self-identification; consume it as
            // the identity answer instead of asking again.
            return FlowAction::Continue {
                flow: FlowType::IdentityGuide,
                step: identity_step::COLLECT_IDENTITY_INFO.to_string(),
            };
        }
        return FlowAction::StartFlow(FlowType::IdentityGuide);
    }

    if contains_any(message, &keywords.merchant_keywords) {
        return FlowAction::StartFlow(FlowType::MerchantSetup);
    }
    if contains_any(message, &keywords.traveler_keywords) {
        return FlowAction::StartFlow(FlowType::TravelerMemory);
    }
    FlowAction::General
}
