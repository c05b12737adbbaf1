//! Conversation orchestration engine for a Penghu travel assistant.
//!
//! Guided dialog flows collect structured data turn by turn, a relationship
//! score shapes the assistant's tone, and every reply is grounded in curated
//! locations and community knowledge before an LLM backend answers.

pub mod config;
pub mod context;
pub mod dialog;
pub mod error;
pub mod http;
pub mod knowledge;
pub mod llm;
pub mod orchestrator;
pub mod places;
pub mod relationship;
pub mod store;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use orchestrator::{ConversationOrchestrator, TurnRequest, TurnResponse};
