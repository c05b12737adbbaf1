//! Guided dialog flows: analysis, extraction, question tables, and the
//! engine that advances state one turn at a time.

pub mod analyzer;
pub mod collected;
pub mod engine;
pub mod extract;
pub mod flow;
pub mod questions;

pub use analyzer::{Analysis, FlowAction, UserType, analyze};
pub use collected::{
    CollectedData, IdentityData, IdentityKind, MerchantData, Product, TravelerData, field,
};
pub use engine::{DialogAdvance, DialogEngine};
pub use extract::{FieldUpdate, extract_structured_info};
pub use flow::{COMPLETE, FlowType, identity_step, merchant_step, traveler_step};
pub use questions::{QuestionPlan, expected_field, next_question};
