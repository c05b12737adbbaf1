//! Per-flow question tables.
//!
//! Each flow is an explicit table of steps: a step names the field it asks
//! for, the question to emit, and the step that follows once the field is
//! filled. `next_question` walks the table from the current step, skipping
//! every step whose field already holds an answer, and emits the first
//! unanswered question. The walk is pure: same step + same collected data
//! always produce the same plan.

use super::collected::{CollectedData, IdentityKind, field};
use super::flow::{COMPLETE, FlowType, identity_step, merchant_step, traveler_step};

/// The next question to ask, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionPlan {
    /// `None` once the flow is complete.
    pub question: Option<String>,
    /// The field the question collects.
    pub field: Option<&'static str>,
    /// Step to persist on the dialog state.
    pub next_step: &'static str,
}

impl QuestionPlan {
    fn complete() -> Self {
        Self {
            question: None,
            field: None,
            next_step: COMPLETE,
        }
    }
}

/// One row of a flow's transition table.
struct StepSpec {
    /// Step name at which this question is emitted.
    step: &'static str,
    /// Step name persisted while waiting for the answer (usually the same).
    wait_step: &'static str,
    field: &'static str,
    question: fn(&CollectedData) -> String,
    /// Successor once the field is filled; may branch on collected values.
    on_filled: fn(&CollectedData) -> &'static str,
}

macro_rules! static_q {
    ($text:expr) => {{
        fn build(_: &CollectedData) -> String {
            $text.to_string()
        }
        build
    }};
}

macro_rules! goto {
    ($step:expr) => {{
        fn next(_: &CollectedData) -> &'static str {
            $step
        }
        next
    }};
}

fn identity_branch(collected: &CollectedData) -> &'static str {
    match collected.identity() {
        Some(IdentityKind::Local) => identity_step::ASK_REGION,
        Some(IdentityKind::Visited) => identity_step::ASK_VISIT_PERIOD,
        Some(IdentityKind::Planning) => identity_step::ASK_PLANNED_PERIOD,
        None => identity_step::COLLECT_IDENTITY_INFO,
    }
}

fn interests_branch(collected: &CollectedData) -> &'static str {
    match collected.identity() {
        Some(IdentityKind::Local) => identity_step::ASK_FAVORITE_SPOT,
        Some(IdentityKind::Visited) => identity_step::ASK_REVISIT,
        Some(IdentityKind::Planning) => identity_step::ASK_CONCERNS,
        None => COMPLETE,
    }
}

fn revisit_branch(collected: &CollectedData) -> &'static str {
    let intent = match collected {
        CollectedData::Identity(d) => d.revisit_intent,
        CollectedData::Traveler(d) => d.revisit_intent,
        _ => None,
    };
    match intent {
        Some(true) => identity_step::ASK_REVISIT_REASON,
        _ => COMPLETE,
    }
}

static IDENTITY_TABLE: &[StepSpec] = &[
    StepSpec {
        step: identity_step::ASK_IDENTITY,
        wait_step: identity_step::COLLECT_IDENTITY_INFO,
        field: field::IDENTITY,
        question: static_q!(
            "想先認識你一下：你是澎湖在地人、來過澎湖玩，還是正在計畫第一次來呢？"
        ),
        on_filled: identity_branch,
    },
    StepSpec {
        step: identity_step::ASK_REGION,
        wait_step: identity_step::ASK_REGION,
        field: field::REGION,
        question: static_q!("你住在澎湖哪一區呢？馬公、湖西、白沙、西嶼，還是離島？"),
        on_filled: goto!(identity_step::ASK_INTERESTS),
    },
    StepSpec {
        step: identity_step::ASK_VISIT_PERIOD,
        wait_step: identity_step::ASK_VISIT_PERIOD,
        field: field::VISIT_PERIOD,
        question: static_q!("你大概是什麼時候來澎湖玩的呢？"),
        on_filled: goto!(identity_step::ASK_INTERESTS),
    },
    StepSpec {
        step: identity_step::ASK_PLANNED_PERIOD,
        wait_step: identity_step::ASK_PLANNED_PERIOD,
        field: field::PLANNED_PERIOD,
        question: static_q!("你預計什麼時候來澎湖呢？"),
        on_filled: goto!(identity_step::ASK_INTERESTS),
    },
    StepSpec {
        step: identity_step::ASK_INTERESTS,
        wait_step: identity_step::ASK_INTERESTS,
        field: field::INTERESTS,
        question: static_q!(
            "你對哪些主題比較有興趣？美食、景點、水上活動、歷史故事都可以聊。"
        ),
        on_filled: interests_branch,
    },
    StepSpec {
        step: identity_step::ASK_FAVORITE_SPOT,
        wait_step: identity_step::ASK_FAVORITE_SPOT,
        field: field::FAVORITE_SPOT,
        question: static_q!("身為在地人，有沒有私心推薦的好店或景點？"),
        on_filled: goto!(COMPLETE),
    },
    StepSpec {
        step: identity_step::ASK_REVISIT,
        wait_step: identity_step::ASK_REVISIT,
        field: field::REVISIT_INTENT,
        question: static_q!("之後還想再來澎湖嗎？"),
        on_filled: revisit_branch,
    },
    StepSpec {
        step: identity_step::ASK_REVISIT_REASON,
        wait_step: identity_step::ASK_REVISIT_REASON,
        field: field::REVISIT_REASON,
        question: static_q!("是什麼讓你想再來呢？"),
        on_filled: goto!(COMPLETE),
    },
    StepSpec {
        step: identity_step::ASK_CONCERNS,
        wait_step: identity_step::ASK_CONCERNS,
        field: field::CONCERNS,
        question: static_q!("第一次來澎湖，有什麼想先了解的嗎？交通、住宿或行程都可以問我。"),
        on_filled: goto!(COMPLETE),
    },
];

fn confirm_location_question(collected: &CollectedData) -> String {
    let name = match collected {
        CollectedData::Merchant(d) => d.location_name.as_deref().unwrap_or("這個地點"),
        _ => "這個地點",
    };
    format!("跟你確認一下，店家是「{name}」沒錯嗎？")
}

fn product_price_question(collected: &CollectedData) -> String {
    let name = match collected {
        CollectedData::Merchant(d) => d.pending.name.as_deref().unwrap_or("這個商品"),
        _ => "這個商品",
    };
    format!("「{name}」的價格是多少呢？")
}

static MERCHANT_TABLE: &[StepSpec] = &[
    StepSpec {
        step: merchant_step::ASK_LOCATION,
        wait_step: merchant_step::ASK_LOCATION,
        field: field::LOCATION_NAME,
        question: static_q!("想幫你把店家資料建起來！請問店名或地點是？"),
        on_filled: goto!(merchant_step::CONFIRM_LOCATION),
    },
    StepSpec {
        step: merchant_step::CONFIRM_LOCATION,
        wait_step: merchant_step::CONFIRM_LOCATION,
        field: field::LOCATION_CONFIRMED,
        question: confirm_location_question,
        on_filled: goto!(merchant_step::ASK_BUSINESS_TYPE),
    },
    StepSpec {
        step: merchant_step::ASK_BUSINESS_TYPE,
        wait_step: merchant_step::ASK_BUSINESS_TYPE,
        field: field::BUSINESS_TYPE,
        question: static_q!("這是一間什麼類型的店呢？餐飲、民宿還是水上活動？"),
        on_filled: goto!(merchant_step::ASK_HOURS),
    },
    StepSpec {
        step: merchant_step::ASK_HOURS,
        wait_step: merchant_step::ASK_HOURS,
        field: field::OPENING_HOURS,
        question: static_q!("平常的營業時間是？"),
        on_filled: goto!(merchant_step::ASK_PRODUCT_NAME),
    },
    StepSpec {
        step: merchant_step::ASK_PRODUCT_NAME,
        wait_step: merchant_step::ASK_PRODUCT_NAME,
        field: field::PRODUCT_NAME,
        question: static_q!("來介紹一個商品或服務吧！名稱是？"),
        on_filled: goto!(merchant_step::ASK_PRODUCT_PRICE),
    },
    StepSpec {
        step: merchant_step::ASK_PRODUCT_PRICE,
        wait_step: merchant_step::ASK_PRODUCT_PRICE,
        field: field::PRODUCT_PRICE,
        question: product_price_question,
        on_filled: goto!(merchant_step::ASK_PRODUCT_DURATION),
    },
    StepSpec {
        step: merchant_step::ASK_PRODUCT_DURATION,
        wait_step: merchant_step::ASK_PRODUCT_DURATION,
        field: field::PRODUCT_DURATION,
        question: static_q!("這個體驗大約需要多久時間？"),
        on_filled: goto!(merchant_step::ASK_MORE_PRODUCTS),
    },
    StepSpec {
        step: merchant_step::ASK_MORE_PRODUCTS,
        wait_step: merchant_step::ASK_MORE_PRODUCTS,
        field: field::MORE_PRODUCTS,
        question: static_q!("還有其他商品或服務要補充嗎？"),
        on_filled: goto!(COMPLETE),
    },
];

static TRAVELER_TABLE: &[StepSpec] = &[
    StepSpec {
        step: traveler_step::ASK_LOCATION,
        wait_step: traveler_step::ASK_LOCATION,
        field: field::LOCATION_NAME,
        question: static_q!("想幫你記下這段旅行回憶！是在澎湖的哪個地方呢？"),
        on_filled: goto!(traveler_step::ASK_MEMORY),
    },
    StepSpec {
        step: traveler_step::ASK_MEMORY,
        wait_step: traveler_step::ASK_MEMORY,
        field: field::MEMORY_TEXT,
        question: static_q!("那裡發生了什麼讓你印象深刻的事？"),
        on_filled: goto!(traveler_step::ASK_COMPANIONS),
    },
    StepSpec {
        step: traveler_step::ASK_COMPANIONS,
        wait_step: traveler_step::ASK_COMPANIONS,
        field: field::COMPANIONS,
        question: static_q!("當時是和誰一起去的呢？"),
        on_filled: goto!(traveler_step::ASK_VISIT_DATE),
    },
    StepSpec {
        step: traveler_step::ASK_VISIT_DATE,
        wait_step: traveler_step::ASK_VISIT_DATE,
        field: field::VISIT_DATE,
        question: static_q!("大概是什麼時候去的？例如 2023年7月。"),
        on_filled: goto!(traveler_step::ASK_REVISIT),
    },
    StepSpec {
        step: traveler_step::ASK_REVISIT,
        wait_step: traveler_step::ASK_REVISIT,
        field: field::REVISIT_INTENT,
        question: static_q!("之後還想再回去走走嗎？"),
        on_filled: revisit_branch,
    },
    StepSpec {
        step: traveler_step::ASK_REVISIT_REASON,
        wait_step: traveler_step::ASK_REVISIT_REASON,
        field: field::REVISIT_REASON,
        question: static_q!("是什麼讓你想再回去呢？"),
        on_filled: goto!(COMPLETE),
    },
];

fn table_for(flow: FlowType) -> &'static [StepSpec] {
    match flow {
        FlowType::IdentityGuide => IDENTITY_TABLE,
        FlowType::MerchantSetup => MERCHANT_TABLE,
        FlowType::TravelerMemory => TRAVELER_TABLE,
        FlowType::General | FlowType::DistanceQuery => &[],
    }
}

fn find_spec<'a>(table: &'a [StepSpec], step: &str) -> Option<&'a StepSpec> {
    table.iter().find(|s| s.step == step || s.wait_step == step)
}

/// The field a persisted step is waiting on, used to interpret the next
/// user message as an answer.
pub fn expected_field(flow: FlowType, step: &str) -> Option<&'static str> {
    find_spec(table_for(flow), step).map(|s| s.field)
}

/// Walk the flow's table from `step` and produce the next question.
///
/// Pure over `(flow, step, collected)`; steps whose field is already filled
/// are skipped silently.
pub fn next_question(flow: FlowType, step: &str, collected: &CollectedData) -> QuestionPlan {
    let table = table_for(flow);
    if table.is_empty() || step == COMPLETE {
        return QuestionPlan::complete();
    }
    let mut current = step;
    // Bounded walk: each iteration either emits or moves forward, and the
    // tables are acyclic given fixed collected data.
    for _ in 0..=table.len() {
        let Some(spec) = find_spec(table, current) else {
            return QuestionPlan::complete();
        };
        if collected.field_is_set(spec.field) {
            current = (spec.on_filled)(collected);
            if current == COMPLETE {
                return QuestionPlan::complete();
            }
        } else {
            return QuestionPlan {
                question: Some((spec.question)(collected)),
                field: Some(spec.field),
                next_step: spec.wait_step,
            };
        }
    }
    QuestionPlan::complete()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialog::extract::FieldUpdate;

    #[test]
    fn fresh_identity_flow_asks_identity_and_waits() {
        let collected = CollectedData::new_for(FlowType::IdentityGuide);
        let plan = next_question(FlowType::IdentityGuide, identity_step::ASK_IDENTITY, &collected);
        assert!(plan.question.is_some());
        assert_eq!(plan.field, Some(field::IDENTITY));
        assert_eq!(plan.next_step, identity_step::COLLECT_IDENTITY_INFO);
    }

    #[test]
    fn next_question_is_pure() {
        let mut collected = CollectedData::new_for(FlowType::IdentityGuide);
        collected.apply(
            field::IDENTITY,
            FieldUpdate::Identity(IdentityKind::Visited),
        );
        let a = next_question(
            FlowType::IdentityGuide,
            identity_step::COLLECT_IDENTITY_INFO,
            &collected,
        );
        let b = next_question(
            FlowType::IdentityGuide,
            identity_step::COLLECT_IDENTITY_INFO,
            &collected,
        );
        assert_eq!(a, b);
    }

    #[test]
    fn identity_branches_by_kind() {
        for (kind, expected_step, expected_field) in [
            (IdentityKind::Local, identity_step::ASK_REGION, field::REGION),
            (
                IdentityKind::Visited,
                identity_step::ASK_VISIT_PERIOD,
                field::VISIT_PERIOD,
            ),
            (
                IdentityKind::Planning,
                identity_step::ASK_PLANNED_PERIOD,
                field::PLANNED_PERIOD,
            ),
        ] {
            let mut collected = CollectedData::new_for(FlowType::IdentityGuide);
            collected.apply(field::IDENTITY, FieldUpdate::Identity(kind));
            let plan = next_question(
                FlowType::IdentityGuide,
                identity_step::COLLECT_IDENTITY_INFO,
                &collected,
            );
            assert_eq!(plan.next_step, expected_step);
            assert_eq!(plan.field, Some(expected_field));
        }
    }

    #[test]
    fn prefilled_fields_are_skipped_silently() {
        let mut collected = CollectedData::new_for(FlowType::IdentityGuide);
        collected.apply(field::IDENTITY, FieldUpdate::Identity(IdentityKind::Local));
        collected.apply(field::REGION, FieldUpdate::Text("馬公".into()));
        // Walking from the identity wait step jumps straight to interests.
        let plan = next_question(
            FlowType::IdentityGuide,
            identity_step::COLLECT_IDENTITY_INFO,
            &collected,
        );
        assert_eq!(plan.next_step, identity_step::ASK_INTERESTS);
    }

    #[test]
    fn visited_branch_ends_without_reason_when_no_revisit() {
        let mut collected = CollectedData::new_for(FlowType::IdentityGuide);
        collected.apply(
            field::IDENTITY,
            FieldUpdate::Identity(IdentityKind::Visited),
        );
        collected.apply(field::VISIT_PERIOD, FieldUpdate::Text("去年夏天".into()));
        collected.apply(field::INTERESTS, FieldUpdate::Interests(vec!["美食".into()]));
        collected.apply(field::REVISIT_INTENT, FieldUpdate::YesNo(false));
        let plan = next_question(
            FlowType::IdentityGuide,
            identity_step::ASK_REVISIT,
            &collected,
        );
        assert_eq!(plan, QuestionPlan::complete());
    }

    #[test]
    fn merchant_walks_to_complete() {
        let mut collected = CollectedData::new_for(FlowType::MerchantSetup);
        collected.apply(field::LOCATION_NAME, FieldUpdate::Text("阿婆仙人掌冰".into()));
        collected.apply(field::LOCATION_CONFIRMED, FieldUpdate::YesNo(true));
        collected.apply(field::BUSINESS_TYPE, FieldUpdate::Text("冰品".into()));
        collected.apply(field::OPENING_HOURS, FieldUpdate::Text("10:00-18:00".into()));
        collected.apply(field::PRODUCT_NAME, FieldUpdate::Text("仙人掌冰".into()));
        collected.apply(
            field::PRODUCT_PRICE,
            FieldUpdate::Price {
                cents: 6_000,
                confirmed: true,
            },
        );
        collected.apply(field::PRODUCT_DURATION, FieldUpdate::Duration { minutes: 10 });
        collected.apply(field::MORE_PRODUCTS, FieldUpdate::YesNo(false));

        let plan = next_question(
            FlowType::MerchantSetup,
            merchant_step::ASK_MORE_PRODUCTS,
            &collected,
        );
        assert_eq!(plan, QuestionPlan::complete());
    }

    #[test]
    fn merchant_price_question_names_the_product() {
        let mut collected = CollectedData::new_for(FlowType::MerchantSetup);
        collected.apply(field::PRODUCT_NAME, FieldUpdate::Text("夜釣小管".into()));
        let plan = next_question(
            FlowType::MerchantSetup,
            merchant_step::ASK_PRODUCT_PRICE,
            &collected,
        );
        assert!(plan.question.unwrap().contains("夜釣小管"));
    }

    #[test]
    fn unanswered_step_repeats_its_question() {
        let collected = CollectedData::new_for(FlowType::TravelerMemory);
        let a = next_question(FlowType::TravelerMemory, traveler_step::ASK_MEMORY, &collected);
        // Field still unset on the next turn: same question again.
        let b = next_question(FlowType::TravelerMemory, traveler_step::ASK_MEMORY, &collected);
        assert_eq!(a, b);
        assert_eq!(a.field, Some(field::MEMORY_TEXT));
    }

    #[test]
    fn general_flow_has_no_questions() {
        let collected = CollectedData::General;
        let plan = next_question(FlowType::General, "anything", &collected);
        assert_eq!(plan, QuestionPlan::complete());
    }

    #[test]
    fn expected_field_maps_wait_steps() {
        assert_eq!(
            expected_field(FlowType::IdentityGuide, identity_step::COLLECT_IDENTITY_INFO),
            Some(field::IDENTITY)
        );
        assert_eq!(
            expected_field(FlowType::MerchantSetup, merchant_step::ASK_PRODUCT_PRICE),
            Some(field::PRODUCT_PRICE)
        );
        assert_eq!(expected_field(FlowType::General, "x"), None);
    }
}
