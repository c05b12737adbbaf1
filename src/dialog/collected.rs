//! Per-flow collected data.
//!
//! Each flow accumulates answers into its own typed record instead of an
//! open field map; the record is serialized as JSON on the dialog state row
//! and converted into domain rows when the flow completes.

use serde::{Deserialize, Serialize};

use super::extract::FieldUpdate;
use super::flow::{FlowType, merchant_step};

/// Field name tokens. A step asks for exactly one of these.
pub mod field {
    pub const IDENTITY: &str = "identity";
    pub const REGION: &str = "region";
    pub const VISIT_PERIOD: &str = "visit_period";
    pub const PLANNED_PERIOD: &str = "planned_period";
    pub const INTERESTS: &str = "interests";
    pub const FAVORITE_SPOT: &str = "favorite_spot";
    pub const REVISIT_INTENT: &str = "revisit_intent";
    pub const REVISIT_REASON: &str = "revisit_reason";
    pub const CONCERNS: &str = "concerns";

    pub const LOCATION_NAME: &str = "location_name";
    pub const LOCATION_CONFIRMED: &str = "location_confirmed";
    pub const BUSINESS_TYPE: &str = "business_type";
    pub const OPENING_HOURS: &str = "opening_hours";
    pub const PRODUCT_NAME: &str = "product_name";
    pub const PRODUCT_PRICE: &str = "product_price";
    pub const PRODUCT_DURATION: &str = "product_duration";
    pub const MORE_PRODUCTS: &str = "more_products";

    pub const MEMORY_TEXT: &str = "memory_text";
    pub const COMPANIONS: &str = "companions";
    pub const VISIT_DATE: &str = "visit_date";
}

/// How the user self-identified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityKind {
    /// Lives in Penghu.
    Local,
    /// Has visited before.
    Visited,
    /// Planning a first visit.
    Planning,
}

impl IdentityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Visited => "visited",
            Self::Planning => "planning",
        }
    }
}

/// Answers gathered by the identity discovery flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityData {
    pub identity: Option<IdentityKind>,
    pub region: Option<String>,
    pub visit_period: Option<String>,
    pub planned_period: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub favorite_spot: Option<String>,
    pub revisit_intent: Option<bool>,
    pub revisit_reason: Option<String>,
    pub concerns: Option<String>,
}

/// One finished merchant product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    /// Minor currency units (NTD × 100).
    pub price_cents: i64,
    pub duration_min: Option<i64>,
}

/// The product currently being collected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: Option<String>,
    pub price_cents: Option<i64>,
    #[serde(default)]
    pub price_confirmed: bool,
    pub duration_min: Option<i64>,
}

impl ProductDraft {
    fn is_blank(&self) -> bool {
        self.name.is_none() && self.price_cents.is_none() && self.duration_min.is_none()
    }
}

/// Answers gathered by the merchant setup flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MerchantData {
    pub location_name: Option<String>,
    pub location_confirmed: Option<bool>,
    pub business_type: Option<String>,
    pub opening_hours: Option<String>,
    #[serde(default)]
    pub pending: ProductDraft,
    #[serde(default)]
    pub products: Vec<Product>,
    /// Set once the user signals there are no more products.
    #[serde(default)]
    pub finished: bool,
}

impl MerchantData {
    /// Move a complete draft into the product list and reset the draft.
    fn flush_pending(&mut self) {
        if self.pending.is_blank() {
            return;
        }
        if let (Some(name), Some(price_cents)) =
            (self.pending.name.take(), self.pending.price_cents)
        {
            self.products.push(Product {
                name,
                price_cents,
                duration_min: self.pending.duration_min,
            });
        }
        self.pending = ProductDraft::default();
    }
}

/// Answers gathered by the traveler memory flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TravelerData {
    pub location_name: Option<String>,
    pub memory_text: Option<String>,
    pub companions: Option<String>,
    pub visit_date: Option<String>,
    pub revisit_intent: Option<bool>,
    pub revisit_reason: Option<String>,
}

/// Collected data, tagged by the flow that owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "flow", rename_all = "snake_case")]
pub enum CollectedData {
    #[default]
    General,
    Identity(IdentityData),
    Merchant(MerchantData),
    Traveler(TravelerData),
}

impl CollectedData {
    /// Fresh record for a flow that is just starting.
    pub fn new_for(flow: FlowType) -> Self {
        match flow {
            FlowType::IdentityGuide => Self::Identity(IdentityData::default()),
            FlowType::MerchantSetup => Self::Merchant(MerchantData::default()),
            FlowType::TravelerMemory => Self::Traveler(TravelerData::default()),
            FlowType::General | FlowType::DistanceQuery => Self::General,
        }
    }

    /// True when nothing has been collected yet (the "first turn" test).
    pub fn is_empty(&self) -> bool {
        match self {
            Self::General => true,
            Self::Identity(d) => *d == IdentityData::default(),
            Self::Merchant(d) => *d == MerchantData::default(),
            Self::Traveler(d) => *d == TravelerData::default(),
        }
    }

    pub fn identity(&self) -> Option<IdentityKind> {
        match self {
            Self::Identity(d) => d.identity,
            _ => None,
        }
    }

    pub fn interests(&self) -> &[String] {
        match self {
            Self::Identity(d) => &d.interests,
            _ => &[],
        }
    }

    /// Whether a step's target field already holds an answer.
    pub fn field_is_set(&self, field_name: &str) -> bool {
        use field::*;
        match self {
            Self::General => false,
            Self::Identity(d) => match field_name {
                IDENTITY => d.identity.is_some(),
                REGION => d.region.is_some(),
                VISIT_PERIOD => d.visit_period.is_some(),
                PLANNED_PERIOD => d.planned_period.is_some(),
                INTERESTS => !d.interests.is_empty(),
                FAVORITE_SPOT => d.favorite_spot.is_some(),
                REVISIT_INTENT => d.revisit_intent.is_some(),
                REVISIT_REASON => d.revisit_reason.is_some(),
                CONCERNS => d.concerns.is_some(),
                _ => false,
            },
            Self::Merchant(d) => match field_name {
                LOCATION_NAME => d.location_name.is_some(),
                LOCATION_CONFIRMED => d.location_confirmed == Some(true),
                BUSINESS_TYPE => d.business_type.is_some(),
                OPENING_HOURS => d.opening_hours.is_some(),
                PRODUCT_NAME => d.pending.name.is_some(),
                PRODUCT_PRICE => d.pending.price_cents.is_some(),
                PRODUCT_DURATION => d.pending.duration_min.is_some(),
                MORE_PRODUCTS => d.finished,
                _ => false,
            },
            Self::Traveler(d) => match field_name {
                LOCATION_NAME => d.location_name.is_some(),
                MEMORY_TEXT => d.memory_text.is_some(),
                COMPANIONS => d.companions.is_some(),
                VISIT_DATE => d.visit_date.is_some(),
                REVISIT_INTENT => d.revisit_intent.is_some(),
                REVISIT_REASON => d.revisit_reason.is_some(),
                _ => false,
            },
        }
    }

    /// Apply an extracted answer to the named field.
    ///
    /// A mismatched or `Empty` update is ignored: the field stays unset and
    /// the same question is asked again on the next turn. Returns a step to
    /// jump to when the answer re-enters a loop (merchant product loop).
    pub fn apply(&mut self, field_name: &str, update: FieldUpdate) -> Option<&'static str> {
        use field::*;
        if matches!(update, FieldUpdate::Empty) {
            return None;
        }
        match self {
            Self::General => None,
            Self::Identity(d) => {
                match (field_name, update) {
                    (IDENTITY, FieldUpdate::Identity(kind)) => d.identity = Some(kind),
                    (REGION, FieldUpdate::Text(t)) => d.region = Some(t),
                    (VISIT_PERIOD, FieldUpdate::Text(t)) => d.visit_period = Some(t),
                    (VISIT_PERIOD, FieldUpdate::YearMonth(t)) => d.visit_period = Some(t),
                    (PLANNED_PERIOD, FieldUpdate::Text(t)) => d.planned_period = Some(t),
                    (PLANNED_PERIOD, FieldUpdate::YearMonth(t)) => d.planned_period = Some(t),
                    (INTERESTS, FieldUpdate::Interests(items)) => {
                        for item in items {
                            if !d.interests.contains(&item) {
                                d.interests.push(item);
                            }
                        }
                    }
                    (FAVORITE_SPOT, FieldUpdate::Text(t)) => d.favorite_spot = Some(t),
                    (REVISIT_INTENT, FieldUpdate::YesNo(v)) => d.revisit_intent = Some(v),
                    (REVISIT_REASON, FieldUpdate::Text(t)) => d.revisit_reason = Some(t),
                    (CONCERNS, FieldUpdate::Text(t)) => d.concerns = Some(t),
                    _ => {}
                }
                None
            }
            Self::Merchant(d) => {
                match (field_name, update) {
                    (LOCATION_NAME, FieldUpdate::Text(t)) => d.location_name = Some(t),
                    (LOCATION_CONFIRMED, FieldUpdate::YesNo(true)) => {
                        d.location_confirmed = Some(true)
                    }
                    (LOCATION_CONFIRMED, FieldUpdate::YesNo(false)) => {
                        // Wrong location: clear it and ask again.
                        d.location_name = None;
                        d.location_confirmed = None;
                    }
                    (BUSINESS_TYPE, FieldUpdate::Text(t)) => d.business_type = Some(t),
                    (OPENING_HOURS, FieldUpdate::Text(t)) => d.opening_hours = Some(t),
                    (PRODUCT_NAME, FieldUpdate::Text(t)) => d.pending.name = Some(t),
                    (PRODUCT_PRICE, FieldUpdate::Price { cents, confirmed }) => {
                        d.pending.price_cents = Some(cents);
                        d.pending.price_confirmed = confirmed;
                    }
                    (PRODUCT_DURATION, FieldUpdate::Duration { minutes }) => {
                        d.pending.duration_min = Some(minutes)
                    }
                    (MORE_PRODUCTS, FieldUpdate::YesNo(true)) => {
                        d.flush_pending();
                        return Some(merchant_step::ASK_PRODUCT_NAME);
                    }
                    (MORE_PRODUCTS, FieldUpdate::YesNo(false)) => {
                        d.flush_pending();
                        d.finished = true;
                    }
                    _ => {}
                }
                None
            }
            Self::Traveler(d) => {
                match (field_name, update) {
                    (LOCATION_NAME, FieldUpdate::Text(t)) => d.location_name = Some(t),
                    (MEMORY_TEXT, FieldUpdate::Text(t)) => d.memory_text = Some(t),
                    (COMPANIONS, FieldUpdate::Text(t)) => d.companions = Some(t),
                    (VISIT_DATE, FieldUpdate::YearMonth(t)) => d.visit_date = Some(t),
                    (REVISIT_INTENT, FieldUpdate::YesNo(v)) => d.revisit_intent = Some(v),
                    (REVISIT_REASON, FieldUpdate::Text(t)) => d.revisit_reason = Some(t),
                    _ => {}
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_records_are_empty() {
        for flow in [
            FlowType::IdentityGuide,
            FlowType::MerchantSetup,
            FlowType::TravelerMemory,
            FlowType::General,
        ] {
            assert!(CollectedData::new_for(flow).is_empty());
        }
    }

    #[test]
    fn empty_update_is_ignored() {
        let mut data = CollectedData::new_for(FlowType::TravelerMemory);
        data.apply(field::VISIT_DATE, FieldUpdate::Empty);
        assert!(!data.field_is_set(field::VISIT_DATE));
        assert!(data.is_empty());
    }

    #[test]
    fn mismatched_update_kind_is_ignored() {
        let mut data = CollectedData::new_for(FlowType::TravelerMemory);
        // Free text is not a parseable visit date; the flow re-asks.
        data.apply(field::VISIT_DATE, FieldUpdate::Text("不記得了".into()));
        assert!(!data.field_is_set(field::VISIT_DATE));
    }

    #[test]
    fn merchant_location_rejection_clears_name() {
        let mut data = CollectedData::new_for(FlowType::MerchantSetup);
        data.apply(field::LOCATION_NAME, FieldUpdate::Text("小萍的店".into()));
        assert!(data.field_is_set(field::LOCATION_NAME));
        data.apply(field::LOCATION_CONFIRMED, FieldUpdate::YesNo(false));
        assert!(!data.field_is_set(field::LOCATION_NAME));
        assert!(!data.field_is_set(field::LOCATION_CONFIRMED));
    }

    #[test]
    fn merchant_product_loop_flushes_and_redirects() {
        let mut data = CollectedData::new_for(FlowType::MerchantSetup);
        data.apply(field::PRODUCT_NAME, FieldUpdate::Text("夜釣小管".into()));
        data.apply(
            field::PRODUCT_PRICE,
            FieldUpdate::Price {
                cents: 150_000,
                confirmed: true,
            },
        );
        data.apply(field::PRODUCT_DURATION, FieldUpdate::Duration { minutes: 120 });

        let redirect = data.apply(field::MORE_PRODUCTS, FieldUpdate::YesNo(true));
        assert_eq!(redirect, Some(merchant_step::ASK_PRODUCT_NAME));

        let CollectedData::Merchant(m) = &data else {
            panic!("wrong variant")
        };
        assert_eq!(m.products.len(), 1);
        assert_eq!(m.products[0].price_cents, 150_000);
        assert_eq!(m.products[0].duration_min, Some(120));
        assert!(m.pending.is_blank());
        assert!(!m.finished);
    }

    #[test]
    fn merchant_no_more_products_finishes() {
        let mut data = CollectedData::new_for(FlowType::MerchantSetup);
        data.apply(field::PRODUCT_NAME, FieldUpdate::Text("潮間帶導覽".into()));
        data.apply(
            field::PRODUCT_PRICE,
            FieldUpdate::Price {
                cents: 80_000,
                confirmed: true,
            },
        );
        let redirect = data.apply(field::MORE_PRODUCTS, FieldUpdate::YesNo(false));
        assert_eq!(redirect, None);
        assert!(data.field_is_set(field::MORE_PRODUCTS));

        let CollectedData::Merchant(m) = &data else {
            panic!("wrong variant")
        };
        assert_eq!(m.products.len(), 1);
        assert!(m.finished);
    }

    #[test]
    fn interests_are_deduplicated() {
        let mut data = CollectedData::new_for(FlowType::IdentityGuide);
        data.apply(
            field::INTERESTS,
            FieldUpdate::Interests(vec!["美食".into(), "浮潛".into()]),
        );
        data.apply(
            field::INTERESTS,
            FieldUpdate::Interests(vec!["美食".into(), "歷史".into()]),
        );
        assert_eq!(data.interests(), ["美食", "浮潛", "歷史"]);
    }

    #[test]
    fn serde_roundtrip_keeps_flow_tag() {
        let mut data = CollectedData::new_for(FlowType::IdentityGuide);
        data.apply(field::IDENTITY, FieldUpdate::Identity(IdentityKind::Local));
        let json = serde_json::to_string(&data).unwrap();
        assert!(json.contains("\"flow\":\"identity\""));
        let parsed: CollectedData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, data);
    }
}
