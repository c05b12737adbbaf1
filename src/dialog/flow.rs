//! Flow and step identifiers for the guided dialogs.

use serde::{Deserialize, Serialize};

/// The kind of conversation a session is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowType {
    #[default]
    General,
    MerchantSetup,
    TravelerMemory,
    IdentityGuide,
    DistanceQuery,
}

impl FlowType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::MerchantSetup => "merchant_setup",
            Self::TravelerMemory => "traveler_memory",
            Self::IdentityGuide => "identity_guide",
            Self::DistanceQuery => "distance_query",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "merchant_setup" => Self::MerchantSetup,
            "traveler_memory" => Self::TravelerMemory,
            "identity_guide" => Self::IdentityGuide,
            "distance_query" => Self::DistanceQuery,
            _ => Self::General,
        }
    }
}

impl std::fmt::Display for FlowType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step name shared by every flow's terminal position.
pub const COMPLETE: &str = "complete";

/// Step names for the identity discovery flow.
pub mod identity_step {
    pub const ASK_IDENTITY: &str = "ask_identity";
    /// Waiting position after the identity question has been asked.
    pub const COLLECT_IDENTITY_INFO: &str = "collect_identity_info";
    pub const ASK_REGION: &str = "ask_region";
    pub const ASK_VISIT_PERIOD: &str = "ask_visit_period";
    pub const ASK_PLANNED_PERIOD: &str = "ask_planned_period";
    pub const ASK_INTERESTS: &str = "ask_interests";
    pub const ASK_FAVORITE_SPOT: &str = "ask_favorite_spot";
    pub const ASK_REVISIT: &str = "ask_revisit";
    pub const ASK_REVISIT_REASON: &str = "ask_revisit_reason";
    pub const ASK_CONCERNS: &str = "ask_concerns";
}

/// Step names for the merchant setup flow.
pub mod merchant_step {
    pub const ASK_LOCATION: &str = "ask_location";
    pub const CONFIRM_LOCATION: &str = "confirm_location";
    pub const ASK_BUSINESS_TYPE: &str = "ask_business_type";
    pub const ASK_HOURS: &str = "ask_hours";
    pub const ASK_PRODUCT_NAME: &str = "ask_product_name";
    pub const ASK_PRODUCT_PRICE: &str = "ask_product_price";
    pub const ASK_PRODUCT_DURATION: &str = "ask_product_duration";
    pub const ASK_MORE_PRODUCTS: &str = "ask_more_products";
}

/// Step names for the traveler memory flow.
pub mod traveler_step {
    pub const ASK_LOCATION: &str = "ask_location";
    pub const ASK_MEMORY: &str = "ask_memory";
    pub const ASK_COMPANIONS: &str = "ask_companions";
    pub const ASK_VISIT_DATE: &str = "ask_visit_date";
    pub const ASK_REVISIT: &str = "ask_revisit";
    pub const ASK_REVISIT_REASON: &str = "ask_revisit_reason";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_type_roundtrip() {
        for flow in [
            FlowType::General,
            FlowType::MerchantSetup,
            FlowType::TravelerMemory,
            FlowType::IdentityGuide,
            FlowType::DistanceQuery,
        ] {
            assert_eq!(FlowType::parse(flow.as_str()), flow);
        }
    }

    #[test]
    fn unknown_flow_falls_back_to_general() {
        assert_eq!(FlowType::parse("whatever"), FlowType::General);
    }

    #[test]
    fn display_matches_serde() {
        let json = serde_json::to_string(&FlowType::MerchantSetup).unwrap();
        assert_eq!(json, format!("\"{}\"", FlowType::MerchantSetup));
    }
}
