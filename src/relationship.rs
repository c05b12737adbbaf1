//! Relationship depth scoring.
//!
//! Depth is a 0–100 score recomputed from the persisted profile on every
//! turn; it is never incremented in place. Four weighted components:
//! conversation rounds (max 40), profile completeness (max 30), declared
//! interests (max 20), and revisit signals (max 10).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::DatabaseError;
use crate::store::{Database, RelationshipProfileRow};

/// Named relationship stage derived from depth.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Initial,
    GettingToKnow,
    Familiar,
    Friend,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initial => "initial",
            Self::GettingToKnow => "getting_to_know",
            Self::Familiar => "familiar",
            Self::Friend => "friend",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "getting_to_know" => Self::GettingToKnow,
            "familiar" => Self::Familiar,
            "friend" => Self::Friend,
            _ => Self::Initial,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage boundaries: [0,20) initial, [20,50) getting to know,
/// [50,75) familiar, [75,100] friend.
pub fn stage_for_depth(depth: f64) -> Stage {
    if depth >= 75.0 {
        Stage::Friend
    } else if depth >= 50.0 {
        Stage::Familiar
    } else if depth >= 20.0 {
        Stage::GettingToKnow
    } else {
        Stage::Initial
    }
}

/// Depth formula over a profile snapshot. Pure; capped at 100.
pub fn depth_for_profile(profile: &RelationshipProfileRow) -> f64 {
    let rounds = (profile.total_rounds as f64 * 2.0).min(40.0);

    let filled = [
        profile.identity.is_some(),
        profile.region.is_some(),
        profile.visit_period.is_some(),
        profile.planned_period.is_some(),
        !profile.interests.is_empty(),
    ]
    .iter()
    .filter(|&&b| b)
    .count();
    let completeness = (filled as f64 / 5.0) * 30.0;

    let interests = (profile.interests.len() as f64 * 4.0).min(20.0);
    let revisit = (profile.revisit_count as f64 * 2.0).min(10.0);

    (rounds + completeness + interests + revisit).min(100.0)
}

/// Current depth and stage for one user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationshipScore {
    pub depth: f64,
    pub stage: Stage,
    pub total_rounds: i64,
}

/// Computes relationship scores from persisted profiles.
pub struct RelationshipScorer {
    db: Arc<dyn Database>,
}

impl RelationshipScorer {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Score for `user_key`; a missing profile scores zero.
    pub async fn score(&self, user_key: &str) -> Result<RelationshipScore, DatabaseError> {
        let profile = self.db.get_profile(user_key).await?;
        let depth = profile.as_ref().map(depth_for_profile).unwrap_or(0.0);
        let stage = stage_for_depth(depth);
        let total_rounds = profile.map(|p| p.total_rounds).unwrap_or(0);
        debug!(user_key, depth, stage = %stage, "Relationship scored");
        Ok(RelationshipScore {
            depth,
            stage,
            total_rounds,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile() -> RelationshipProfileRow {
        RelationshipProfileRow::new("u1")
    }

    #[test]
    fn empty_profile_scores_zero() {
        assert_eq!(depth_for_profile(&profile()), 0.0);
    }

    #[test]
    fn rounds_cap_at_forty() {
        let mut p = profile();
        p.total_rounds = 10;
        assert_eq!(depth_for_profile(&p), 20.0);
        p.total_rounds = 20;
        assert_eq!(depth_for_profile(&p), 40.0);
        p.total_rounds = 30;
        assert_eq!(depth_for_profile(&p), 40.0);
    }

    #[test]
    fn full_profile_earns_thirty() {
        let mut p = profile();
        p.identity = Some("local".into());
        p.region = Some("馬公".into());
        p.visit_period = Some("2023-07".into());
        p.planned_period = Some("2026-09".into());
        p.interests = vec!["美食".into()];
        // 30 completeness + 4 for the single interest
        assert_eq!(depth_for_profile(&p), 34.0);
    }

    #[test]
    fn interests_cap_at_twenty() {
        let mut p = profile();
        p.interests = vec!["a".into(), "b".into(), "c".into()];
        // 6 completeness (1 of 5 fields) + 12 interests
        assert_eq!(depth_for_profile(&p), 18.0);
        p.interests = (0..6).map(|i| i.to_string()).collect();
        assert_eq!(depth_for_profile(&p), 26.0);
    }

    #[test]
    fn revisits_cap_at_ten() {
        let mut p = profile();
        p.revisit_count = 3;
        assert_eq!(depth_for_profile(&p), 6.0);
        p.revisit_count = 8;
        assert_eq!(depth_for_profile(&p), 10.0);
    }

    #[test]
    fn stage_boundaries() {
        assert_eq!(stage_for_depth(0.0), Stage::Initial);
        assert_eq!(stage_for_depth(19.9), Stage::Initial);
        assert_eq!(stage_for_depth(20.0), Stage::GettingToKnow);
        assert_eq!(stage_for_depth(49.9), Stage::GettingToKnow);
        assert_eq!(stage_for_depth(50.0), Stage::Familiar);
        assert_eq!(stage_for_depth(74.9), Stage::Familiar);
        assert_eq!(stage_for_depth(75.0), Stage::Friend);
        assert_eq!(stage_for_depth(100.0), Stage::Friend);
    }

    #[test]
    fn stage_ordering() {
        assert!(Stage::Initial < Stage::GettingToKnow);
        assert!(Stage::Familiar < Stage::Friend);
    }

    #[tokio::test]
    async fn missing_profile_scores_zero() {
        let db = Arc::new(crate::store::LibSqlBackend::new_memory().await.unwrap());
        let scorer = RelationshipScorer::new(db);
        let score = scorer.score("nobody").await.unwrap();
        assert_eq!(score.depth, 0.0);
        assert_eq!(score.stage, Stage::Initial);
        assert_eq!(score.total_rounds, 0);
    }
}
