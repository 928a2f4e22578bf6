use async_trait::async_trait;
use chrono::Utc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{FinalResult, Match};
use crate::domain::ports::SolutionJudge;

/// Picks the most recently received submission.
#[derive(Debug, Default, Clone, Copy)]
pub struct LatestSubmissionJudge;

#[async_trait]
impl SolutionJudge for LatestSubmissionJudge {
    fn name(&self) -> &'static str {
        "latest_submission"
    }

    async fn judge(&self, arena_match: &Match) -> DomainResult<FinalResult> {
        let latest = arena_match
            .submissions
            .values()
            .max_by_key(|s| s.sequence)
            .ok_or_else(|| {
                DomainError::Validation(format!("match {} has no submissions", arena_match.id))
            })?;

        Ok(FinalResult {
            winner: latest.node_id.clone(),
            content: latest.content.clone(),
            judge: self.name().to_string(),
            decided_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::MatchConfig;

    #[tokio::test]
    async fn test_latest_submission_wins() {
        let mut m = Match::new(MatchConfig::new(2, 3));
        for node in ["a", "b"] {
            m.join(node).unwrap();
        }
        m.submit("b", "first").unwrap();
        m.submit("a", "second").unwrap();

        let result = LatestSubmissionJudge.judge(&m).await.unwrap();
        assert_eq!(result.winner, "a");
        assert_eq!(result.content, "second");
        assert_eq!(result.judge, "latest_submission");
    }

    #[tokio::test]
    async fn test_overwritten_submission_counts_as_latest() {
        let mut m = Match::new(MatchConfig::new(2, 2));
        m.join("a").unwrap();
        m.join("b").unwrap();
        m.submit("a", "a1").unwrap();
        m.submit("b", "b1").unwrap();
        m.submit("a", "a2").unwrap();

        let result = LatestSubmissionJudge.judge(&m).await.unwrap();
        assert_eq!(result.content, "a2");
    }

    #[tokio::test]
    async fn test_empty_match_is_rejected() {
        let m = Match::new(MatchConfig::default());
        assert!(LatestSubmissionJudge.judge(&m).await.is_err());
    }
}
