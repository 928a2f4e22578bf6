//! Judge port - picks the final result of an arena match.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{FinalResult, Match};

/// Selects or merges the submissions of a match into one result.
///
/// Implementations may call out to an external quality-scoring service.
#[async_trait]
pub trait SolutionJudge: Send + Sync {
    fn name(&self) -> &'static str;

    /// Called once per match, with at least `min_players` submissions present.
    async fn judge(&self, arena_match: &Match) -> DomainResult<FinalResult>;
}
