//! Competitive matches between worker nodes.
//!
//! Nodes join a match, each submits a solution, and once enough submissions
//! are in the configured judge picks the final result. The result is cached
//! on the match; reads never re-run the judge.

use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{Match, MatchConfig, MatchStatus, NewTask};
use crate::domain::ports::{SolutionJudge, TaskSpawner};
use crate::services::node_registry::NodeRegistry;

pub struct ArenaManager {
    registry: Arc<NodeRegistry>,
    judge: Arc<dyn SolutionJudge>,
    /// Held weakly: the spawner usually owns this manager.
    spawner: Option<Weak<dyn TaskSpawner>>,
    matches: RwLock<HashMap<Uuid, Match>>,
}

impl ArenaManager {
    pub fn new(registry: Arc<NodeRegistry>, judge: Arc<dyn SolutionJudge>) -> Self {
        Self {
            registry,
            judge,
            spawner: None,
            matches: RwLock::new(HashMap::new()),
        }
    }

    /// Create follow-up plan tasks through `spawner` when a match resolves.
    #[must_use]
    pub fn with_spawner(mut self, spawner: Weak<dyn TaskSpawner>) -> Self {
        self.spawner = Some(spawner);
        self
    }

    #[instrument(skip(self), err)]
    pub async fn create_match(&self, config: MatchConfig) -> DomainResult<Match> {
        config.validate()?;
        let arena_match = Match::new(config);
        info!(
            match_id = %arena_match.id,
            min_players = arena_match.config.min_players,
            max_players = arena_match.config.max_players,
            "Match created"
        );
        self.matches
            .write()
            .await
            .insert(arena_match.id, arena_match.clone());
        Ok(arena_match)
    }

    #[instrument(skip(self), err)]
    pub async fn join_match(&self, match_id: Uuid, node_id: &str) -> DomainResult<Match> {
        if self.registry.get_node(node_id).await.is_none() {
            return Err(DomainError::NodeNotFound(node_id.to_string()));
        }

        let mut matches = self.matches.write().await;
        let arena_match = matches
            .get_mut(&match_id)
            .ok_or(DomainError::MatchNotFound(match_id))?;

        let was = arena_match.status;
        arena_match.join(node_id)?;
        if was != arena_match.status {
            info!(status = %arena_match.status, participants = arena_match.participants.len(), "Match activated");
        }
        Ok(arena_match.clone())
    }

    /// Store a participant's solution; resolves the match once enough are in.
    #[instrument(skip(self, content), err)]
    pub async fn submit_solution(
        &self,
        match_id: Uuid,
        node_id: &str,
        content: impl Into<String> + Send,
    ) -> DomainResult<Match> {
        let snapshot = {
            let mut matches = self.matches.write().await;
            let arena_match = matches
                .get_mut(&match_id)
                .ok_or(DomainError::MatchNotFound(match_id))?;

            arena_match.submit(node_id, content)?;
            if !arena_match.ready_to_resolve() {
                return Ok(arena_match.clone());
            }
            arena_match.begin_resolving()?;
            arena_match.clone()
        };

        // The judge may be slow; other callers see `resolving` meanwhile.
        let verdict = self.judge.judge(&snapshot).await;

        let resolved = {
            let mut matches = self.matches.write().await;
            let arena_match = matches
                .get_mut(&match_id)
                .ok_or(DomainError::MatchNotFound(match_id))?;

            match verdict {
                Ok(result) => {
                    info!(winner = %result.winner, judge = %result.judge, "Match resolved");
                    arena_match.resolve(result)?;
                    arena_match.clone()
                }
                Err(e) => {
                    warn!(error = %e, "Judge failed; match reopened");
                    arena_match.abort_resolving();
                    return Err(e);
                }
            }
        };

        Ok(self.spawn_plan_task(resolved).await)
    }

    async fn spawn_plan_task(&self, resolved: Match) -> Match {
        let Some(task_type) = resolved.config.plan_task_type.clone() else {
            return resolved;
        };
        let Some(spawner) = self.spawner.as_ref().and_then(Weak::upgrade) else {
            warn!(match_id = %resolved.id, "No task spawner available for plan task");
            return resolved;
        };
        let Some(result) = resolved.final_result.as_ref() else {
            return resolved;
        };

        let request = NewTask::new(
            task_type,
            format!("plan for match {}", resolved.id),
            json!({
                "match_id": resolved.id,
                "winner": result.winner,
                "content": result.content,
            }),
        )
        .priority(resolved.config.plan_priority)
        .metadata(json!({ "source": "arena", "match_id": resolved.id }));

        match spawner.spawn_task(request).await {
            Ok(task) => {
                info!(match_id = %resolved.id, task_id = %task.id, "Plan task spawned");
                let mut matches = self.matches.write().await;
                match matches.get_mut(&resolved.id) {
                    Some(arena_match) => {
                        arena_match.plan_task_id = Some(task.id);
                        arena_match.clone()
                    }
                    None => resolved,
                }
            }
            Err(e) => {
                warn!(match_id = %resolved.id, error = %e, "Failed to spawn plan task");
                resolved
            }
        }
    }

    pub async fn get_match(&self, match_id: Uuid) -> DomainResult<Match> {
        self.matches
            .read()
            .await
            .get(&match_id)
            .cloned()
            .ok_or(DomainError::MatchNotFound(match_id))
    }

    /// All matches, oldest first.
    pub async fn list_matches(&self) -> Vec<Match> {
        let mut matches: Vec<Match> = self.matches.read().await.values().cloned().collect();
        matches.sort_by_key(|m| m.created_at);
        matches
    }

    pub async fn count_by_status(&self, status: MatchStatus) -> usize {
        self.matches
            .read()
            .await
            .values()
            .filter(|m| m.status == status)
            .count()
    }
}
