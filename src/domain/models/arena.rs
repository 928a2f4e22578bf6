//! Arena match domain model.
//!
//! A match gathers several nodes that each submit content; once enough
//! submissions arrive a judge picks the final result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    /// Waiting for enough participants
    Forming,
    /// Enough participants joined, collecting submissions
    Active,
    /// Judge is selecting the final result
    Resolving,
    /// Final result recorded; immutable from here on
    Resolved,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Forming => "forming",
            Self::Active => "active",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
        }
    }

    /// Whether joins and submissions are still accepted.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Forming | Self::Active)
    }
}

impl std::fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchConfig {
    pub min_players: usize,
    pub max_players: usize,
    /// Task type spawned with the winning content once the match resolves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_task_type: Option<String>,
    #[serde(default)]
    pub plan_priority: i32,
}

impl MatchConfig {
    pub fn new(min_players: usize, max_players: usize) -> Self {
        Self {
            min_players,
            max_players,
            plan_task_type: None,
            plan_priority: 0,
        }
    }

    pub fn with_plan_task(mut self, task_type: impl Into<String>, priority: i32) -> Self {
        self.plan_task_type = Some(task_type.into());
        self.plan_priority = priority;
        self
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.min_players == 0 {
            return Err(DomainError::Validation(
                "min_players must be at least 1".into(),
            ));
        }
        if self.max_players < self.min_players {
            return Err(DomainError::Validation(format!(
                "max_players ({}) must be >= min_players ({})",
                self.max_players, self.min_players
            )));
        }
        Ok(())
    }
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self::new(2, 4)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub node_id: String,
    pub content: String,
    pub submitted_at: DateTime<Utc>,
    /// Arrival order within the match, used to break timestamp ties.
    pub sequence: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResult {
    pub winner: String,
    pub content: String,
    pub judge: String,
    pub decided_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub id: Uuid,
    pub config: MatchConfig,
    pub participants: Vec<String>,
    pub submissions: HashMap<String, Submission>,
    pub status: MatchStatus,
    pub final_result: Option<FinalResult>,
    pub plan_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    next_sequence: u64,
}

impl Match {
    pub fn new(config: MatchConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            participants: Vec::new(),
            submissions: HashMap::new(),
            status: MatchStatus::Forming,
            final_result: None,
            plan_task_id: None,
            created_at: Utc::now(),
            resolved_at: None,
            next_sequence: 0,
        }
    }

    pub fn is_participant(&self, node_id: &str) -> bool {
        self.participants.iter().any(|p| p == node_id)
    }

    /// Add a participant. Joining twice is a no-op.
    pub fn join(&mut self, node_id: &str) -> DomainResult<()> {
        if !self.status.is_open() {
            return Err(DomainError::MatchClosed(self.id));
        }
        if self.is_participant(node_id) {
            return Ok(());
        }
        if self.participants.len() >= self.config.max_players {
            return Err(DomainError::MatchFull {
                match_id: self.id,
                max_players: self.config.max_players,
            });
        }

        self.participants.push(node_id.to_string());
        if self.status == MatchStatus::Forming && self.participants.len() >= self.config.min_players
        {
            self.status = MatchStatus::Active;
        }
        Ok(())
    }

    /// Store or overwrite a participant's submission.
    pub fn submit(&mut self, node_id: &str, content: impl Into<String>) -> DomainResult<()> {
        if !self.status.is_open() {
            return Err(DomainError::MatchClosed(self.id));
        }
        if !self.is_participant(node_id) {
            return Err(DomainError::NotParticipant {
                match_id: self.id,
                node_id: node_id.to_string(),
            });
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.submissions.insert(
            node_id.to_string(),
            Submission {
                node_id: node_id.to_string(),
                content: content.into(),
                submitted_at: Utc::now(),
                sequence,
            },
        );
        Ok(())
    }

    pub fn ready_to_resolve(&self) -> bool {
        self.status.is_open() && self.submissions.len() >= self.config.min_players
    }

    pub fn begin_resolving(&mut self) -> DomainResult<()> {
        if !self.ready_to_resolve() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: MatchStatus::Resolving.to_string(),
            });
        }
        self.status = MatchStatus::Resolving;
        Ok(())
    }

    pub fn resolve(&mut self, result: FinalResult) -> DomainResult<()> {
        if self.status != MatchStatus::Resolving || self.final_result.is_some() {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: MatchStatus::Resolved.to_string(),
            });
        }
        self.final_result = Some(result);
        self.status = MatchStatus::Resolved;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }

    /// Judge failed; reopen so a later submission can retry resolution.
    pub fn abort_resolving(&mut self) {
        if self.status == MatchStatus::Resolving {
            self.status = MatchStatus::Active;
        }
    }
}
