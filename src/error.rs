use serde::Serialize;
use std::fmt;
use strum::Display;
use thiserror::Error;
use tokio_cron_scheduler::JobSchedulerError;

/// Custom Error and Result types to unify errors from all sources.
pub type RankResult<T> = Result<T, RankError>;

/// External collaborators the ranking core talks to. Only used for logging, never shown to
/// callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dependency {
    ScoreHistory,
    LeaderboardStore,
    RankingCache,
    ConfigCache,
    LockManager,
    Scheduler,
}

#[derive(Debug, Error)]
pub enum RankError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Leaderboard already exists: {0}")]
    DuplicateLeaderboard(String),
    #[error("Rebuild already in progress for leaderboard {0}")]
    RebuildInProgress(String),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("{dependency} unavailable: {reason}")]
    Unavailable {
        dependency: Dependency,
        reason: String,
    },
    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Validation,
    DependencyUnavailable,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::NotFound => write!(f, "not_found"),
            ErrorKind::Conflict => write!(f, "conflict"),
            ErrorKind::Validation => write!(f, "validation_error"),
            ErrorKind::DependencyUnavailable => write!(f, "dependency_unavailable"),
            ErrorKind::Internal => write!(f, "internal"),
        }
    }
}

impl RankError {
    pub fn unavailable(dependency: Dependency, reason: impl Into<String>) -> Self {
        RankError::Unavailable {
            dependency,
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RankError::NotFound(_) => ErrorKind::NotFound,
            RankError::DuplicateLeaderboard(_) | RankError::RebuildInProgress(_) => {
                ErrorKind::Conflict
            }
            RankError::Validation(_) => ErrorKind::Validation,
            RankError::Unavailable { .. } => ErrorKind::DependencyUnavailable,
            RankError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Errors the caller can fix by changing the request.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound | ErrorKind::Conflict | ErrorKind::Validation
        )
    }

    /// Message safe to hand back to callers. Server-side failures are flattened so that store
    /// identities and internal details stay in the logs.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::DependencyUnavailable => "Service temporarily unavailable".to_string(),
            ErrorKind::Internal => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<serde_json::Error> for RankError {
    fn from(error: serde_json::Error) -> Self {
        RankError::Internal(format!("Serialization failure: {error}"))
    }
}

impl From<JobSchedulerError> for RankError {
    fn from(error: JobSchedulerError) -> Self {
        RankError::unavailable(Dependency::Scheduler, format!("{error:?}"))
    }
}

impl From<minijinja::Error> for RankError {
    fn from(error: minijinja::Error) -> Self {
        RankError::Internal(format!("Template rendering failure: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflicts_are_distinguishable() {
        let duplicate = RankError::DuplicateLeaderboard("lb".into());
        let rebuild = RankError::RebuildInProgress("lb".into());
        assert_eq!(duplicate.kind(), ErrorKind::Conflict);
        assert_eq!(rebuild.kind(), ErrorKind::Conflict);
        assert!(matches!(rebuild, RankError::RebuildInProgress(_)));
        assert_ne!(duplicate.public_message(), rebuild.public_message());
    }

    #[test]
    fn server_errors_do_not_leak_dependency() {
        let err = RankError::unavailable(Dependency::ScoreHistory, "connection refused to 10.0.0.3");
        assert!(!err.is_client_error());
        assert!(!err.public_message().contains("score_history"));
        assert!(!err.public_message().contains("10.0.0.3"));
        assert!(err.to_string().contains("score_history"));
    }

    #[test]
    fn validation_is_client_error() {
        assert!(RankError::Validation("negative score".into()).is_client_error());
        assert!(RankError::NotFound("lb".into()).is_client_error());
        assert!(!RankError::Internal("decode".into()).is_client_error());
    }
}
