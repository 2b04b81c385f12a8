// SPDX-License-Identifier: MIT
// Arena error kinds and their HTTP mapping.

use axum::http::StatusCode;

/// Errors surfaced by the arena core.
///
/// Session-state violations (`SessionAlreadyOpen`, `SessionNotOpen`) and
/// `NoEligiblePairing` are expected, recoverable conditions the UI handles by
/// refreshing state. `StorageUnavailable` propagates unmodified so a client
/// can retry `cast_vote` with the same `vote_id` once storage recovers.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// A stored outcome string could not be parsed.
    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),

    /// A vote with this `vote_id` already exists with different content.
    /// Signals a client bug — never silently overwritten.
    #[error("vote {0} already exists with different content")]
    DuplicateOutcomeConflict(String),

    /// The transactional backend could not be written or read.
    #[error("storage unavailable")]
    StorageUnavailable(#[from] sqlx::Error),

    /// The annotator already holds an open session.
    #[error("annotator {0} already has an open session")]
    SessionAlreadyOpen(String),

    /// The session is not in the open state (double submission, expired,
    /// or abandoned).
    #[error("session {0} is not open")]
    SessionNotOpen(String),

    /// No paper/reviewer pair is currently eligible for this annotator.
    #[error("no eligible pairing available")]
    NoEligiblePairing,

    /// Unknown session or paper reference.
    #[error("not found: {0}")]
    NotFound(String),
}

impl ArenaError {
    /// REST status code for this error kind.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ArenaError::InvalidOutcome(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ArenaError::DuplicateOutcomeConflict(_)
            | ArenaError::SessionAlreadyOpen(_)
            | ArenaError::SessionNotOpen(_) => StatusCode::CONFLICT,
            ArenaError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ArenaError::NoEligiblePairing | ArenaError::NotFound(_) => StatusCode::NOT_FOUND,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_propagation_policy() {
        assert_eq!(
            ArenaError::SessionAlreadyOpen("ann".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ArenaError::NoEligiblePairing.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ArenaError::InvalidOutcome("meh".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ArenaError::StorageUnavailable(sqlx::Error::PoolClosed).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
