// SPDX-License-Identifier: MIT
// Session Manager — one in-progress comparison per active annotator.
//
// State machine: OPEN --(vote cast)--> VOTED, OPEN --(idle timeout)-->
// EXPIRED, OPEN --(explicit abandon)--> ABANDONED. All three are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ArenaError;
use crate::rating::{Outcome, RatingBook};
use crate::votes::{Vote, VoteStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SessionState {
    Open,
    Voted,
    Expired,
    Abandoned,
}

/// One annotator's in-progress (or finished) comparison task.
///
/// A session owns at most one eventual vote; the vote's pairing is always
/// taken from the session row, so a vote can never reference a pairing the
/// annotator was not actually shown.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub annotator_id: String,
    pub paper_id: String,
    pub reviewer_a: String,
    pub reviewer_b: String,
    pub state: SessionState,
    pub opened_at: String,
    pub closed_at: Option<String>,
}

pub struct SessionManager {
    pool: SqlitePool,
    votes: Arc<VoteStore>,
    ratings: Arc<RatingBook>,
    idle_timeout: chrono::Duration,
}

impl SessionManager {
    pub fn new(
        pool: SqlitePool,
        votes: Arc<VoteStore>,
        ratings: Arc<RatingBook>,
        idle_timeout_secs: u64,
    ) -> Self {
        Self {
            pool,
            votes,
            ratings,
            idle_timeout: chrono::Duration::seconds(idle_timeout_secs as i64),
        }
    }

    /// Open a comparison session for an annotator.
    ///
    /// The single-active-session invariant is enforced by the partial unique
    /// index on open sessions: of two concurrent opens, exactly one observes
    /// `SessionAlreadyOpen`.
    pub async fn open_session(
        &self,
        annotator_id: &str,
        paper_id: &str,
        reviewer_a: &str,
        reviewer_b: &str,
    ) -> Result<Session, ArenaError> {
        let session_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let insert = sqlx::query(
            "INSERT INTO sessions
             (session_id, annotator_id, paper_id, reviewer_a, reviewer_b, state, opened_at)
             VALUES (?, ?, ?, ?, ?, 'open', ?)",
        )
        .bind(&session_id)
        .bind(annotator_id)
        .bind(paper_id)
        .bind(reviewer_a)
        .bind(reviewer_b)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => {}
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(ArenaError::SessionAlreadyOpen(annotator_id.to_string()));
            }
            Err(e) => return Err(ArenaError::StorageUnavailable(e)),
        }

        info!(session = %session_id, annotator = annotator_id, paper = paper_id,
              a = reviewer_a, b = reviewer_b, "session opened");
        self.get_session(&session_id)
            .await?
            .ok_or_else(|| ArenaError::NotFound(session_id))
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, ArenaError> {
        Ok(sqlx::query_as("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn open_session_for(
        &self,
        annotator_id: &str,
    ) -> Result<Option<Session>, ArenaError> {
        Ok(
            sqlx::query_as("SELECT * FROM sessions WHERE annotator_id = ? AND state = 'open'")
                .bind(annotator_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    /// Record the outcome for an open session.
    ///
    /// The OPEN→VOTED transition is a single conditional UPDATE, so double
    /// submissions and votes on terminal sessions fail with `SessionNotOpen`
    /// regardless of timing. Persistence is delegated to the vote store; if
    /// storage is unavailable the claim is rolled back so the client can
    /// retry with the same `vote_id`.
    pub async fn record_vote(
        &self,
        session_id: &str,
        outcome: Outcome,
        vote_id: Option<String>,
    ) -> Result<Vote, ArenaError> {
        let now = Utc::now().to_rfc3339();
        let claimed = sqlx::query(
            "UPDATE sessions SET state = 'voted', closed_at = ?
             WHERE session_id = ? AND state = 'open'",
        )
        .bind(&now)
        .bind(session_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if claimed == 0 {
            let session = self
                .get_session(session_id)
                .await?
                .ok_or_else(|| ArenaError::NotFound(session_id.to_string()))?;
            // A retry after a response was lost in flight: the session is
            // already VOTED and its vote is durable — hand that vote back.
            if session.state == SessionState::Voted {
                if let Some(existing) = self
                    .votes
                    .votes_for_session(session_id)
                    .await?
                    .into_iter()
                    .find(|v| v.outcome == outcome)
                {
                    let id_matches = match vote_id.as_deref() {
                        Some(id) => id == existing.vote_id,
                        None => true,
                    };
                    if id_matches {
                        return Ok(existing);
                    }
                }
            }
            return Err(ArenaError::SessionNotOpen(session_id.to_string()));
        }

        let session = self
            .get_session(session_id)
            .await?
            .ok_or_else(|| ArenaError::NotFound(session_id.to_string()))?;

        let vote = Vote {
            vote_id: vote_id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            paper_id: session.paper_id,
            reviewer_a: session.reviewer_a,
            reviewer_b: session.reviewer_b,
            outcome,
            session_id: session_id.to_string(),
            vote_time: now,
        };

        if let Err(e) = self.votes.cast_vote(&vote).await {
            // Leave the session claimable again; the vote never became
            // durable, so a client retry must be possible.
            sqlx::query(
                "UPDATE sessions SET state = 'open', closed_at = NULL
                 WHERE session_id = ? AND state = 'voted'",
            )
            .bind(session_id)
            .execute(&self.pool)
            .await?;
            return Err(e);
        }

        self.ratings.apply_vote(&vote).await;
        Ok(vote)
    }

    /// Explicit close without a vote (annotator navigated away).
    pub async fn abandon(&self, session_id: &str) -> Result<(), ArenaError> {
        let now = Utc::now().to_rfc3339();
        let changed = sqlx::query(
            "UPDATE sessions SET state = 'abandoned', closed_at = ?
             WHERE session_id = ? AND state = 'open'",
        )
        .bind(&now)
        .bind(session_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if changed == 0 {
            return match self.get_session(session_id).await? {
                Some(_) => Err(ArenaError::SessionNotOpen(session_id.to_string())),
                None => Err(ArenaError::NotFound(session_id.to_string())),
            };
        }
        info!(session = session_id, "session abandoned");
        Ok(())
    }

    /// Maintenance sweep companion to `expire_stale_sessions`: revert VOTED
    /// sessions whose vote never became durable.
    ///
    /// That state can only arise when `record_vote` claimed the session, the
    /// vote store failed, and the claim rollback itself failed too. The
    /// one-minute grace keeps claims that are legitimately in flight (claimed
    /// but not yet inserted) out of reach. Reverted sessions reopen and fall
    /// under the normal idle-expiry rules.
    pub async fn repair_stranded_sessions(&self, now: DateTime<Utc>) -> Result<u64, ArenaError> {
        let grace = (now - chrono::Duration::seconds(60)).to_rfc3339();
        let repaired = sqlx::query(
            "UPDATE sessions SET state = 'open', closed_at = NULL
             WHERE state = 'voted'
               AND closed_at < ?
               AND session_id NOT IN (SELECT session_id FROM votes)",
        )
        .bind(&grace)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if repaired > 0 {
            warn!(repaired, "reverted voted sessions with no durable vote");
        }
        Ok(repaired)
    }

    /// Maintenance sweep: expire every OPEN session idle past the timeout.
    ///
    /// Callable repeatedly — already-terminal sessions are untouched, so a
    /// second run right after the first reports zero. Returns the number of
    /// sessions expired.
    pub async fn expire_stale_sessions(&self, now: DateTime<Utc>) -> Result<u64, ArenaError> {
        let cutoff = (now - self.idle_timeout).to_rfc3339();
        let expired = sqlx::query(
            "UPDATE sessions SET state = 'expired', closed_at = ?
             WHERE state = 'open' AND opened_at < ?",
        )
        .bind(now.to_rfc3339())
        .bind(&cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if expired > 0 {
            info!(expired, "stale sessions expired");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    async fn manager(dir: &std::path::Path, idle_secs: u64) -> SessionManager {
        let storage = Storage::in_memory().await.unwrap();
        let votes = Arc::new(VoteStore::new(storage.pool(), dir));
        let ratings = Arc::new(RatingBook::new(32.0, 1000.0));
        SessionManager::new(storage.pool(), votes, ratings, idle_secs)
    }

    #[tokio::test]
    async fn second_open_for_same_annotator_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1800).await;
        mgr.open_session("ann-1", "p1", "human", "barebones")
            .await
            .unwrap();
        let err = mgr.open_session("ann-1", "p2", "human", "liang_etal").await;
        assert!(matches!(err, Err(ArenaError::SessionAlreadyOpen(_))));

        // A different annotator is unaffected.
        mgr.open_session("ann-2", "p1", "human", "barebones")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn vote_closes_session_and_pins_pairing() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1800).await;
        let session = mgr
            .open_session("ann-1", "p1", "human", "barebones")
            .await
            .unwrap();

        let vote = mgr
            .record_vote(&session.session_id, Outcome::AWins, None)
            .await
            .unwrap();
        assert_eq!(vote.paper_id, "p1");
        assert_eq!(vote.reviewer_a, "human");
        assert_eq!(vote.reviewer_b, "barebones");

        let closed = mgr.get_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(closed.state, SessionState::Voted);
        assert!(closed.closed_at.is_some());

        // Double submission with a different outcome is rejected.
        let err = mgr
            .record_vote(&session.session_id, Outcome::BWins, None)
            .await;
        assert!(matches!(err, Err(ArenaError::SessionNotOpen(_))));
    }

    #[tokio::test]
    async fn lost_response_retry_returns_the_stored_vote() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1800).await;
        let session = mgr
            .open_session("ann-1", "p1", "human", "barebones")
            .await
            .unwrap();
        let first = mgr
            .record_vote(&session.session_id, Outcome::Tie, None)
            .await
            .unwrap();
        let retry = mgr
            .record_vote(&session.session_id, Outcome::Tie, Some(first.vote_id.clone()))
            .await
            .unwrap();
        assert_eq!(retry.vote_id, first.vote_id);
        assert_eq!(mgr.votes.count_votes().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn abandon_is_terminal_and_fails_cleanly_when_repeated() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1800).await;
        let session = mgr
            .open_session("ann-1", "p1", "human", "barebones")
            .await
            .unwrap();

        mgr.abandon(&session.session_id).await.unwrap();
        assert!(matches!(
            mgr.abandon(&session.session_id).await,
            Err(ArenaError::SessionNotOpen(_))
        ));
        assert!(matches!(
            mgr.record_vote(&session.session_id, Outcome::AWins, None).await,
            Err(ArenaError::SessionNotOpen(_))
        ));
        assert!(matches!(
            mgr.abandon("no-such-session").await,
            Err(ArenaError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn expiry_sweep_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 0).await; // everything is instantly stale
        mgr.open_session("ann-1", "p1", "human", "barebones")
            .await
            .unwrap();

        let later = Utc::now() + chrono::Duration::seconds(5);
        assert_eq!(mgr.expire_stale_sessions(later).await.unwrap(), 1);
        assert_eq!(mgr.expire_stale_sessions(later).await.unwrap(), 0);

        // The annotator's slot is free again.
        mgr.open_session("ann-1", "p2", "human", "liang_etal")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn stranded_vote_claims_revert_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1800).await;
        let old = (Utc::now() - chrono::Duration::seconds(300)).to_rfc3339();

        // A claim whose vote store write failed and whose rollback failed
        // too: VOTED with no vote row.
        sqlx::query(
            "INSERT INTO sessions VALUES ('s-stranded', 'ann-1', 'p1', 'human', 'barebones', 'voted', ?, ?)",
        )
        .bind(&old)
        .bind(&old)
        .execute(&mgr.pool)
        .await
        .unwrap();

        // A genuinely voted session, equally old, keeps its terminal state.
        let voted = mgr
            .open_session("ann-2", "p1", "human", "barebones")
            .await
            .unwrap();
        mgr.record_vote(&voted.session_id, Outcome::AWins, None)
            .await
            .unwrap();
        sqlx::query("UPDATE sessions SET closed_at = ? WHERE session_id = ?")
            .bind(&old)
            .bind(&voted.session_id)
            .execute(&mgr.pool)
            .await
            .unwrap();

        assert_eq!(mgr.repair_stranded_sessions(Utc::now()).await.unwrap(), 1);
        let reopened = mgr.get_session("s-stranded").await.unwrap().unwrap();
        assert_eq!(reopened.state, SessionState::Open);
        assert!(reopened.closed_at.is_none());
        let untouched = mgr.get_session(&voted.session_id).await.unwrap().unwrap();
        assert_eq!(untouched.state, SessionState::Voted);

        // A claim still inside the grace window is left alone — it may be a
        // cast_vote between the claim and the insert.
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO sessions VALUES ('s-fresh', 'ann-3', 'p1', 'human', 'barebones', 'voted', ?, ?)",
        )
        .bind(&now)
        .bind(&now)
        .execute(&mgr.pool)
        .await
        .unwrap();
        assert_eq!(mgr.repair_stranded_sessions(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unexpired_sessions_survive_the_sweep() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager(dir.path(), 1800).await;
        let session = mgr
            .open_session("ann-1", "p1", "human", "barebones")
            .await
            .unwrap();
        assert_eq!(mgr.expire_stale_sessions(Utc::now()).await.unwrap(), 0);
        let still_open = mgr.get_session(&session.session_id).await.unwrap().unwrap();
        assert_eq!(still_open.state, SessionState::Open);
    }
}
