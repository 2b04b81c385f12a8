// SPDX-License-Identifier: MIT
// Vote Store — durable, append-only record of every cast vote, written to
// two independent backends: transactional SQLite first (authoritative), then
// the line-oriented JSONL log. A crash between the two writes can only leave
// the log missing an entry, never the reverse; reconcile() closes the window.

pub mod log;

use sqlx::SqlitePool;
use std::path::Path;
use tracing::{error, info, warn};

use crate::error::ArenaError;
use crate::rating::Outcome;
use log::VoteLog;

/// One completed comparison's outcome. Immutable once persisted — votes are
/// never edited or deleted, only superseded logically by later votes.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    /// Unique vote identifier, generated at cast time (UUID v4) unless a
    /// retrying client supplies the one from its first attempt.
    pub vote_id: String,
    pub paper_id: String,
    pub reviewer_a: String,
    pub reviewer_b: String,
    pub outcome: Outcome,
    /// Back-reference to the session this vote closed (non-owning).
    pub session_id: String,
    /// RFC 3339 cast timestamp.
    pub vote_time: String,
}

pub struct VoteStore {
    pool: SqlitePool,
    log: VoteLog,
}

impl VoteStore {
    pub fn new(pool: SqlitePool, data_dir: &Path) -> Self {
        Self {
            pool,
            log: VoteLog::new(data_dir),
        }
    }

    /// Durably persist a vote, exactly once logically.
    ///
    /// Idempotent under identical `vote_id` retry: if the vote already exists
    /// with the same content, this is a success and nothing is written. A
    /// different payload under an existing `vote_id` fails with
    /// `DuplicateOutcomeConflict`. If the SQLite insert fails, the log write
    /// is not attempted — that ordering is what guarantees the log never
    /// holds entries SQLite lacks.
    pub async fn cast_vote(&self, vote: &Vote) -> Result<(), ArenaError> {
        if let Some(existing) = self.get_vote(&vote.vote_id).await? {
            return if existing == *vote {
                info!(vote_id = %vote.vote_id, "duplicate cast with identical payload — idempotent retry");
                Ok(())
            } else {
                Err(ArenaError::DuplicateOutcomeConflict(vote.vote_id.clone()))
            };
        }

        let insert = sqlx::query(
            "INSERT INTO votes (vote_id, paper_id, reviewer_a, reviewer_b, outcome, session_id, vote_time)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&vote.vote_id)
        .bind(&vote.paper_id)
        .bind(&vote.reviewer_a)
        .bind(&vote.reviewer_b)
        .bind(&vote.outcome)
        .bind(&vote.session_id)
        .bind(&vote.vote_time)
        .execute(&self.pool)
        .await;

        match insert {
            Ok(_) => {}
            // Lost a race with a concurrent cast of the same vote_id: the
            // row that won decides. Identical content is a clean retry.
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                let existing = self
                    .get_vote(&vote.vote_id)
                    .await?
                    .ok_or_else(|| ArenaError::NotFound(vote.vote_id.clone()))?;
                if existing != *vote {
                    return Err(ArenaError::DuplicateOutcomeConflict(vote.vote_id.clone()));
                }
                return Ok(());
            }
            Err(e) => return Err(ArenaError::StorageUnavailable(e)),
        }

        // SQLite committed; the vote is durable. A failed log append here is
        // the known, bounded divergence window — reconcile() appends it later.
        if let Err(e) = self.log.append(vote).await {
            warn!(vote_id = %vote.vote_id, err = %e, "vote log append failed — will reconcile");
        }

        info!(
            vote_id = %vote.vote_id,
            paper = %vote.paper_id,
            a = %vote.reviewer_a,
            b = %vote.reviewer_b,
            outcome = %vote.outcome,
            "vote recorded"
        );
        Ok(())
    }

    pub async fn get_vote(&self, vote_id: &str) -> Result<Option<Vote>, ArenaError> {
        Ok(sqlx::query_as("SELECT * FROM votes WHERE vote_id = ?")
            .bind(vote_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    /// Every vote ever cast, in canonical `(vote_time, vote_id)` order — the
    /// replay order the Rating Engine's full recomputation folds over.
    pub async fn all_votes(&self) -> Result<Vec<Vote>, ArenaError> {
        Ok(
            sqlx::query_as("SELECT * FROM votes ORDER BY vote_time ASC, vote_id ASC")
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn votes_for_session(&self, session_id: &str) -> Result<Vec<Vote>, ArenaError> {
        Ok(sqlx::query_as(
            "SELECT * FROM votes WHERE session_id = ? ORDER BY vote_time ASC, vote_id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn votes_for_reviewer(&self, reviewer_id: &str) -> Result<Vec<Vote>, ArenaError> {
        Ok(sqlx::query_as(
            "SELECT * FROM votes WHERE reviewer_a = ? OR reviewer_b = ?
             ORDER BY vote_time ASC, vote_id ASC",
        )
        .bind(reviewer_id)
        .bind(reviewer_id)
        .fetch_all(&self.pool)
        .await?)
    }

    pub async fn count_votes(&self) -> Result<u64, ArenaError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM votes")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    /// Restore cross-backend vote-set equality: append every vote present in
    /// SQLite but absent from the log. Idempotent and safe under live traffic
    /// — the log is append-only, so concurrent casts and reconciliation never
    /// rewrite each other's entries. Returns the number of entries appended.
    ///
    /// The opposite divergence (log entries SQLite lacks) cannot occur given
    /// the write ordering in `cast_vote`; if observed it is an invariant
    /// violation, logged at ERROR for investigation and never auto-corrected.
    pub async fn reconcile(&self) -> anyhow::Result<u64> {
        let logged = self.log.vote_ids().await?;
        let stored = self.all_votes().await?;

        let stored_ids: std::collections::HashSet<&str> =
            stored.iter().map(|v| v.vote_id.as_str()).collect();
        for orphan in logged.iter().filter(|id| !stored_ids.contains(id.as_str())) {
            error!(vote_id = %orphan, "vote log entry missing from SQLite — invariant violation, investigate");
        }

        let mut appended = 0u64;
        for vote in stored.iter().filter(|v| !logged.contains(&v.vote_id)) {
            if let Err(e) = self.log.append(vote).await {
                warn!(vote_id = %vote.vote_id, err = %e, "reconcile append failed — will retry next sweep");
                break;
            }
            appended += 1;
        }
        if appended > 0 {
            info!(appended, "reconciled vote log");
        }
        Ok(appended)
    }

    #[cfg(test)]
    pub(crate) fn log(&self) -> &VoteLog {
        &self.log
    }
}
