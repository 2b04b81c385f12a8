use anyhow::Result;
use sqlx::{sqlite::SqliteConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};

/// Shared SQLite handle for the arena.
///
/// One pool, WAL journal mode, created under `{data_dir}/arena.db`. The vote
/// store and the session manager share this pool — no separate connections.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub async fn new(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("arena.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true);

        let pool = SqlitePool::connect_with(opts).await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// In-memory storage for tests. Pinned to a single connection — every
    /// pooled connection to `:memory:` would otherwise see its own database.
    pub async fn in_memory() -> Result<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;
        Self::migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    async fn migrate(pool: &SqlitePool) -> Result<()> {
        // Votes are append-only: no UPDATE or DELETE path exists anywhere in
        // the crate. `vote_id` uniqueness is the idempotency anchor for
        // client retries.
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS votes (
                 vote_id    TEXT PRIMARY KEY,
                 paper_id   TEXT NOT NULL,
                 reviewer_a TEXT NOT NULL,
                 reviewer_b TEXT NOT NULL,
                 outcome    TEXT NOT NULL,
                 session_id TEXT NOT NULL,
                 vote_time  TEXT NOT NULL,
                 CHECK (reviewer_a <> reviewer_b)
             )",
        )
        .execute(pool)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_session ON votes(session_id)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_votes_time ON votes(vote_time, vote_id)")
            .execute(pool)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sessions (
                 session_id   TEXT PRIMARY KEY,
                 annotator_id TEXT NOT NULL,
                 paper_id     TEXT NOT NULL,
                 reviewer_a   TEXT NOT NULL,
                 reviewer_b   TEXT NOT NULL,
                 state        TEXT NOT NULL
                              CHECK (state IN ('open','voted','expired','abandoned')),
                 opened_at    TEXT NOT NULL,
                 closed_at    TEXT,
                 CHECK (reviewer_a <> reviewer_b)
             )",
        )
        .execute(pool)
        .await?;
        // The single-open-session invariant, enforced by the backend itself:
        // two concurrent opens for one annotator cannot both commit.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS ux_sessions_open_annotator
             ON sessions(annotator_id) WHERE state = 'open'",
        )
        .execute(pool)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_annotator ON sessions(annotator_id)",
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let storage = Storage::in_memory().await.unwrap();
        // Second run must not error on existing tables/indexes.
        Storage::migrate(&storage.pool()).await.unwrap();
    }

    #[tokio::test]
    async fn votes_reject_self_comparison() {
        let storage = Storage::in_memory().await.unwrap();
        let err = sqlx::query(
            "INSERT INTO votes VALUES ('v1', 'p1', 'same', 'same', 'a_wins', 's1', '2026-01-01T00:00:00Z')",
        )
        .execute(&storage.pool())
        .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn sessions_reject_self_comparison() {
        let storage = Storage::in_memory().await.unwrap();
        let err = sqlx::query(
            "INSERT INTO sessions VALUES ('s1', 'ann-1', 'p1', 'same', 'same', 'open', '2026-01-01T00:00:00Z', NULL)",
        )
        .execute(&storage.pool())
        .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn one_open_session_per_annotator_at_db_level() {
        let storage = Storage::in_memory().await.unwrap();
        let insert = "INSERT INTO sessions
                      (session_id, annotator_id, paper_id, reviewer_a, reviewer_b, state, opened_at)
                      VALUES (?, 'ann-1', 'p1', 'a', 'b', 'open', '2026-01-01T00:00:00Z')";
        sqlx::query(insert)
            .bind("s1")
            .execute(&storage.pool())
            .await
            .unwrap();
        let second = sqlx::query(insert).bind("s2").execute(&storage.pool()).await;
        assert!(second.is_err());
    }
}
