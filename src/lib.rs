// SPDX-License-Identifier: MIT
// arenad — pairwise review-quality arena: Elo ratings over blind votes.

pub mod config;
pub mod error;
pub mod pairing;
pub mod rating;
pub mod registry;
pub mod rest;
pub mod session;
pub mod storage;
pub mod votes;

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

use config::ArenaConfig;
use pairing::PairingSelector;
use rating::RatingBook;
use registry::{PaperRegistry, ReviewerRegistry};
use session::SessionManager;
use storage::Storage;
use votes::VoteStore;

/// Shared state threaded through every REST handler and background task.
pub struct AppContext {
    pub config: ArenaConfig,
    pub storage: Storage,
    /// Papers are read-mostly; writes happen only on administrative review
    /// appends.
    pub papers: RwLock<PaperRegistry>,
    pub reviewers: RwLock<ReviewerRegistry>,
    pub votes: Arc<VoteStore>,
    pub ratings: Arc<RatingBook>,
    pub sessions: SessionManager,
    pub pairing: PairingSelector,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire up every component: open storage, load both registries, and
    /// rebuild the rating book from the full vote history so the in-memory
    /// cache starts from the canonical replay.
    pub async fn new(config: ArenaConfig) -> Result<Arc<Self>> {
        let storage = Storage::new(&config.data_dir).await?;
        let votes = Arc::new(VoteStore::new(storage.pool(), &config.data_dir));
        let ratings = Arc::new(RatingBook::new(config.k_factor, config.default_rating));

        ratings.recompute(&votes.all_votes().await?).await;

        let papers = PaperRegistry::from_jsonl(&config.papers_file)?;
        let reviewers = ReviewerRegistry::from_jsonl(&config.reviewers_file)?;

        let sessions = SessionManager::new(
            storage.pool(),
            Arc::clone(&votes),
            Arc::clone(&ratings),
            config.session_idle_timeout_secs,
        );
        let pairing = PairingSelector::new(
            storage.pool(),
            Arc::clone(&ratings),
            config.pairing_cooldown_days,
        );

        info!(
            papers = papers.len(),
            reviewers = reviewers.reviewers().len(),
            "arena context initialized"
        );

        Ok(Arc::new(Self {
            config,
            storage,
            papers: RwLock::new(papers),
            reviewers: RwLock::new(reviewers),
            votes,
            ratings,
            sessions,
            pairing,
            started_at: std::time::Instant::now(),
        }))
    }

    /// One background maintenance pass: expire idle sessions, revert any
    /// stranded vote claims, close SQLite/log divergence left by a crash
    /// between the two vote writes, and re-anchor the rating cache to the
    /// canonical replay.
    pub async fn maintenance_sweep(&self) {
        if let Err(e) = self.sessions.expire_stale_sessions(chrono::Utc::now()).await {
            tracing::warn!(err = %e, "session expiry sweep failed");
        }
        if let Err(e) = self.sessions.repair_stranded_sessions(chrono::Utc::now()).await {
            tracing::warn!(err = %e, "stranded session repair failed");
        }
        if let Err(e) = self.votes.reconcile().await {
            tracing::warn!(err = %e, "vote log reconciliation failed");
        }
        // Concurrent casts can reach the incremental cache out of canonical
        // (vote_time, vote_id) order, and Elo updates do not commute. A full
        // replay every sweep bounds that drift to one sweep interval.
        match self.votes.all_votes().await {
            Ok(votes) => self.ratings.recompute(&votes).await,
            Err(e) => tracing::warn!(err = %e, "rating recompute skipped"),
        }
    }
}
