// SPDX-License-Identifier: MIT
// Rating Engine — Elo pairwise updates over the vote stream.
//
// The authoritative definition of "the" rating is a full replay of the vote
// store in (vote_time, vote_id) order from the default rating. The in-memory
// book kept here is an incrementally maintained cache of that replay and is
// replaced atomically; it can be rebuilt at any time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::ArenaError;
use crate::votes::Vote;

/// Outcome of one pairwise comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Outcome {
    AWins,
    BWins,
    Tie,
    /// Recorded for audit and counted for coverage, but does not move
    /// ratings — neither reviewer is penalized for a paper both handled
    /// badly.
    BothBad,
}

impl Outcome {
    /// Score for side A, or `None` for the rating no-op.
    fn score_a(self) -> Option<f64> {
        match self {
            Outcome::AWins => Some(1.0),
            Outcome::BWins => Some(0.0),
            Outcome::Tie => Some(0.5),
            Outcome::BothBad => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::AWins => "a_wins",
            Outcome::BWins => "b_wins",
            Outcome::Tie => "tie",
            Outcome::BothBad => "both_bad",
        }
    }
}

impl FromStr for Outcome {
    type Err = ArenaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "a_wins" => Ok(Outcome::AWins),
            "b_wins" => Ok(Outcome::BWins),
            "tie" => Ok(Outcome::Tie),
            "both_bad" => Ok(Outcome::BothBad),
            other => Err(ArenaError::InvalidOutcome(other.to_string())),
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected score for the side rated `rating_a` against `rating_b`.
pub fn expected_score(rating_a: f64, rating_b: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) / 400.0))
}

/// Apply one outcome to a pair of ratings. Pure — the caller supplies the
/// current ratings, so the operation is trivially replayable.
pub fn apply_outcome(rating_a: f64, rating_b: f64, outcome: Outcome, k: f64) -> (f64, f64) {
    let Some(score_a) = outcome.score_a() else {
        return (rating_a, rating_b);
    };
    let expected_a = expected_score(rating_a, rating_b);
    let new_a = rating_a + k * (score_a - expected_a);
    let new_b = rating_b + k * ((1.0 - score_a) - (1.0 - expected_a));
    (new_a, new_b)
}

// ─── Derived per-reviewer state ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct ReviewerStats {
    pub rating: f64,
    /// Number of persisted votes naming this reviewer on either side.
    /// Increments for every outcome, BOTH_BAD included.
    pub comparisons: u64,
}

/// One leaderboard row, serialized for the REST surface.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub reviewer: String,
    pub rating: f64,
    pub comparisons: u64,
    /// 95% confidence interval bounds: rating ± 1.96 * K / sqrt(comparisons).
    pub ci_lower: f64,
    pub ci_upper: f64,
}

/// Fold a vote sequence (already in canonical order) into per-reviewer stats.
pub fn replay(votes: &[Vote], k: f64, default_rating: f64) -> HashMap<String, ReviewerStats> {
    let mut book: HashMap<String, ReviewerStats> = HashMap::new();
    let fresh = ReviewerStats {
        rating: default_rating,
        comparisons: 0,
    };
    for vote in votes {
        let a = book.get(&vote.reviewer_a).copied().unwrap_or(fresh);
        let b = book.get(&vote.reviewer_b).copied().unwrap_or(fresh);
        let (new_a, new_b) = apply_outcome(a.rating, b.rating, vote.outcome, k);
        book.insert(
            vote.reviewer_a.clone(),
            ReviewerStats {
                rating: new_a,
                comparisons: a.comparisons + 1,
            },
        );
        book.insert(
            vote.reviewer_b.clone(),
            ReviewerStats {
                rating: new_b,
                comparisons: b.comparisons + 1,
            },
        );
    }
    book
}

// ─── RatingBook ──────────────────────────────────────────────────────────────

/// Incrementally maintained rating cache.
///
/// Requires no cross-request locking beyond atomic replacement: every update
/// swaps state under a short write lock, and `recompute` rebuilds the whole
/// map from a replayed vote sequence.
pub struct RatingBook {
    k: f64,
    default_rating: f64,
    book: RwLock<HashMap<String, ReviewerStats>>,
}

impl RatingBook {
    pub fn new(k: f64, default_rating: f64) -> Self {
        Self {
            k,
            default_rating,
            book: RwLock::new(HashMap::new()),
        }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Rebuild the cache from a full, canonically ordered vote history.
    /// Runs at startup and on every maintenance sweep, so keep it quiet.
    pub async fn recompute(&self, votes: &[Vote]) {
        let book = replay(votes, self.k, self.default_rating);
        debug!(reviewers = book.len(), votes = votes.len(), "ratings recomputed from full history");
        *self.book.write().await = book;
    }

    /// Incrementally apply one freshly persisted vote.
    pub async fn apply_vote(&self, vote: &Vote) {
        let mut book = self.book.write().await;
        let fresh = ReviewerStats {
            rating: self.default_rating,
            comparisons: 0,
        };
        let a = book.get(&vote.reviewer_a).copied().unwrap_or(fresh);
        let b = book.get(&vote.reviewer_b).copied().unwrap_or(fresh);
        let (new_a, new_b) = apply_outcome(a.rating, b.rating, vote.outcome, self.k);
        debug!(
            a = %vote.reviewer_a, rating_a = new_a,
            b = %vote.reviewer_b, rating_b = new_b,
            "ratings updated"
        );
        book.insert(
            vote.reviewer_a.clone(),
            ReviewerStats {
                rating: new_a,
                comparisons: a.comparisons + 1,
            },
        );
        book.insert(
            vote.reviewer_b.clone(),
            ReviewerStats {
                rating: new_b,
                comparisons: b.comparisons + 1,
            },
        );
    }

    pub async fn stats(&self, reviewer: &str) -> Option<ReviewerStats> {
        self.book.read().await.get(reviewer).copied()
    }

    /// Global comparison count for a reviewer (0 when unseen).
    pub async fn comparisons(&self, reviewer: &str) -> u64 {
        self.stats(reviewer).await.map(|s| s.comparisons).unwrap_or(0)
    }

    /// Leaderboard rows sorted descending by rating.
    pub async fn leaderboard(&self) -> Vec<LeaderboardEntry> {
        let book = self.book.read().await;
        let mut entries: Vec<LeaderboardEntry> = book
            .iter()
            .map(|(reviewer, stats)| {
                let (lo, hi) = confidence_interval(stats.rating, stats.comparisons, self.k);
                LeaderboardEntry {
                    reviewer: reviewer.clone(),
                    rating: stats.rating,
                    comparisons: stats.comparisons,
                    ci_lower: lo,
                    ci_upper: hi,
                }
            })
            .collect();
        entries.sort_by(|x, y| {
            y.rating
                .partial_cmp(&x.rating)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| x.reviewer.cmp(&y.reviewer))
        });
        entries
    }

    #[cfg(test)]
    pub(crate) async fn snapshot(&self) -> HashMap<String, ReviewerStats> {
        self.book.read().await.clone()
    }
}

/// 95% CI around a rating given its comparison count. With zero comparisons
/// the interval collapses to the rating itself.
fn confidence_interval(rating: f64, comparisons: u64, k: f64) -> (f64, f64) {
    if comparisons == 0 {
        return (rating, rating);
    }
    let margin = 1.96 * k / (comparisons as f64).sqrt();
    (rating - margin, rating + margin)
}
