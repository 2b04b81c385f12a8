// SPDX-License-Identifier: MIT
// Pairing Selector — picks which paper and reviewer pair an annotator sees.
//
// Coverage-first: among all eligible (paper, pair) combinations, take the
// ones whose two reviewers have the fewest recorded comparisons overall, and
// break ties uniformly at random so concurrent annotators spread out instead
// of piling onto one pairing.

use chrono::{Days, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::error::ArenaError;
use crate::rating::RatingBook;
use crate::registry::{PaperRegistry, ReviewerRegistry};

/// A selected comparison task: one paper, two distinct reviewer kinds.
/// Side assignment is already randomized — `reviewer_a` is the left/first
/// presentation slot, not a ranking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub paper_id: String,
    pub reviewer_a: String,
    pub reviewer_b: String,
}

pub struct PairingSelector {
    pool: SqlitePool,
    ratings: Arc<RatingBook>,
    cooldown_days: u32,
}

impl PairingSelector {
    pub fn new(pool: SqlitePool, ratings: Arc<RatingBook>, cooldown_days: u32) -> Self {
        Self {
            pool,
            ratings,
            cooldown_days,
        }
    }

    /// Pick the next pairing for an annotator, or `NoEligiblePairing` when
    /// every combination is exhausted or cooling down.
    ///
    /// Eligibility per (paper, unordered pair):
    ///   - both reviewer kinds have a non-blank stored review for the paper,
    ///   - neither reviewer is deactivated,
    ///   - this annotator has not voted on this exact combination within the
    ///     cooldown window (calendar days, UTC; zero days disables the
    ///     cooldown entirely).
    pub async fn select(
        &self,
        annotator_id: &str,
        papers: &PaperRegistry,
        reviewers: &ReviewerRegistry,
    ) -> Result<Pairing, ArenaError> {
        let cooled = if self.cooldown_days == 0 {
            HashSet::new()
        } else {
            self.recently_voted(annotator_id).await?
        };

        // Score every eligible combination by total comparison volume.
        let mut best_score = u64::MAX;
        let mut best: Vec<Pairing> = Vec::new();
        for paper in papers.papers() {
            let kinds: Vec<&str> = paper
                .valid_reviewer_kinds()
                .into_iter()
                .filter(|kind| is_eligible(reviewers, kind))
                .collect();
            for i in 0..kinds.len() {
                for j in (i + 1)..kinds.len() {
                    let (a, b) = (kinds[i], kinds[j]);
                    if cooled.contains(&cooldown_key(&paper.paper_id, a, b)) {
                        continue;
                    }
                    let score =
                        self.ratings.comparisons(a).await + self.ratings.comparisons(b).await;
                    if score < best_score {
                        best_score = score;
                        best.clear();
                    }
                    if score == best_score {
                        best.push(Pairing {
                            paper_id: paper.paper_id.clone(),
                            reviewer_a: a.to_string(),
                            reviewer_b: b.to_string(),
                        });
                    }
                }
            }
        }

        let mut rng = rand::thread_rng();
        let mut pairing = best
            .choose(&mut rng)
            .cloned()
            .ok_or(ArenaError::NoEligiblePairing)?;
        // Coin-flip the presentation order so neither kind systematically
        // sits in the first slot.
        if rng.gen::<bool>() {
            std::mem::swap(&mut pairing.reviewer_a, &mut pairing.reviewer_b);
        }
        debug!(
            annotator = annotator_id,
            paper = %pairing.paper_id,
            a = %pairing.reviewer_a,
            b = %pairing.reviewer_b,
            candidates = best.len(),
            comparisons = best_score,
            "pairing selected"
        );
        Ok(pairing)
    }

    /// Combinations this annotator voted on within the cooldown window.
    /// The window starts at UTC midnight `cooldown_days - 1` days back, so
    /// one day of cooldown means "not again today".
    async fn recently_voted(&self, annotator_id: &str) -> Result<HashSet<String>, ArenaError> {
        let back = self.cooldown_days.saturating_sub(1) as u64;
        let window_start = Utc::now()
            .date_naive()
            .checked_sub_days(Days::new(back))
            .unwrap_or_else(|| Utc::now().date_naive())
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().to_rfc3339())
            .unwrap_or_default();

        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT v.paper_id, v.reviewer_a, v.reviewer_b
             FROM votes v JOIN sessions s ON v.session_id = s.session_id
             WHERE s.annotator_id = ? AND v.vote_time >= ?",
        )
        .bind(annotator_id)
        .bind(&window_start)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(paper, a, b)| cooldown_key(&paper, &a, &b))
            .collect())
    }
}

/// Unknown kinds stay eligible: the reviewer registry is display metadata and
/// may lag behind the paper snapshot. Only an explicit deactivation excludes.
fn is_eligible(reviewers: &ReviewerRegistry, kind: &str) -> bool {
    reviewers.get(kind).map(|r| r.active).unwrap_or(true)
}

fn cooldown_key(paper_id: &str, a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{paper_id}\u{1f}{lo}\u{1f}{hi}")
}
