//! Property tests for the Elo replay: determinism, zero-sum conservation,
//! and comparison accounting over arbitrary vote histories.

use arenad::rating::{replay, Outcome};
use arenad::votes::Vote;
use proptest::prelude::*;

const REVIEWERS: &[&str] = &["human", "barebones", "liang_etal", "multi_agent"];
const K: f64 = 32.0;
const DEFAULT: f64 = 1000.0;

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        Just(Outcome::AWins),
        Just(Outcome::BWins),
        Just(Outcome::Tie),
        Just(Outcome::BothBad),
    ]
}

fn vote_strategy() -> impl Strategy<Value = (usize, usize, Outcome)> {
    (0..REVIEWERS.len(), 0..REVIEWERS.len() - 1, outcome_strategy())
}

fn build_votes(raw: &[(usize, usize, Outcome)]) -> Vec<Vote> {
    raw.iter()
        .enumerate()
        .map(|(i, &(a, b_offset, outcome))| {
            // Skip over `a` so the two sides are always distinct.
            let b = (a + 1 + b_offset) % REVIEWERS.len();
            Vote {
                vote_id: format!("v{i:04}"),
                paper_id: "p1".to_string(),
                reviewer_a: REVIEWERS[a].to_string(),
                reviewer_b: REVIEWERS[b].to_string(),
                outcome,
                session_id: format!("s{i:04}"),
                vote_time: format!("2026-01-01T00:{:02}:{:02}+00:00", i / 60, i % 60),
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn replay_is_deterministic(raw in prop::collection::vec(vote_strategy(), 0..60)) {
        let votes = build_votes(&raw);
        let first = replay(&votes, K, DEFAULT);
        let second = replay(&votes, K, DEFAULT);
        prop_assert_eq!(first.len(), second.len());
        for (reviewer, stats) in &first {
            let other = second[reviewer];
            prop_assert_eq!(stats.rating, other.rating);
            prop_assert_eq!(stats.comparisons, other.comparisons);
        }
    }

    #[test]
    fn ratings_are_zero_sum(raw in prop::collection::vec(vote_strategy(), 1..60)) {
        let votes = build_votes(&raw);
        let book = replay(&votes, K, DEFAULT);
        let total: f64 = book.values().map(|s| s.rating).sum();
        let expected = DEFAULT * book.len() as f64;
        prop_assert!((total - expected).abs() < 1e-6,
            "rating mass changed: {} vs {}", total, expected);
    }

    #[test]
    fn every_vote_counts_both_sides(raw in prop::collection::vec(vote_strategy(), 0..60)) {
        let votes = build_votes(&raw);
        let book = replay(&votes, K, DEFAULT);
        for reviewer in REVIEWERS {
            let expected = votes
                .iter()
                .filter(|v| v.reviewer_a == *reviewer || v.reviewer_b == *reviewer)
                .count() as u64;
            let actual = book.get(*reviewer).map(|s| s.comparisons).unwrap_or(0);
            prop_assert_eq!(actual, expected, "miscounted {}", reviewer);
        }
    }

    #[test]
    fn both_bad_votes_never_move_ratings(raw in prop::collection::vec(vote_strategy(), 0..60)) {
        let votes = build_votes(&raw);
        let with_noops = replay(&votes, K, DEFAULT);
        let scored: Vec<Vote> = votes
            .iter()
            .filter(|v| v.outcome != Outcome::BothBad)
            .cloned()
            .collect();
        let without = replay(&scored, K, DEFAULT);
        for (reviewer, stats) in &without {
            prop_assert_eq!(stats.rating, with_noops[reviewer].rating);
        }
    }
}
