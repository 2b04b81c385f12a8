pub mod comparisons;
pub mod health;
pub mod leaderboard;
pub mod papers;
pub mod reviewers;
