// SPDX-License-Identifier: MIT
// Entity registries — immutable-per-load catalogs of papers and reviewer
// models. Read mostly; mutated only by administrative registration.

pub mod papers;
pub mod reviewers;

pub use papers::{Paper, PaperRegistry};
pub use reviewers::{ReviewerInfo, ReviewerRegistry};
