use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

/// A paper under comparison, with stored review texts per reviewer kind.
///
/// Reviewer kinds are an open set of string keys — registering a new
/// competing reviewer needs no schema change, only a new key in `reviews`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub paper_id: String,
    pub title: String,
    /// Source document reference, relative to the PDF resource folder.
    pub pdf_path: String,
    /// Reviewer-kind tag → ordered list of stored review texts.
    #[serde(flatten)]
    pub reviews: BTreeMap<String, Vec<String>>,
}

impl Paper {
    /// Reviewer kinds that actually have content for this paper: a non-empty
    /// list with at least one non-blank entry.
    pub fn valid_reviewer_kinds(&self) -> Vec<&str> {
        self.reviews
            .iter()
            .filter(|(_, reviews)| reviews.iter().any(|r| !r.trim().is_empty()))
            .map(|(kind, _)| kind.as_str())
            .collect()
    }

    /// First non-blank review stored under `kind`, if any.
    pub fn review_for(&self, kind: &str) -> Option<&str> {
        self.reviews
            .get(kind)?
            .iter()
            .map(|r| r.as_str())
            .find(|r| !r.trim().is_empty())
    }
}

/// Catalog of papers, loaded once at startup from a JSONL snapshot.
///
/// The snapshot is the bulk import format: one paper per line with
/// `paper_id`, `title`, `pdf_path`, plus arbitrary reviewer-kind keys each
/// mapping to a list of review texts.
#[derive(Debug, Default)]
pub struct PaperRegistry {
    papers: Vec<Paper>,
}

impl PaperRegistry {
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read paper registry {}", path.display()))?;
        let mut papers = Vec::new();
        for (lineno, line) in contents.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let paper: Paper = serde_json::from_str(line).with_context(|| {
                format!("malformed paper record at {}:{}", path.display(), lineno + 1)
            })?;
            debug!(paper_id = %paper.paper_id, "loaded paper");
            papers.push(paper);
        }
        info!(count = papers.len(), path = %path.display(), "paper registry loaded");
        Ok(Self { papers })
    }

    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    pub fn len(&self) -> usize {
        self.papers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }

    pub fn get(&self, paper_id: &str) -> Option<&Paper> {
        self.papers.iter().find(|p| p.paper_id == paper_id)
    }

    /// Administrative append of a new reviewer kind's reviews to a paper.
    /// The only mutation papers support after load.
    pub fn append_reviews(&mut self, paper_id: &str, kind: &str, reviews: Vec<String>) -> bool {
        match self.papers.iter_mut().find(|p| p.paper_id == paper_id) {
            Some(paper) => {
                paper
                    .reviews
                    .entry(kind.to_string())
                    .or_default()
                    .extend(reviews);
                info!(paper_id, kind, "appended reviews to paper");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paper_line() -> &'static str {
        r#"{"paper_id":"p1","title":"Attention Is Overrated","pdf_path":"p1.pdf","human":["solid work"],"barebones":["ok",""],"multi_agent":[]}"#
    }

    #[test]
    fn open_reviewer_kind_map_parses() {
        let paper: Paper = serde_json::from_str(paper_line()).unwrap();
        assert_eq!(paper.paper_id, "p1");
        assert_eq!(paper.reviews.len(), 3);
        assert_eq!(paper.review_for("human"), Some("solid work"));
    }

    #[test]
    fn blank_and_empty_kinds_are_not_valid() {
        let paper: Paper = serde_json::from_str(paper_line()).unwrap();
        let kinds = paper.valid_reviewer_kinds();
        assert_eq!(kinds, vec!["barebones", "human"]);
    }

    #[test]
    fn from_jsonl_skips_blank_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers.jsonl");
        std::fs::write(&path, format!("{}\n\n{}\n", paper_line(), paper_line().replace("p1", "p2"))).unwrap();
        let registry = PaperRegistry::from_jsonl(&path).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.get("p2").is_some());
    }

    #[test]
    fn append_reviews_adds_new_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("papers.jsonl");
        std::fs::write(&path, paper_line()).unwrap();
        let mut registry = PaperRegistry::from_jsonl(&path).unwrap();
        assert!(registry.append_reviews("p1", "liang_etal", vec!["fine".into()]));
        assert_eq!(registry.get("p1").unwrap().review_for("liang_etal"), Some("fine"));
        assert!(!registry.append_reviews("nope", "x", vec![]));
    }
}
