use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Display metadata for one competing reviewer model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewerInfo {
    /// Unique, stable identifier — matches the reviewer-kind keys in the
    /// paper registry (e.g. "human_reviewer", "barebones").
    pub id: String,
    pub short_name: String,
    pub long_name: String,
    pub link: String,
    pub description: String,
    /// Reviewers are never deleted, only deactivated.
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Catalog of reviewer models, in registration order.
#[derive(Debug, Default)]
pub struct ReviewerRegistry {
    reviewers: Vec<ReviewerInfo>,
}

impl ReviewerRegistry {
    /// Load from a JSONL snapshot, one reviewer per line. A missing file is
    /// an empty registry — reviewers can be registered administratively.
    pub fn from_jsonl(path: &Path) -> Result<Self> {
        let mut registry = Self::default();
        if !path.exists() {
            info!(path = %path.display(), "no reviewer snapshot — starting empty");
            return Ok(registry);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read reviewer registry {}", path.display()))?;
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let info: ReviewerInfo = serde_json::from_str(line)
                .with_context(|| format!("malformed reviewer record in {}", path.display()))?;
            registry.register(info);
        }
        info!(count = registry.reviewers.len(), "reviewer registry loaded");
        Ok(registry)
    }

    /// Register a reviewer. Re-registering an existing id updates its
    /// display metadata in place (the id itself is immutable).
    pub fn register(&mut self, info: ReviewerInfo) {
        match self.reviewers.iter_mut().find(|r| r.id == info.id) {
            Some(existing) => *existing = info,
            None => self.reviewers.push(info),
        }
    }

    /// Deactivate a reviewer. Returns false for an unknown id.
    pub fn deactivate(&mut self, id: &str) -> bool {
        match self.reviewers.iter_mut().find(|r| r.id == id) {
            Some(r) => {
                r.active = false;
                info!(reviewer = id, "reviewer deactivated");
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ReviewerInfo> {
        self.reviewers.iter().find(|r| r.id == id)
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.get(id).map(|r| r.active).unwrap_or(false)
    }

    pub fn reviewers(&self) -> &[ReviewerInfo] {
        &self.reviewers
    }

    pub fn ids(&self) -> Vec<&str> {
        self.reviewers.iter().map(|r| r.id.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str) -> ReviewerInfo {
        ReviewerInfo {
            id: id.to_string(),
            short_name: id.to_uppercase(),
            long_name: format!("{id} (long)"),
            link: "https://example.com".to_string(),
            description: String::new(),
            active: true,
        }
    }

    #[test]
    fn register_preserves_order_and_updates_in_place() {
        let mut reg = ReviewerRegistry::default();
        reg.register(info("human_reviewer"));
        reg.register(info("barebones"));
        let mut updated = info("human_reviewer");
        updated.short_name = "Human".to_string();
        reg.register(updated);
        assert_eq!(reg.ids(), vec!["human_reviewer", "barebones"]);
        assert_eq!(reg.get("human_reviewer").unwrap().short_name, "Human");
    }

    #[test]
    fn deactivate_keeps_the_record() {
        let mut reg = ReviewerRegistry::default();
        reg.register(info("barebones"));
        assert!(reg.deactivate("barebones"));
        assert!(!reg.is_active("barebones"));
        assert!(reg.get("barebones").is_some());
        assert!(!reg.deactivate("unknown"));
    }

    #[test]
    fn missing_snapshot_is_empty_registry() {
        let dir = tempfile::tempdir().unwrap();
        let reg = ReviewerRegistry::from_jsonl(&dir.path().join("none.jsonl")).unwrap();
        assert!(reg.reviewers().is_empty());
    }
}
