// SPDX-License-Identifier: MIT
// Append-only JSONL vote log — the second, human-auditable backend.

use anyhow::Result;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::Mutex};

use super::Vote;

/// Append-only line-oriented vote log.
///
/// Writes one JSON object per vote to `{data_dir}/votes.jsonl`. Entries are
/// never rewritten in place — the only writer that touches existing content
/// is reconciliation, and it appends at the end. The file handle is cached
/// for the process lifetime to avoid an `open()` syscall per vote.
pub struct VoteLog {
    path: PathBuf,
    /// Cached, open file handle; `None` until the first write.
    file: Mutex<Option<tokio::fs::File>>,
}

impl VoteLog {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join("votes.jsonl"),
            file: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one vote record as a single JSON line.
    pub async fn append(&self, vote: &Vote) -> Result<()> {
        let line = serde_json::to_string(vote)? + "\n";
        let mut guard = self.file.lock().await;
        let f = match guard.as_mut() {
            Some(f) => f,
            None => {
                if let Some(parent) = self.path.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                let f = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)
                    .await?;
                guard.insert(f)
            }
        };
        f.write_all(line.as_bytes()).await?;
        f.flush().await?;
        Ok(())
    }

    /// Every `vote_id` present in the log. A missing file is an empty set.
    pub async fn vote_ids(&self) -> Result<HashSet<String>> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .map(|v| v.vote_id)
            .collect())
    }

    /// Read the log to completion. Malformed lines are an error — the log is
    /// machine-written and a torn line means an unclean shutdown worth
    /// surfacing, not skipping.
    pub async fn read_all(&self) -> Result<Vec<Vote>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let contents = tokio::fs::read_to_string(&self.path).await?;
        let mut votes = Vec::new();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            votes.push(serde_json::from_str(line)?);
        }
        Ok(votes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rating::Outcome;

    fn vote(id: &str) -> Vote {
        Vote {
            vote_id: id.to_string(),
            paper_id: "p1".to_string(),
            reviewer_a: "human".to_string(),
            reviewer_b: "barebones".to_string(),
            outcome: Outcome::AWins,
            session_id: "s1".to_string(),
            vote_time: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn appends_camel_case_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = VoteLog::new(dir.path());
        log.append(&vote("v1")).await.unwrap();

        let content = tokio::fs::read_to_string(log.path()).await.unwrap();
        assert!(content.contains("\"voteId\":\"v1\""));
        assert!(content.contains("\"outcome\":\"a_wins\""));
        assert!(content.ends_with('\n'));
    }

    #[tokio::test]
    async fn read_all_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let log = VoteLog::new(dir.path());
        log.append(&vote("v1")).await.unwrap();
        log.append(&vote("v2")).await.unwrap();

        let votes = log.read_all().await.unwrap();
        assert_eq!(votes.len(), 2);
        assert_eq!(votes[1].vote_id, "v2");
        assert_eq!(log.vote_ids().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = VoteLog::new(dir.path());
        assert!(log.read_all().await.unwrap().is_empty());
        assert!(log.vote_ids().await.unwrap().is_empty());
    }
}
