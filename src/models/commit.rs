use crate::git::{GraphError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One commit as delivered by the repository data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub sha1: String,
    /// Ordered parents; the first one is the main lineage
    #[serde(default)]
    pub parents: Vec<String>,
    /// Raw ref names attached to this commit
    #[serde(default)]
    pub refs: Vec<String>,
    pub author: Signature,
    /// Absent when the source only reports the author
    #[serde(default)]
    pub committer: Option<Signature>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub date: DateTime<Utc>,
}

impl Commit {
    /// Reject records the graph cannot hold.
    pub fn validate(&self) -> Result<()> {
        if self.sha1.trim().is_empty() {
            return Err(GraphError::invalid_commit(&self.sha1, "missing sha1"));
        }
        if self.parents.iter().any(|p| p == &self.sha1) {
            return Err(GraphError::invalid_commit(
                &self.sha1,
                "commit lists itself as a parent",
            ));
        }
        Ok(())
    }

    /// Time the commit was recorded, falling back to the author date.
    ///
    /// Rebased commits keep their author date, so only this one is ordered
    /// consistently with their parents.
    pub fn commit_date(&self) -> DateTime<Utc> {
        self.committer
            .as_ref()
            .map(|c| c.date)
            .unwrap_or(self.author.date)
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or("")
    }

    pub fn short_sha1(&self) -> &str {
        let end = self
            .sha1
            .char_indices()
            .nth(7)
            .map(|(i, _)| i)
            .unwrap_or(self.sha1.len());
        &self.sha1[..end]
    }
}
