//! Seams between the graph core and its external collaborators.
//!
//! Everything runs on one logical thread, so the futures returned here are
//! `LocalBoxFuture`s: implementations may hold non-`Send` handles such as a
//! `git2::Repository`.

use crate::git::Result;
use crate::models::Commit;
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

/// A ref and the commit it points at, as listed by the data source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefTarget {
    pub name: String,
    pub sha1: String,
}

impl RefTarget {
    pub fn new(name: impl Into<String>, sha1: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sha1: sha1.into(),
        }
    }
}

/// Push of a commit to a branch (or tag) on a remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushRequest {
    pub remote: String,
    /// Source of the push, usually a sha1 or a local branch name
    pub ref_spec: String,
    /// Destination; short names are taken as branches, `refs/...` names are used as is
    pub remote_branch: String,
    pub force: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefDeleteKind {
    Branch,
    Tag,
}

/// Window of the history to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadWindow {
    pub limit: usize,
    pub skip: usize,
}

/// Backend that lists commits and refs and performs ref mutations.
pub trait RepositoryDataSource {
    /// Commits in commit-time descending order
    fn load_commits(&self, window: LoadWindow) -> LocalBoxFuture<'_, Result<Vec<Commit>>>;

    /// All refs and their targets, including refs whose commit is outside the window
    fn load_refs(&self) -> LocalBoxFuture<'_, Result<Vec<RefTarget>>>;

    /// Short name of the checked-out branch, `None` when HEAD is detached
    fn checked_out_branch(&self) -> LocalBoxFuture<'_, Result<Option<String>>>;

    fn reset_hard(&self, sha1: String) -> LocalBoxFuture<'_, Result<()>>;

    fn move_tag(&self, name: String, sha1: String, force: bool) -> LocalBoxFuture<'_, Result<()>>;

    fn move_branch(
        &self,
        name: String,
        sha1: String,
        force: bool,
    ) -> LocalBoxFuture<'_, Result<()>>;

    fn create_branch(&self, name: String, sha1: String) -> LocalBoxFuture<'_, Result<()>>;

    /// Fails with `GraphError::NonFastForward` when the remote refuses a non-forced update
    fn push(&self, request: PushRequest) -> LocalBoxFuture<'_, Result<()>>;

    fn delete_ref(
        &self,
        kind: RefDeleteKind,
        remote: Option<String>,
        name: String,
    ) -> LocalBoxFuture<'_, Result<()>>;

    /// Merge `sha1` into the checked-out branch
    fn merge(&self, sha1: String) -> LocalBoxFuture<'_, Result<()>>;

    /// Rebase the checked-out branch onto `onto`
    fn rebase(&self, onto: String) -> LocalBoxFuture<'_, Result<()>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionKind {
    ForcePush,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionRequest {
    pub kind: DecisionKind,
    pub title: String,
    pub details: String,
}

impl DecisionRequest {
    pub fn force_push(remote_branch: &str) -> Self {
        Self {
            kind: DecisionKind::ForcePush,
            title: "Force push?".to_string(),
            details: format!(
                "The remote branch {} can't be fast-forwarded.",
                remote_branch
            ),
        }
    }
}

/// Dialog collaborator answering yes/no questions.
pub trait DecisionProvider {
    fn confirm(&self, request: DecisionRequest) -> LocalBoxFuture<'_, bool>;
}

/// Answers every request with the same fixed decision.
#[derive(Debug, Clone, Copy)]
pub struct FixedDecision(pub bool);

impl DecisionProvider for FixedDecision {
    fn confirm(&self, request: DecisionRequest) -> LocalBoxFuture<'_, bool> {
        let answer = self.0;
        tracing::debug!("Answering {:?} with {}", request.kind, answer);
        Box::pin(async move { answer })
    }
}
