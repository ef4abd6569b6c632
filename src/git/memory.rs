//! In-memory repository data source.
//!
//! Holds commits and refs in plain collections, applies ref mutations the
//! way a git backend would and records every call it receives. Loads can be
//! held open with a gate to reproduce out-of-order completions.

use crate::git::{
    GraphError, LoadWindow, PushRequest, RefDeleteKind, RefTarget, RepositoryDataSource, Result,
};
use crate::models::{Commit, Signature};
use chrono::{DateTime, Duration, Utc};
use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tracing::debug;

/// A call received by the in-memory repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    LoadCommits(LoadWindow),
    LoadRefs,
    CheckedOutBranch,
    ResetHard(String),
    MoveTag(String, String, bool),
    MoveBranch(String, String, bool),
    CreateBranch(String, String),
    Push(PushRequest),
    DeleteRef(RefDeleteKind, Option<String>, String),
    Merge(String),
    Rebase(String),
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Newest first
    commits: Vec<Commit>,
    /// Raw ref name to sha1
    refs: BTreeMap<String, String>,
    checked_out: Option<String>,
}

#[derive(Default)]
pub struct InMemoryRepository {
    state: RefCell<MemoryState>,
    calls: RefCell<Vec<SourceCall>>,
    gates: RefCell<VecDeque<oneshot::Receiver<()>>>,
    failures: RefCell<HashMap<&'static str, String>>,
    reject_push: RefCell<bool>,
}

impl std::fmt::Debug for InMemoryRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("InMemoryRepository")
            .field("commits", &state.commits.len())
            .field("refs", &state.refs)
            .field("checked_out", &state.checked_out)
            .finish()
    }
}

/// Commit with a fixed author, authored and committed `timestamp` seconds
/// after the epoch.
pub fn make_commit(sha1: &str, parents: &[&str], timestamp: i64) -> Commit {
    let signature = Signature {
        name: "Test User".to_string(),
        email: "test@example.com".to_string(),
        date: DateTime::from_timestamp(timestamp, 0).unwrap_or_default(),
    };
    Commit {
        sha1: sha1.to_string(),
        parents: parents.iter().map(|p| p.to_string()).collect(),
        refs: Vec::new(),
        committer: Some(signature.clone()),
        author: signature,
        message: format!("Commit {}", sha1),
    }
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a commit; commits are kept newest first.
    pub fn add_commit(&self, commit: Commit) {
        let mut state = self.state.borrow_mut();
        state.commits.push(commit);
        state
            .commits
            .sort_by(|a, b| b.commit_date().cmp(&a.commit_date()));
    }

    pub fn with_commit(self, sha1: &str, parents: &[&str], timestamp: i64) -> Self {
        self.add_commit(make_commit(sha1, parents, timestamp));
        self
    }

    pub fn with_ref(self, name: &str, sha1: &str) -> Self {
        self.set_ref(name, sha1);
        self
    }

    /// Check out a local branch; HEAD follows it.
    pub fn with_checked_out(self, branch: &str) -> Self {
        self.checkout(branch);
        self
    }

    pub fn set_ref(&self, name: &str, sha1: &str) {
        self.state
            .borrow_mut()
            .refs
            .insert(name.to_string(), sha1.to_string());
    }

    pub fn remove_ref(&self, name: &str) {
        self.state.borrow_mut().refs.remove(name);
    }

    pub fn checkout(&self, branch: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(sha1) = state.refs.get(&format!("refs/heads/{}", branch)).cloned() {
            state.refs.insert("HEAD".to_string(), sha1);
        }
        state.checked_out = Some(branch.to_string());
    }

    pub fn ref_target(&self, name: &str) -> Option<String> {
        self.state.borrow().refs.get(name).cloned()
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Hold the next `load_commits` until the returned sender fires or drops.
    /// The loaded data is captured when the call is made.
    pub fn hold_next_load(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates.borrow_mut().push_back(rx);
        tx
    }

    /// Make the next call of `operation` (e.g. `"move_branch"`) fail.
    pub fn fail_next(&self, operation: &'static str, reason: impl Into<String>) {
        self.failures.borrow_mut().insert(operation, reason.into());
    }

    /// Make the next non-forced push fail as non-fast-forward.
    pub fn reject_next_push_non_fast_forward(&self) {
        *self.reject_push.borrow_mut() = true;
    }

    fn record(&self, call: SourceCall) {
        debug!("In-memory repository call: {:?}", call);
        self.calls.borrow_mut().push(call);
    }

    fn scripted_failure(&self, operation: &'static str) -> Result<()> {
        match self.failures.borrow_mut().remove(operation) {
            Some(reason) => Err(GraphError::rejected(operation, reason)),
            None => Ok(()),
        }
    }

    fn snapshot_commits(&self, window: LoadWindow) -> Vec<Commit> {
        let state = self.state.borrow();
        let mut by_sha: HashMap<&str, Vec<String>> = HashMap::new();
        for (name, sha1) in &state.refs {
            by_sha.entry(sha1.as_str()).or_default().push(name.clone());
        }
        state
            .commits
            .iter()
            .skip(window.skip)
            .take(window.limit)
            .map(|c| {
                let mut commit = c.clone();
                commit.refs = by_sha.get(c.sha1.as_str()).cloned().unwrap_or_default();
                commit
            })
            .collect()
    }

    fn has_commit(&self, sha1: &str) -> bool {
        self.state.borrow().commits.iter().any(|c| c.sha1 == sha1)
    }

    fn require_commit(&self, sha1: &str) -> Result<()> {
        if self.has_commit(sha1) {
            Ok(())
        } else {
            Err(GraphError::UnknownNode(sha1.to_string()))
        }
    }

    fn ancestors(&self, sha1: &str) -> HashSet<String> {
        let state = self.state.borrow();
        let parents: HashMap<&str, &Vec<String>> = state
            .commits
            .iter()
            .map(|c| (c.sha1.as_str(), &c.parents))
            .collect();
        let mut seen = HashSet::new();
        let mut stack = vec![sha1.to_string()];
        while let Some(current) = stack.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(ps) = parents.get(current.as_str()) {
                stack.extend(ps.iter().cloned());
            }
        }
        seen
    }

    fn newest_date(&self) -> DateTime<Utc> {
        self.state
            .borrow()
            .commits
            .first()
            .map(Commit::commit_date)
            .unwrap_or_default()
    }

    fn set_checked_out_tip(&self, sha1: &str) {
        let mut state = self.state.borrow_mut();
        if let Some(branch) = state.checked_out.clone() {
            state
                .refs
                .insert(format!("refs/heads/{}", branch), sha1.to_string());
        }
        state.refs.insert("HEAD".to_string(), sha1.to_string());
    }

    fn head(&self) -> Result<String> {
        self.ref_target("HEAD")
            .ok_or_else(|| GraphError::UnknownRef("HEAD".to_string()))
    }
}

fn ready<'a, T: 'a>(value: T) -> LocalBoxFuture<'a, T> {
    Box::pin(futures::future::ready(value))
}

impl RepositoryDataSource for InMemoryRepository {
    fn load_commits(&self, window: LoadWindow) -> LocalBoxFuture<'_, Result<Vec<Commit>>> {
        self.record(SourceCall::LoadCommits(window));
        let commits = self.snapshot_commits(window);
        let gate = self.gates.borrow_mut().pop_front();
        Box::pin(async move {
            if let Some(gate) = gate {
                let _ = gate.await;
            }
            Ok(commits)
        })
    }

    fn load_refs(&self) -> LocalBoxFuture<'_, Result<Vec<RefTarget>>> {
        self.record(SourceCall::LoadRefs);
        let refs = self
            .state
            .borrow()
            .refs
            .iter()
            .map(|(name, sha1)| RefTarget::new(name.clone(), sha1.clone()))
            .collect();
        ready(Ok(refs))
    }

    fn checked_out_branch(&self) -> LocalBoxFuture<'_, Result<Option<String>>> {
        self.record(SourceCall::CheckedOutBranch);
        ready(Ok(self.state.borrow().checked_out.clone()))
    }

    fn reset_hard(&self, sha1: String) -> LocalBoxFuture<'_, Result<()>> {
        self.record(SourceCall::ResetHard(sha1.clone()));
        let result = self
            .scripted_failure("reset_hard")
            .and_then(|_| self.require_commit(&sha1))
            .map(|_| self.set_checked_out_tip(&sha1));
        ready(result)
    }

    fn move_tag(&self, name: String, sha1: String, force: bool) -> LocalBoxFuture<'_, Result<()>> {
        self.record(SourceCall::MoveTag(name.clone(), sha1.clone(), force));
        let result = self
            .scripted_failure("move_tag")
            .and_then(|_| self.require_commit(&sha1))
            .and_then(|_| {
                let full = format!("tag: refs/tags/{}", name);
                if !force && self.ref_target(&full).is_some() {
                    return Err(GraphError::rejected("move_tag", "tag already exists"));
                }
                self.set_ref(&full, &sha1);
                Ok(())
            });
        ready(result)
    }

    fn move_branch(
        &self,
        name: String,
        sha1: String,
        force: bool,
    ) -> LocalBoxFuture<'_, Result<()>> {
        self.record(SourceCall::MoveBranch(name.clone(), sha1.clone(), force));
        let result = self
            .scripted_failure("move_branch")
            .and_then(|_| self.require_commit(&sha1))
            .and_then(|_| {
                let full = format!("refs/heads/{}", name);
                if !force && self.ref_target(&full).is_some() {
                    return Err(GraphError::rejected("move_branch", "branch already exists"));
                }
                self.set_ref(&full, &sha1);
                if self.state.borrow().checked_out.as_deref() == Some(name.as_str()) {
                    self.set_ref("HEAD", &sha1);
                }
                Ok(())
            });
        ready(result)
    }

    fn create_branch(&self, name: String, sha1: String) -> LocalBoxFuture<'_, Result<()>> {
        self.record(SourceCall::CreateBranch(name.clone(), sha1.clone()));
        let result = self
            .scripted_failure("create_branch")
            .and_then(|_| self.require_commit(&sha1))
            .and_then(|_| {
                let full = format!("refs/heads/{}", name);
                if self.ref_target(&full).is_some() {
                    return Err(GraphError::rejected("create_branch", "branch already exists"));
                }
                self.set_ref(&full, &sha1);
                Ok(())
            });
        ready(result)
    }

    fn push(&self, request: PushRequest) -> LocalBoxFuture<'_, Result<()>> {
        self.record(SourceCall::Push(request.clone()));
        let result = self.scripted_failure("push").and_then(|_| {
            let source_sha = if self.has_commit(&request.ref_spec) {
                request.ref_spec.clone()
            } else {
                self.ref_target(&format!("refs/heads/{}", request.ref_spec))
                    .ok_or_else(|| GraphError::UnknownRef(request.ref_spec.clone()))?
            };
            let destination = match request.remote_branch.strip_prefix("refs/tags/") {
                Some(tag) => format!("remote-tag: {}/{}", request.remote, tag),
                None => format!(
                    "refs/remotes/{}/{}",
                    request.remote,
                    request
                        .remote_branch
                        .strip_prefix("refs/heads/")
                        .unwrap_or(&request.remote_branch)
                ),
            };
            let rejected = !request.force && self.reject_push.replace(false);
            let diverged = !request.force
                && self
                    .ref_target(&destination)
                    .map(|current| !self.ancestors(&source_sha).contains(&current))
                    .unwrap_or(false);
            if rejected || diverged {
                return Err(GraphError::NonFastForward {
                    remote: request.remote.clone(),
                    remote_branch: request.remote_branch.clone(),
                });
            }
            self.set_ref(&destination, &source_sha);
            Ok(())
        });
        ready(result)
    }

    fn delete_ref(
        &self,
        kind: RefDeleteKind,
        remote: Option<String>,
        name: String,
    ) -> LocalBoxFuture<'_, Result<()>> {
        self.record(SourceCall::DeleteRef(kind, remote.clone(), name.clone()));
        let full = match (kind, remote) {
            (RefDeleteKind::Branch, None) => format!("refs/heads/{}", name),
            (RefDeleteKind::Branch, Some(remote)) => format!("refs/remotes/{}/{}", remote, name),
            (RefDeleteKind::Tag, None) => format!("tag: refs/tags/{}", name),
            (RefDeleteKind::Tag, Some(remote)) => format!("remote-tag: {}/{}", remote, name),
        };
        let result = self.scripted_failure("delete_ref").and_then(|_| {
            match self.state.borrow_mut().refs.remove(&full) {
                Some(_) => Ok(()),
                None => Err(GraphError::UnknownRef(full)),
            }
        });
        ready(result)
    }

    fn merge(&self, sha1: String) -> LocalBoxFuture<'_, Result<()>> {
        self.record(SourceCall::Merge(sha1.clone()));
        let result = self
            .scripted_failure("merge")
            .and_then(|_| self.require_commit(&sha1))
            .and_then(|_| {
                let tip = self.head()?;
                if self.ancestors(&tip).contains(&sha1) {
                    return Ok(());
                }
                if self.ancestors(&sha1).contains(&tip) {
                    self.set_checked_out_tip(&sha1);
                    return Ok(());
                }
                let date = self.newest_date() + Duration::seconds(1);
                let merge_sha = format!("merge-{}-{}", tip, sha1);
                self.add_commit(make_commit(
                    &merge_sha,
                    &[tip.as_str(), sha1.as_str()],
                    date.timestamp(),
                ));
                self.set_checked_out_tip(&merge_sha);
                Ok(())
            });
        ready(result)
    }

    fn rebase(&self, onto: String) -> LocalBoxFuture<'_, Result<()>> {
        self.record(SourceCall::Rebase(onto.clone()));
        let result = self
            .scripted_failure("rebase")
            .and_then(|_| self.require_commit(&onto))
            .and_then(|_| {
                let tip = self.head()?;
                let base = self.ancestors(&onto);
                // First-parent chain of commits that are not yet on `onto`
                let mut to_replay = Vec::new();
                let mut current = Some(tip);
                while let Some(sha1) = current.filter(|s| !base.contains(s)) {
                    let commit = self
                        .state
                        .borrow()
                        .commits
                        .iter()
                        .find(|c| c.sha1 == sha1)
                        .cloned()
                        .ok_or_else(|| GraphError::UnknownNode(sha1.clone()))?;
                    current = commit.parents.first().cloned();
                    to_replay.push(commit);
                }
                let mut parent = onto;
                let mut date = self.newest_date();
                for commit in to_replay.into_iter().rev() {
                    date += Duration::seconds(1);
                    let rebased = format!("{}'", commit.sha1);
                    let mut replayed = make_commit(&rebased, &[parent.as_str()], date.timestamp());
                    replayed.message = commit.message.clone();
                    replayed.author = commit.author.clone();
                    self.add_commit(replayed);
                    parent = rebased;
                }
                self.set_checked_out_tip(&parent);
                Ok(())
            });
        ready(result)
    }
}
