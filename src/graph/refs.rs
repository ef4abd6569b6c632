use crate::git::{
    DecisionProvider, DecisionRequest, GraphError, PushRequest, RefDeleteKind,
    RepositoryDataSource, Result,
};
use crate::graph::selection::{ActionTarget, Selectable};
use crate::models::Color;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

const LOCAL_BRANCH_PREFIX: &str = "refs/heads/";
const REMOTE_PREFIX: &str = "refs/remotes/";
const TAG_PREFIX: &str = "refs/tags/";
const DECORATED_TAG_PREFIX: &str = "tag: ";
const REMOTE_TAG_PREFIX: &str = "remote-tag: ";
const STASH_PREFIX: &str = "refs/stash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RefKind {
    Branch,
    Tag,
    Head,
    Stash,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum RefScope {
    Local,
    Remote(String),
}

/// Structured form of a raw ref string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRef {
    pub kind: RefKind,
    pub scope: RefScope,
    /// `master`, `origin/master`, `v1.0`, `origin/v1.0`
    pub local_ref_name: String,
    /// Name with any remote prefix stripped
    pub ref_name: String,
}

fn split_remote(rest: &str) -> (String, String) {
    match rest.split_once('/') {
        Some((remote, name)) => (remote.to_string(), name.to_string()),
        None => (rest.to_string(), String::new()),
    }
}

/// Parse a raw ref name as reported by the data source.
pub fn parse_ref_name(raw: &str) -> ParsedRef {
    if raw == "HEAD" {
        return ParsedRef {
            kind: RefKind::Head,
            scope: RefScope::Local,
            local_ref_name: raw.to_string(),
            ref_name: raw.to_string(),
        };
    }

    if let Some(name) = raw.strip_prefix(LOCAL_BRANCH_PREFIX) {
        return ParsedRef {
            kind: RefKind::Branch,
            scope: RefScope::Local,
            local_ref_name: name.to_string(),
            ref_name: name.to_string(),
        };
    }

    if let Some(rest) = raw.strip_prefix(REMOTE_PREFIX) {
        let (remote, name) = split_remote(rest);
        let kind = if name == "HEAD" {
            RefKind::Head
        } else {
            RefKind::Branch
        };
        return ParsedRef {
            kind,
            scope: RefScope::Remote(remote),
            local_ref_name: rest.to_string(),
            ref_name: name,
        };
    }

    let tag = raw.strip_prefix(DECORATED_TAG_PREFIX).unwrap_or(raw);
    if let Some(name) = tag.strip_prefix(TAG_PREFIX) {
        return ParsedRef {
            kind: RefKind::Tag,
            scope: RefScope::Local,
            local_ref_name: name.to_string(),
            ref_name: name.to_string(),
        };
    }

    if let Some(rest) = raw.strip_prefix(REMOTE_TAG_PREFIX) {
        let (remote, name) = split_remote(rest);
        return ParsedRef {
            kind: RefKind::Tag,
            scope: RefScope::Remote(remote),
            local_ref_name: rest.to_string(),
            ref_name: name,
        };
    }

    if raw.starts_with(STASH_PREFIX) {
        return ParsedRef {
            kind: RefKind::Stash,
            scope: RefScope::Local,
            local_ref_name: "stash".to_string(),
            ref_name: "stash".to_string(),
        };
    }

    ParsedRef {
        kind: RefKind::Branch,
        scope: RefScope::Local,
        local_ref_name: raw.to_string(),
        ref_name: raw.to_string(),
    }
}

/// Result of a `move_to` request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    Moved,
    /// A force push was offered and refused
    Declined,
}

/// A branch, tag, HEAD or stash reference in the graph.
#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    /// Raw name, unique within a graph
    pub name: String,
    pub local_ref_name: String,
    pub ref_name: String,
    pub kind: RefKind,
    pub scope: RefScope,
    pub color: Color,
    /// Sha1 of the node this ref points at, replaced on every reload
    pub node: Option<String>,
    /// Horizontal lane of the ref's branch
    pub branch_order: usize,
}

impl Ref {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let parsed = parse_ref_name(&name);
        Self {
            color: Color::from_name(&name),
            name,
            local_ref_name: parsed.local_ref_name,
            ref_name: parsed.ref_name,
            kind: parsed.kind,
            scope: parsed.scope,
            node: None,
            branch_order: 0,
        }
    }

    pub fn remote(&self) -> Option<&str> {
        match &self.scope {
            RefScope::Remote(remote) => Some(remote),
            RefScope::Local => None,
        }
    }

    pub fn is_tag(&self) -> bool {
        self.kind == RefKind::Tag
    }

    pub fn is_local_tag(&self) -> bool {
        self.is_tag() && self.scope == RefScope::Local
    }

    pub fn is_remote_tag(&self) -> bool {
        self.is_tag() && self.remote().is_some()
    }

    pub fn is_branch(&self) -> bool {
        self.kind == RefKind::Branch
    }

    pub fn is_local_branch(&self) -> bool {
        self.is_branch() && self.scope == RefScope::Local
    }

    pub fn is_remote_branch(&self) -> bool {
        self.is_branch() && self.remote().is_some()
    }

    pub fn is_head(&self) -> bool {
        self.kind == RefKind::Head
    }

    pub fn is_local_head(&self) -> bool {
        self.is_head() && self.scope == RefScope::Local
    }

    pub fn is_remote_head(&self) -> bool {
        self.is_head() && self.remote().is_some()
    }

    pub fn is_stash(&self) -> bool {
        self.kind == RefKind::Stash
    }

    pub fn is_remote(&self) -> bool {
        self.remote().is_some()
    }

    /// Local branches and local tags; HEAD and the stash are neither local nor remote
    pub fn is_local(&self) -> bool {
        self.is_local_branch() || self.is_local_tag()
    }

    /// Whether this ref can name the branch a commit belongs to
    pub fn is_branch_candidate(&self) -> bool {
        !self.is_head() && !self.is_tag() && !self.is_stash()
    }

    /// Local branch that is currently checked out
    pub fn is_current(&self, checked_out: Option<&str>) -> bool {
        self.is_local_branch() && checked_out == Some(self.ref_name.as_str())
    }

    /// Raw name of the local counterpart of this ref
    pub fn local_ref_full_name(&self) -> Option<String> {
        match self.kind {
            RefKind::Branch => Some(format!("{}{}", LOCAL_BRANCH_PREFIX, self.ref_name)),
            RefKind::Tag => Some(format!(
                "{}{}{}",
                DECORATED_TAG_PREFIX, TAG_PREFIX, self.ref_name
            )),
            _ => None,
        }
    }

    /// Raw name of the counterpart of this ref on `remote`
    pub fn remote_ref_full_name(&self, remote: &str) -> Option<String> {
        match self.kind {
            RefKind::Branch => Some(format!("{}{}/{}", REMOTE_PREFIX, remote, self.ref_name)),
            RefKind::Tag => Some(format!("{}{}/{}", REMOTE_TAG_PREFIX, remote, self.ref_name)),
            _ => None,
        }
    }

    /// True iff this ref is local and the remote either lacks it or has it
    /// on another node.
    pub fn can_be_pushed(&self, remote: &str, refs: &HashMap<String, Ref>) -> bool {
        if !self.is_local() || remote.is_empty() {
            return false;
        }
        match self
            .remote_ref_full_name(remote)
            .and_then(|name| refs.get(&name))
        {
            None => true,
            Some(remote_ref) => remote_ref.node != self.node,
        }
    }

    /// Point this ref at `target` in the repository.
    ///
    /// Local refs are moved with a hard reset when checked out, otherwise
    /// with a forced tag or branch move. Remote refs are pushed; a
    /// non-fast-forward rejection asks `decider` before forcing.
    pub async fn move_to(
        &self,
        target: &str,
        checked_out: Option<&str>,
        source: &dyn RepositoryDataSource,
        decider: &dyn DecisionProvider,
    ) -> Result<MoveOutcome> {
        if let Some(remote) = self.remote() {
            let mut request = PushRequest {
                remote: remote.to_string(),
                ref_spec: target.to_string(),
                remote_branch: self.push_destination(),
                force: false,
            };
            info!("Pushing {} to {}/{}", target, remote, self.ref_name);
            return match source.push(request.clone()).await {
                Ok(()) => Ok(MoveOutcome::Moved),
                Err(e) if e.is_non_fast_forward() => {
                    let answer = decider
                        .confirm(DecisionRequest::force_push(&self.local_ref_name))
                        .await;
                    if !answer {
                        debug!("Force push of {} declined", self.name);
                        return Ok(MoveOutcome::Declined);
                    }
                    warn!("Force pushing {} to {}", target, self.local_ref_name);
                    request.force = true;
                    source.push(request).await?;
                    Ok(MoveOutcome::Moved)
                }
                Err(e) => Err(e),
            };
        }

        if !self.is_local() {
            return Err(GraphError::invalid_input(
                &self.name,
                "only branches and tags can be moved",
            ));
        }

        if self.is_current(checked_out) {
            info!("Resetting checked-out branch {} to {}", self.ref_name, target);
            source.reset_hard(target.to_string()).await?;
        } else if self.is_tag() {
            info!("Moving tag {} to {}", self.ref_name, target);
            source
                .move_tag(self.ref_name.clone(), target.to_string(), true)
                .await?;
        } else {
            info!("Moving branch {} to {}", self.ref_name, target);
            source
                .move_branch(self.ref_name.clone(), target.to_string(), true)
                .await?;
        }
        Ok(MoveOutcome::Moved)
    }

    /// Delete this ref, locally or on its remote.
    pub async fn remove(&self, source: &dyn RepositoryDataSource) -> Result<()> {
        let kind = match self.kind {
            RefKind::Branch => RefDeleteKind::Branch,
            RefKind::Tag => RefDeleteKind::Tag,
            _ => {
                return Err(GraphError::invalid_input(
                    &self.name,
                    "only branches and tags can be deleted",
                ))
            }
        };
        info!("Deleting {}", self.name);
        source
            .delete_ref(kind, self.remote().map(str::to_string), self.ref_name.clone())
            .await
    }

    /// Push this local ref to `remote` under the same name.
    pub async fn push_to(
        &self,
        remote: &str,
        source: &dyn RepositoryDataSource,
        decider: &dyn DecisionProvider,
    ) -> Result<MoveOutcome> {
        let target = self
            .node
            .clone()
            .ok_or_else(|| GraphError::UnknownNode(self.name.clone()))?;
        let mut remote_ref = Ref::new(
            self.remote_ref_full_name(remote)
                .ok_or_else(|| GraphError::invalid_input(&self.name, "ref cannot be pushed"))?,
        );
        remote_ref.node = self.node.clone();
        remote_ref.move_to(&target, None, source, decider).await
    }

    fn push_destination(&self) -> String {
        if self.is_tag() {
            format!("{}{}", TAG_PREFIX, self.ref_name)
        } else {
            self.ref_name.clone()
        }
    }
}

impl Selectable for Ref {
    fn action_target(&self) -> ActionTarget {
        ActionTarget::Ref(self.name.clone())
    }
}
