use crate::git::{
    GraphError, LoadWindow, PushRequest, RefDeleteKind, RefTarget, RepositoryDataSource, Result,
};
use crate::models::{Commit, Signature};
use chrono::DateTime;
use futures::future::LocalBoxFuture;
use git2::{
    BranchType, ErrorCode, Oid, PushOptions, RemoteCallbacks, Repository, RepositoryOpenFlags,
    ResetType,
};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Scratch ref used as the source of pushes that name a bare commit
const PUSH_SOURCE_REF: &str = "refs/gitgraph-rs/push-source";

/// Repository data source backed by libgit2.
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl std::fmt::Debug for GitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitRepository")
            .field("path", &self.path)
            .finish()
    }
}

impl GitRepository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::open_ext(
            path.as_ref(),
            RepositoryOpenFlags::NO_SEARCH,
            &[] as &[&std::ffi::OsStr],
        )?;
        Ok(Self::from_repo(repo))
    }

    /// Open the repository containing `path`, searching parent directories.
    pub fn discover<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Repository::open_ext(
            path.as_ref(),
            RepositoryOpenFlags::empty(),
            &[] as &[&std::ffi::OsStr],
        )?;
        Ok(Self::from_repo(repo))
    }

    fn from_repo(repo: Repository) -> Self {
        let path = repo.workdir().unwrap_or_else(|| repo.path()).to_path_buf();
        info!("Opened repository at {}", path.display());
        Self { repo, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// All refs that resolve to a commit, in the decorated naming used by the graph.
    pub fn ref_targets(&self) -> Result<Vec<RefTarget>> {
        let mut targets = Vec::new();
        for reference in self.repo.references()? {
            let reference = reference?;
            let Some(name) = reference.name() else {
                continue;
            };
            if name.starts_with("refs/gitgraph-rs/") {
                continue;
            }
            let Ok(commit) = reference.peel_to_commit() else {
                debug!("Skipping {} which does not point at a commit", name);
                continue;
            };
            let name = if name.starts_with("refs/tags/") {
                format!("tag: {}", name)
            } else {
                name.to_string()
            };
            targets.push(RefTarget::new(name, commit.id().to_string()));
        }
        if let Ok(head) = self.repo.head() {
            if let Ok(commit) = head.peel_to_commit() {
                targets.push(RefTarget::new("HEAD", commit.id().to_string()));
            }
        }
        Ok(targets)
    }

    /// Commits reachable from any ref, newest first, decorated with their refs.
    pub fn commits(&self, window: LoadWindow) -> Result<Vec<Commit>> {
        let targets = self.ref_targets()?;
        let mut decorations: HashMap<String, Vec<String>> = HashMap::new();
        for target in &targets {
            decorations
                .entry(target.sha1.clone())
                .or_default()
                .push(target.name.clone());
        }

        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(git2::Sort::TIME)?;
        let mut pushed = HashSet::new();
        for target in &targets {
            if pushed.insert(target.sha1.clone()) {
                revwalk.push(Oid::from_str(&target.sha1)?)?;
            }
        }

        let mut commits = Vec::new();
        for oid in revwalk.skip(window.skip).take(window.limit) {
            let commit = self.repo.find_commit(oid?)?;
            let sha1 = commit.id().to_string();
            commits.push(Commit {
                parents: commit.parent_ids().map(|id| id.to_string()).collect(),
                refs: decorations.remove(&sha1).unwrap_or_default(),
                author: signature_of(&commit.author()),
                committer: Some(signature_of(&commit.committer())),
                message: commit.message().unwrap_or("").to_string(),
                sha1,
            });
        }
        debug!("Loaded {} commits ({:?})", commits.len(), window);
        Ok(commits)
    }

    pub fn current_branch(&self) -> Result<Option<String>> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };
        if !head.is_branch() {
            return Ok(None);
        }
        Ok(head.shorthand().map(str::to_string))
    }

    fn find_commit(&self, sha1: &str) -> Result<git2::Commit<'_>> {
        let oid = Oid::from_str(sha1)
            .map_err(|_| GraphError::invalid_input(sha1, "not a commit id"))?;
        self.repo
            .find_commit(oid)
            .map_err(|_| GraphError::UnknownNode(sha1.to_string()))
    }

    fn signature(&self) -> Result<git2::Signature<'static>> {
        match self.repo.signature() {
            Ok(signature) => Ok(signature.to_owned()),
            Err(_) => Ok(git2::Signature::now("gitgraph-rs", "gitgraph-rs@localhost")?),
        }
    }

    pub fn reset_hard_to(&self, sha1: &str) -> Result<()> {
        let commit = self.find_commit(sha1)?;
        self.repo.reset(commit.as_object(), ResetType::Hard, None)?;
        info!("Reset HEAD to {}", sha1);
        Ok(())
    }

    pub fn set_tag(&self, name: &str, sha1: &str, force: bool) -> Result<()> {
        let commit = self.find_commit(sha1)?;
        self.repo.tag_lightweight(name, commit.as_object(), force)?;
        info!("Tag {} now at {}", name, sha1);
        Ok(())
    }

    pub fn set_branch(&self, name: &str, sha1: &str, force: bool) -> Result<()> {
        let commit = self.find_commit(sha1)?;
        self.repo.branch(name, &commit, force)?;
        info!("Branch {} now at {}", name, sha1);
        Ok(())
    }

    /// Push `request.ref_spec` (a revision) to `request.remote_branch` on the remote.
    pub fn push_to_remote(&self, request: &PushRequest) -> Result<()> {
        let mut remote = self.repo.find_remote(&request.remote)?;
        let source = self.repo.revparse_single(&request.ref_spec)?.peel_to_commit()?;
        self.repo
            .reference(PUSH_SOURCE_REF, source.id(), true, "gitgraph-rs push")?;

        let destination = if request.remote_branch.starts_with("refs/") {
            request.remote_branch.clone()
        } else {
            format!("refs/heads/{}", request.remote_branch)
        };
        let refspec = format!(
            "{}{}:{}",
            if request.force { "+" } else { "" },
            PUSH_SOURCE_REF,
            destination
        );

        let result = self.push_refspecs(&mut remote, &[refspec.as_str()]);
        if let Ok(mut scratch) = self.repo.find_reference(PUSH_SOURCE_REF) {
            if let Err(e) = scratch.delete() {
                warn!("Failed to delete {}: {}", PUSH_SOURCE_REF, e);
            }
        }

        match result {
            Err(GraphError::Git2(e)) if e.code() == ErrorCode::NotFastForward => {
                Err(GraphError::NonFastForward {
                    remote: request.remote.clone(),
                    remote_branch: request.remote_branch.clone(),
                })
            }
            Err(GraphError::MutationRejected { reason, .. }) if is_non_fast_forward(&reason) => {
                Err(GraphError::NonFastForward {
                    remote: request.remote.clone(),
                    remote_branch: request.remote_branch.clone(),
                })
            }
            Err(e) => Err(e),
            Ok(()) => {
                info!("Pushed {} to {}:{}", request.ref_spec, request.remote, destination);
                // Tracking refs of branches follow the push
                if let Some(branch) = destination.strip_prefix("refs/heads/") {
                    let tracking = format!("refs/remotes/{}/{}", request.remote, branch);
                    self.repo
                        .reference(&tracking, source.id(), true, "gitgraph-rs push")?;
                }
                Ok(())
            }
        }
    }

    fn push_refspecs(&self, remote: &mut git2::Remote<'_>, refspecs: &[&str]) -> Result<()> {
        let rejection: RefCell<Option<String>> = RefCell::new(None);
        {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.credentials(|_url, username, allowed| {
                if allowed.contains(git2::CredentialType::SSH_KEY) {
                    git2::Cred::ssh_key_from_agent(username.unwrap_or("git"))
                } else {
                    git2::Cred::default()
                }
            });
            callbacks.push_update_reference(|refname, status| {
                if let Some(message) = status {
                    warn!("Remote rejected {}: {}", refname, message);
                    *rejection.borrow_mut() = Some(message.to_string());
                }
                Ok(())
            });

            let mut push_opts = PushOptions::new();
            push_opts.remote_callbacks(callbacks);
            remote.push(refspecs, Some(&mut push_opts))?;
        }

        match rejection.into_inner() {
            Some(reason) => Err(GraphError::MutationRejected {
                operation: "push".to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    pub fn delete(&self, kind: RefDeleteKind, remote: Option<&str>, name: &str) -> Result<()> {
        match (kind, remote) {
            (RefDeleteKind::Branch, None) => {
                self.repo.find_branch(name, BranchType::Local)?.delete()?;
            }
            (RefDeleteKind::Tag, None) => {
                self.repo.tag_delete(name)?;
            }
            (kind, Some(remote_name)) => {
                let destination = match kind {
                    RefDeleteKind::Branch => format!("refs/heads/{}", name),
                    RefDeleteKind::Tag => format!("refs/tags/{}", name),
                };
                let mut remote = self.repo.find_remote(remote_name)?;
                self.push_refspecs(&mut remote, &[format!(":{}", destination).as_str()])?;
                if kind == RefDeleteKind::Branch {
                    if let Ok(mut tracking) = self
                        .repo
                        .find_reference(&format!("refs/remotes/{}/{}", remote_name, name))
                    {
                        tracking.delete()?;
                    }
                }
            }
        }
        info!("Deleted {:?} {} (remote {:?})", kind, name, remote);
        Ok(())
    }

    /// Merge `sha1` into HEAD, fast-forwarding when possible.
    pub fn merge_into_head(&self, sha1: &str) -> Result<()> {
        let their = self.find_commit(sha1)?;
        let annotated = self.repo.find_annotated_commit(their.id())?;
        let (analysis, _) = self.repo.merge_analysis(&[&annotated])?;

        if analysis.is_up_to_date() {
            debug!("{} already merged", sha1);
            return Ok(());
        }

        if analysis.is_fast_forward() {
            let mut head = self.repo.head()?;
            if head.is_branch() {
                head.set_target(their.id(), &format!("merge {}: fast-forward", sha1))?;
            } else {
                self.repo.set_head_detached(their.id())?;
            }
            self.repo
                .checkout_head(Some(git2::build::CheckoutBuilder::default().force()))?;
            info!("Fast-forwarded to {}", sha1);
            return Ok(());
        }

        self.repo.merge(&[&annotated], None, None)?;
        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            let paths = conflict_paths(&index)?;
            self.repo.cleanup_state()?;
            self.repo.reset(
                self.repo.head()?.peel_to_commit()?.as_object(),
                ResetType::Hard,
                None,
            )?;
            return Err(GraphError::Conflict {
                operation: "merge".to_string(),
                paths,
            });
        }

        let tree = self.repo.find_tree(index.write_tree()?)?;
        let ours = self.repo.head()?.peel_to_commit()?;
        let signature = self.signature()?;
        let message = format!("Merge commit '{}'", their.id());
        let merge_id = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &message,
            &tree,
            &[&ours, &their],
        )?;
        self.repo.cleanup_state()?;
        info!("Created merge commit {}", merge_id);
        Ok(())
    }

    /// Replay HEAD's commits on top of `onto`.
    pub fn rebase_head(&self, onto: &str) -> Result<()> {
        let onto_commit = self.find_commit(onto)?;
        let upstream = self.repo.find_annotated_commit(onto_commit.id())?;
        let signature = self.signature()?;
        let mut rebase = self.repo.rebase(None, Some(&upstream), None, None)?;

        while let Some(operation) = rebase.next() {
            operation?;
            let index = self.repo.index()?;
            if index.has_conflicts() {
                let paths = conflict_paths(&index)?;
                rebase.abort()?;
                return Err(GraphError::Conflict {
                    operation: "rebase".to_string(),
                    paths,
                });
            }
            match rebase.commit(None, &signature, None) {
                Ok(_) => {}
                // Patch already upstream
                Err(e) if e.code() == ErrorCode::Applied => {}
                Err(e) => {
                    rebase.abort()?;
                    return Err(e.into());
                }
            }
        }
        rebase.finish(Some(&signature))?;
        info!("Rebased onto {}", onto);
        Ok(())
    }
}

fn signature_of(signature: &git2::Signature<'_>) -> Signature {
    Signature {
        name: signature.name().unwrap_or("").to_string(),
        email: signature.email().unwrap_or("").to_string(),
        date: DateTime::from_timestamp(signature.when().seconds(), 0).unwrap_or_default(),
    }
}

fn conflict_paths(index: &git2::Index) -> Result<Vec<String>> {
    let mut paths = Vec::new();
    for conflict in index.conflicts()? {
        let conflict = conflict?;
        if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
            paths.push(String::from_utf8_lossy(&entry.path).into_owned());
        }
    }
    Ok(paths)
}

fn is_non_fast_forward(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("non-fast-forward")
        || message.contains("fetch first")
        || message.contains("not a fast forward")
}

fn ready<'a, T: 'a>(value: T) -> LocalBoxFuture<'a, T> {
    Box::pin(futures::future::ready(value))
}

impl RepositoryDataSource for GitRepository {
    fn load_commits(&self, window: LoadWindow) -> LocalBoxFuture<'_, Result<Vec<Commit>>> {
        ready(self.commits(window))
    }

    fn load_refs(&self) -> LocalBoxFuture<'_, Result<Vec<RefTarget>>> {
        ready(self.ref_targets())
    }

    fn checked_out_branch(&self) -> LocalBoxFuture<'_, Result<Option<String>>> {
        ready(self.current_branch())
    }

    fn reset_hard(&self, sha1: String) -> LocalBoxFuture<'_, Result<()>> {
        ready(self.reset_hard_to(&sha1))
    }

    fn move_tag(&self, name: String, sha1: String, force: bool) -> LocalBoxFuture<'_, Result<()>> {
        ready(self.set_tag(&name, &sha1, force))
    }

    fn move_branch(
        &self,
        name: String,
        sha1: String,
        force: bool,
    ) -> LocalBoxFuture<'_, Result<()>> {
        ready(self.set_branch(&name, &sha1, force))
    }

    fn create_branch(&self, name: String, sha1: String) -> LocalBoxFuture<'_, Result<()>> {
        ready(self.set_branch(&name, &sha1, false))
    }

    fn push(&self, request: PushRequest) -> LocalBoxFuture<'_, Result<()>> {
        ready(self.push_to_remote(&request))
    }

    fn delete_ref(
        &self,
        kind: RefDeleteKind,
        remote: Option<String>,
        name: String,
    ) -> LocalBoxFuture<'_, Result<()>> {
        ready(self.delete(kind, remote.as_deref(), &name))
    }

    fn merge(&self, sha1: String) -> LocalBoxFuture<'_, Result<()>> {
        ready(self.merge_into_head(&sha1))
    }

    fn rebase(&self, onto: String) -> LocalBoxFuture<'_, Result<()>> {
        ready(self.rebase_head(&onto))
    }
}
