//! Integration tests for gitgraph-rs
//!
//! End-to-end checks of the graph model against generated histories and
//! real Git repositories.

use gitgraph_rs::git::{make_commit, FixedDecision, GitRepository, RefTarget};
use gitgraph_rs::graph::{ActionTarget, DropAction, DropOutcome, Graph, GraphController};
use gitgraph_rs::models::Commit;
use gitgraph_rs::state::GraphConfig;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Test utilities for integration tests
pub mod test_utils {
    use std::path::{Path, PathBuf};
    use std::process::Command;
    use tempfile::TempDir;

    pub fn git(repo_path: &Path, args: &[&str]) -> anyhow::Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(repo_path)
            .output()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Create a temporary Git repository for testing
    pub fn create_test_repo() -> anyhow::Result<(TempDir, PathBuf)> {
        let temp_dir = TempDir::new()?;
        let repo_path = temp_dir.path().to_path_buf();

        git(&repo_path, &["init"])?;
        git(&repo_path, &["symbolic-ref", "HEAD", "refs/heads/master"])?;
        git(&repo_path, &["config", "user.name", "Test User"])?;
        git(&repo_path, &["config", "user.email", "test@example.com"])?;

        Ok((temp_dir, repo_path))
    }

    /// Create a test commit dated `timestamp`, returning its sha1
    pub fn create_test_commit(
        repo_path: &Path,
        message: &str,
        timestamp: i64,
    ) -> anyhow::Result<String> {
        let file = format!("{}.txt", message.replace(' ', "_"));
        std::fs::write(repo_path.join(&file), message)?;
        git(repo_path, &["add", &file])?;

        let date = format!("@{} +0000", timestamp);
        Command::new("git")
            .args(["commit", "-m", message])
            .env("GIT_AUTHOR_DATE", &date)
            .env("GIT_COMMITTER_DATE", &date)
            .current_dir(repo_path)
            .output()?;
        git(repo_path, &["rev-parse", "HEAD"])
    }
}

/// Random history: commit `i` has parents among earlier commits, branches
/// sit on random commits and HEAD is on `b0`.
#[derive(Debug, Clone)]
struct History {
    commits: Vec<Commit>,
    refs: Vec<RefTarget>,
}

fn history_strategy() -> impl Strategy<Value = History> {
    (2usize..24)
        .prop_flat_map(|n| {
            let parents = (1..n)
                .map(|i| proptest::collection::vec(0..i, 1..=2))
                .collect::<Vec<_>>();
            let branches = proptest::collection::vec(0..n, 1..5);
            (Just(n), parents, branches)
        })
        .prop_map(|(n, parents, branches)| {
            let sha = |i: usize| format!("c{:02}", i);
            let mut commits = vec![make_commit(&sha(0), &[], 10)];
            for i in 1..n {
                let mut ps: Vec<String> = parents[i - 1].iter().map(|&p| sha(p)).collect();
                ps.dedup();
                let ps: Vec<&str> = ps.iter().map(String::as_str).collect();
                commits.push(make_commit(&sha(i), &ps, 10 * (i as i64 + 1)));
            }
            commits.reverse();

            let mut refs: Vec<RefTarget> = branches
                .iter()
                .enumerate()
                .map(|(b, &i)| RefTarget::new(format!("refs/heads/b{}", b), sha(i)))
                .collect();
            refs.push(RefTarget::new("HEAD", sha(branches[0])));
            History { commits, refs }
        })
}

fn layout(history: &History) -> Graph {
    let mut graph = Graph::default();
    graph.apply_snapshot(
        history.commits.clone(),
        history.refs.clone(),
        Some("b0".to_string()),
    );
    graph
}

/// Lane of every local branch ref
fn branch_lanes(graph: &Graph) -> HashMap<String, usize> {
    graph
        .refs()
        .values()
        .filter(|r| r.is_local_branch())
        .map(|r| (r.name.clone(), r.branch_order))
        .collect()
}

/// `refs` with `name` pointing at `sha1`
fn retarget(refs: &[RefTarget], name: &str, sha1: &str) -> Vec<RefTarget> {
    refs.iter()
        .map(|r| {
            if r.name == name {
                RefTarget::new(name, sha1)
            } else {
                r.clone()
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn prop_layout_is_deterministic(history in history_strategy()) {
        let a = layout(&history);
        let mut shuffled = history.clone();
        shuffled.commits.reverse();
        shuffled.refs.reverse();
        let b = layout(&shuffled);

        for node in a.nodes().values() {
            let other = b.node(node.sha1()).unwrap();
            prop_assert_eq!(&node.ideological_branch, &other.ideological_branch);
            prop_assert_eq!(node.position, other.position);
            prop_assert_eq!(node.branch_order, other.branch_order);
        }
    }

    #[test]
    fn prop_head_is_leftmost(history in history_strategy()) {
        let graph = layout(&history);
        let head = graph.head_node().unwrap();
        prop_assert_eq!(head.branch_order, 0);
        prop_assert!(head.is_main_line);
        for node in graph.nodes().values() {
            prop_assert_eq!(node.branch_order == 0, Some(node.lane_key.as_str()) == graph.head_lane());
        }
    }

    #[test]
    fn prop_lanes_survive_new_commits(history in history_strategy(), base in 0usize..24) {
        let mut graph = layout(&history);
        let before = branch_lanes(&graph);

        let tip = history.commits[base % history.commits.len()].sha1.clone();
        let mut commits = history.commits.clone();
        commits.insert(0, make_commit("new", &[tip.as_str()], 10_000));
        let mut refs = history.refs.clone();
        refs.push(RefTarget::new("refs/heads/fresh", "new"));
        graph.apply_snapshot(commits, refs, Some("b0".to_string()));

        let after = branch_lanes(&graph);
        for (name, order) in &before {
            prop_assert_eq!(Some(order), after.get(name), "lane of {} moved", name);
        }
    }

    #[test]
    fn prop_moved_branch_returns_to_its_lane(
        history in history_strategy(),
        pick in 0usize..8,
        target in 0usize..24,
    ) {
        let branches: Vec<RefTarget> = history
            .refs
            .iter()
            .filter(|r| r.name != "HEAD" && r.name != "refs/heads/b0")
            .cloned()
            .collect();
        prop_assume!(!branches.is_empty());
        let moved = &branches[pick % branches.len()];

        let mut graph = layout(&history);
        // Only branches drawn on their own lane have a slot to keep
        prop_assume!(graph.nodes().values().any(|n| n.lane_key == moved.name));
        let before = branch_lanes(&graph);
        let drawn: HashSet<String> = graph.nodes().values().map(|n| n.lane_key.clone()).collect();

        let elsewhere = history.commits[target % history.commits.len()].sha1.clone();
        let away = retarget(&history.refs, &moved.name, &elsewhere);
        graph.apply_snapshot(history.commits.clone(), away, Some("b0".to_string()));
        prop_assert_eq!(
            graph.get_ref(&moved.name).map(|r| r.branch_order),
            before.get(&moved.name).copied()
        );

        graph.apply_snapshot(history.commits.clone(), history.refs.clone(), Some("b0".to_string()));
        let after = branch_lanes(&graph);
        for (name, order) in before.iter().filter(|(name, _)| drawn.contains(*name)) {
            prop_assert_eq!(Some(order), after.get(name), "lane of {} moved", name);
        }
    }
}

#[test]
fn test_branch_keeps_lane_while_sharing_checked_out_tip() {
    let commits = vec![
        make_commit("m1", &["c1"], 30),
        make_commit("f1", &["c1"], 20),
        make_commit("c1", &[], 10),
    ];
    let refs = vec![
        RefTarget::new("HEAD", "m1"),
        RefTarget::new("refs/heads/master", "m1"),
        RefTarget::new("refs/heads/feature", "f1"),
    ];
    let feature_lane = |graph: &Graph| graph.get_ref("refs/heads/feature").unwrap().branch_order;

    let mut graph = Graph::default();
    graph.apply_snapshot(commits.clone(), refs.clone(), Some("master".into()));
    let before = feature_lane(&graph);
    assert_eq!(before, 1);

    // Fast-forwarded onto master: master wins the shared commit
    graph.apply_snapshot(
        commits.clone(),
        retarget(&refs, "refs/heads/feature", "m1"),
        Some("master".into()),
    );
    assert_eq!(graph.node("m1").unwrap().lane_key, "refs/heads/master");
    assert_eq!(feature_lane(&graph), before);

    graph.apply_snapshot(commits, refs, Some("master".into()));
    assert_eq!(feature_lane(&graph), before);
    assert_eq!(graph.node("f1").unwrap().branch_order, before);
}

#[test]
fn test_branch_slots_are_never_reused() {
    let commits = vec![
        make_commit("h1", &["c1"], 40),
        make_commit("f1", &["c1"], 30),
        make_commit("c2", &["c1"], 20),
        make_commit("c1", &[], 10),
    ];
    let mut graph = Graph::default();
    graph.apply_snapshot(
        commits.clone(),
        vec![
            RefTarget::new("HEAD", "c2"),
            RefTarget::new("refs/heads/master", "c2"),
            RefTarget::new("refs/heads/feature", "f1"),
        ],
        Some("master".into()),
    );
    let feature_lane = graph.node("f1").unwrap().branch_order;
    assert_eq!(feature_lane, 1);

    // feature deleted, hotfix created
    graph.apply_snapshot(
        commits,
        vec![
            RefTarget::new("HEAD", "c2"),
            RefTarget::new("refs/heads/master", "c2"),
            RefTarget::new("refs/heads/hotfix", "h1"),
        ],
        Some("master".into()),
    );
    let hotfix_lane = graph.node("h1").unwrap().branch_order;
    assert_ne!(hotfix_lane, feature_lane);
    // f1 lost its branch and sits on its own detached lane
    assert!(graph.node("f1").unwrap().lane_key.starts_with("detached:"));
    assert_eq!(graph.get_ref("refs/heads/hotfix").unwrap().branch_order, hotfix_lane);
}

#[tokio::test]
async fn test_head_priority_on_real_repository() -> anyhow::Result<()> {
    use test_utils::*;

    let (_temp_dir, repo_path) = create_test_repo()?;
    let c1 = create_test_commit(&repo_path, "first", 1_000)?;
    let c2 = create_test_commit(&repo_path, "second", 2_000)?;
    git(&repo_path, &["checkout", "-b", "testing"])?;
    let c3 = create_test_commit(&repo_path, "third", 3_000)?;

    let repo = GitRepository::discover(&repo_path)?;
    let (controller, _events) = GraphController::new(
        Rc::new(repo),
        Rc::new(FixedDecision(false)),
        &GraphConfig::default(),
    );
    controller.load_nodes_from_api().await?;

    {
        let graph = controller.graph();
        let owner = |sha1: &str| graph.node(sha1).unwrap().ideological_branch.clone();
        assert_eq!(owner(&c3).as_deref(), Some("refs/heads/testing"));
        assert_eq!(owner(&c2).as_deref(), Some("refs/heads/master"));
        assert_eq!(owner(&c1).as_deref(), Some("refs/heads/testing"));
        assert_eq!(graph.checked_out_branch(), Some("testing"));
    }

    // Drag master onto the tip of testing
    controller.drag_start(ActionTarget::Ref("refs/heads/master".into()))?;
    assert_eq!(
        controller.available_actions(&ActionTarget::Node(c3.clone())),
        vec![DropAction::Move]
    );
    let outcome = controller
        .drop_on(ActionTarget::Node(c3.clone()), DropAction::Move)
        .await?;
    assert_eq!(outcome, DropOutcome::Applied);
    assert_eq!(test_utils::git(&repo_path, &["rev-parse", "master"])?, c3);
    assert_eq!(
        controller.graph().get_ref("refs/heads/master").unwrap().node.as_deref(),
        Some(c3.as_str())
    );

    let frame = controller.render_frame(std::time::Duration::ZERO, |_| true);
    assert_eq!(frame.nodes.len(), 3);
    assert_eq!(frame.edges.len(), 2);
    Ok(())
}
