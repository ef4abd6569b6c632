use crate::git::RefTarget;
use crate::graph::layout::{self, LayoutDiagnostic, LayoutEngine};
use crate::graph::node::GraphNode;
use crate::graph::refs::Ref;
use crate::graph::selection::{ActionTarget, Selection};
use crate::models::Commit;
use crate::state::LayoutSettings;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Node and ref registries of one repository view, plus the state derived
/// from them.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: HashMap<String, GraphNode>,
    /// Processing order: commit time descending, load order as tie-break
    order: Vec<String>,
    refs: HashMap<String, Ref>,
    selection: Selection,
    checked_out_branch: Option<String>,
    layout: LayoutEngine,
    ingest_diagnostics: Vec<LayoutDiagnostic>,
    layout_diagnostics: Vec<LayoutDiagnostic>,
    head_lane: Option<String>,
    width: f64,
    height: f64,
    layout_generation: u64,
}

impl Graph {
    pub fn new(settings: LayoutSettings) -> Self {
        let height = settings.header_band + settings.bottom_margin;
        Self {
            nodes: HashMap::new(),
            order: Vec::new(),
            refs: HashMap::new(),
            selection: Selection::new(),
            checked_out_branch: None,
            layout: LayoutEngine::new(settings),
            ingest_diagnostics: Vec::new(),
            layout_diagnostics: Vec::new(),
            head_lane: None,
            width: 0.0,
            height,
            layout_generation: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, sha1: &str) -> Option<&GraphNode> {
        self.nodes.get(sha1)
    }

    pub fn node_mut(&mut self, sha1: &str) -> Option<&mut GraphNode> {
        self.nodes.get_mut(sha1)
    }

    pub fn nodes(&self) -> &HashMap<String, GraphNode> {
        &self.nodes
    }

    /// Nodes in row order, newest first
    pub fn ordered_nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.order.iter().filter_map(|sha1| self.nodes.get(sha1))
    }

    pub fn get_ref(&self, name: &str) -> Option<&Ref> {
        self.refs.get(name)
    }

    pub fn refs(&self) -> &HashMap<String, Ref> {
        &self.refs
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut Selection {
        &mut self.selection
    }

    pub fn checked_out_branch(&self) -> Option<&str> {
        self.checked_out_branch.as_deref()
    }

    pub fn settings(&self) -> &LayoutSettings {
        self.layout.settings()
    }

    pub fn head_node(&self) -> Option<&GraphNode> {
        layout::head_node(&self.nodes, &self.refs).and_then(|sha1| self.nodes.get(&sha1))
    }

    pub fn head_lane(&self) -> Option<&str> {
        self.head_lane.as_deref()
    }

    /// Local branch ref that is checked out, if it is loaded
    pub fn checked_out_ref(&self) -> Option<&Ref> {
        self.refs
            .values()
            .find(|r| r.is_current(self.checked_out_branch.as_deref()))
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    /// Bumped by every layout pass
    pub fn layout_generation(&self) -> u64 {
        self.layout_generation
    }

    pub fn diagnostics(&self) -> Vec<LayoutDiagnostic> {
        self.ingest_diagnostics
            .iter()
            .chain(&self.layout_diagnostics)
            .cloned()
            .collect()
    }

    pub fn entity_exists(&self, target: &ActionTarget) -> bool {
        match target {
            ActionTarget::Node(sha1) => self.nodes.contains_key(sha1),
            ActionTarget::Ref(name) => self.refs.contains_key(name),
        }
    }

    /// Replace the graph contents with a full reload.
    ///
    /// Nodes and refs that survive are updated in place; the rest are
    /// pruned. Malformed and duplicate commits are skipped and reported.
    pub fn apply_snapshot(
        &mut self,
        commits: Vec<Commit>,
        ref_targets: Vec<RefTarget>,
        checked_out: Option<String>,
    ) -> Vec<LayoutDiagnostic> {
        let mut diagnostics = Vec::new();
        let mut order = Vec::with_capacity(commits.len());
        let mut incoming = HashMap::with_capacity(commits.len());
        let mut desired_refs = BTreeMap::new();

        for commit in commits {
            if let Err(e) = commit.validate() {
                warn!("Skipping commit {:?}: {}", commit.sha1, e);
                diagnostics.push(LayoutDiagnostic::SkippedCommit {
                    sha1: commit.sha1.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
            if incoming.contains_key(&commit.sha1) {
                warn!("Duplicate commit {}", commit.sha1);
                diagnostics.push(LayoutDiagnostic::DuplicateCommit {
                    sha1: commit.sha1.clone(),
                });
                continue;
            }
            for name in &commit.refs {
                desired_refs.insert(name.clone(), commit.sha1.clone());
            }
            order.push(commit.sha1.clone());
            incoming.insert(commit.sha1.clone(), commit);
        }
        for target in ref_targets {
            desired_refs.insert(target.name, target.sha1);
        }

        self.nodes.retain(|sha1, _| incoming.contains_key(sha1));
        for (sha1, commit) in incoming {
            match self.nodes.get_mut(&sha1) {
                Some(node) => node.update_commit(commit),
                None => {
                    self.nodes.insert(sha1, GraphNode::new(commit));
                }
            }
        }

        let mut edges = Vec::new();
        for sha1 in &order {
            if let Some(node) = self.nodes.get(sha1) {
                for parent in node.parents() {
                    edges.push((parent.clone(), sha1.clone()));
                }
            }
        }
        for (parent, child) in edges {
            if let Some(parent) = self.nodes.get_mut(&parent) {
                parent.children.push(child);
            }
        }

        self.refs.retain(|name, _| desired_refs.contains_key(name));
        for (name, sha1) in desired_refs {
            let node = self.nodes.contains_key(&sha1).then_some(sha1);
            self.refs
                .entry(name.clone())
                .or_insert_with(|| Ref::new(name))
                .node = node;
        }

        // Commit time descending; the stable sort keeps load order for equal times
        order.sort_by(|a, b| {
            let date = |sha1: &String| self.nodes.get(sha1).map(|n| n.commit.commit_date());
            date(b).cmp(&date(a))
        });
        self.order = order;
        self.checked_out_branch = checked_out;

        if let Some(current) = self.selection.current().cloned() {
            if !self.entity_exists(&current) {
                debug!("Selected {:?} left the graph", current);
                self.selection.clear();
            }
        }

        info!(
            "Snapshot applied: {} nodes, {} refs, {} skipped",
            self.nodes.len(),
            self.refs.len(),
            diagnostics.len()
        );
        self.ingest_diagnostics = diagnostics;
        self.relayout();
        self.diagnostics()
    }

    /// Point `name` at another node without touching the repository.
    ///
    /// Returns the previous node so the change can be rolled back.
    pub fn set_ref_node(&mut self, name: &str, sha1: Option<String>) -> Option<Option<String>> {
        let node = sha1.filter(|sha1| self.nodes.contains_key(sha1));
        let r = self.refs.get_mut(name)?;
        let previous = std::mem::replace(&mut r.node, node);
        self.relayout();
        Some(previous)
    }

    /// Recompute ownership, lanes and positions.
    pub fn relayout(&mut self) {
        self.attach_refs();
        let report = self.layout.run(
            &mut self.nodes,
            &self.order,
            &mut self.refs,
            self.checked_out_branch.as_deref(),
            &self.selection,
        );
        self.layout_diagnostics = report.diagnostics;
        self.head_lane = report.head_lane;
        self.width = report.width;
        self.height = report.height;
        self.layout_generation += 1;
    }

    fn attach_refs(&mut self) {
        for node in self.nodes.values_mut() {
            node.ref_names.clear();
        }
        let mut names: Vec<(&String, &String)> = self
            .refs
            .values()
            .filter_map(|r| r.node.as_ref().map(|sha1| (sha1, &r.name)))
            .collect();
        names.sort();
        for (sha1, name) in names {
            if let Some(node) = self.nodes.get_mut(sha1) {
                node.ref_names.push(name.clone());
            }
        }
    }

    /// Whether `ancestor` is reachable from `descendant` through loaded parents.
    /// A node counts as its own ancestor.
    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![descendant];
        while let Some(sha1) = stack.pop() {
            if sha1 == ancestor {
                return true;
            }
            if !visited.insert(sha1) {
                continue;
            }
            if let Some(node) = self.nodes.get(sha1) {
                stack.extend(node.parents().iter().map(String::as_str));
            }
        }
        false
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new(LayoutSettings::default())
    }
}
