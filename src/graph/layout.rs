//! Branch ownership and layout engine.
//!
//! Every pass runs synchronously over the whole node registry:
//!
//! 1. ownership: each commit is attributed to an "ideological" branch by
//!    first-parent propagation from branch refs, with HEAD's lineage
//!    re-walked last so the checked-out branch wins through merges;
//! 2. lanes: every lane key gets a persistent horizontal slot, lane 0 being
//!    reserved for HEAD's lane;
//! 3. rows: nodes are stacked newest first, HEAD's lane more spaciously.

use crate::graph::node::GraphNode;
use crate::graph::refs::Ref;
use crate::graph::selection::{ActionTarget, Selection};
use crate::models::{Color, Vector2};
use crate::state::LayoutSettings;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Prefix of lane keys given to history that no branch claims
pub const DETACHED_LANE_PREFIX: &str = "detached:";

/// Problem found while ingesting or laying out the graph. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum LayoutDiagnostic {
    /// Malformed commit record left out of the graph
    SkippedCommit { sha1: String, reason: String },
    /// Second record for an already loaded sha1
    DuplicateCommit { sha1: String },
    /// First-parent walk came back to a node it already visited
    ParentCycle { sha1: String },
}

/// Persistent branch → lane assignment for the lifetime of a graph view.
///
/// Slots start at 1, only grow and are never handed out twice; slot 0 is
/// the HEAD lane.
#[derive(Debug, Clone)]
pub struct BranchOrderRegistry {
    orders: HashMap<String, usize>,
    next: usize,
}

impl Default for BranchOrderRegistry {
    fn default() -> Self {
        Self {
            orders: HashMap::new(),
            next: 1,
        }
    }
}

impl BranchOrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.orders.get(key).copied()
    }

    /// Slot of `key`, handing out the next free one on first encounter.
    pub fn assign(&mut self, key: &str) -> usize {
        if let Some(order) = self.orders.get(key) {
            return *order;
        }
        let order = self.next;
        self.next += 1;
        debug!("Lane {} assigned to {}", order, key);
        self.orders.insert(key.to_string(), order);
        order
    }

    /// Forget keys that no longer appear. Their slots are not reused.
    pub fn retain(&mut self, live: &HashSet<String>) {
        self.orders.retain(|key, _| live.contains(key));
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

/// Outcome of a layout pass
#[derive(Debug, Clone, Default)]
pub struct LayoutReport {
    pub diagnostics: Vec<LayoutDiagnostic>,
    /// Lane key of the node carrying HEAD, if HEAD is loaded
    pub head_lane: Option<String>,
    pub width: f64,
    pub height: f64,
}

/// Sha1 of the node `HEAD` points at, if that node is loaded.
pub fn head_node(nodes: &HashMap<String, GraphNode>, refs: &HashMap<String, Ref>) -> Option<String> {
    refs.get("HEAD")
        .and_then(|head| head.node.clone())
        .filter(|sha1| nodes.contains_key(sha1))
}

/// Pick the branch a node claims through its own refs.
///
/// Tie-break: the checked-out branch, local branches, remote branches, then by name.
fn branch_candidate(
    node: &GraphNode,
    refs: &HashMap<String, Ref>,
    checked_out: Option<&str>,
) -> Option<String> {
    node.ref_names
        .iter()
        .filter_map(|name| refs.get(name))
        .filter(|r| r.is_branch_candidate())
        .min_by_key(|r| {
            (
                !r.is_current(checked_out),
                !r.is_local_branch(),
                !r.is_remote_branch(),
                r.name.clone(),
            )
        })
        .map(|r| r.name.clone())
}

/// Attribute every node to an ideological branch.
///
/// `order` is the processing order (newest first). Nodes that end up
/// unowned keep `None`.
pub fn assign_ideological_branches(
    nodes: &mut HashMap<String, GraphNode>,
    order: &[String],
    refs: &HashMap<String, Ref>,
    checked_out: Option<&str>,
) -> Vec<LayoutDiagnostic> {
    let mut diagnostics = Vec::new();

    for node in nodes.values_mut() {
        node.ideological_branch = None;
    }

    let candidates: HashMap<String, String> = order
        .iter()
        .filter_map(|sha1| {
            let node = nodes.get(sha1)?;
            branch_candidate(node, refs, checked_out).map(|branch| (sha1.clone(), branch))
        })
        .collect();

    // Claims from each branch ref, down the first-parent chain
    for sha1 in order {
        let Some(branch) = candidates.get(sha1) else {
            continue;
        };
        let Some(node) = nodes.get_mut(sha1) else {
            continue;
        };
        if node.ideological_branch.is_some() {
            continue;
        }
        node.ideological_branch = Some(branch.clone());

        let mut visited = HashSet::from([sha1.clone()]);
        let mut current = node.first_parent().map(str::to_string);
        while let Some(parent) = current {
            if !visited.insert(parent.clone()) {
                diagnostics.push(LayoutDiagnostic::ParentCycle { sha1: parent });
                break;
            }
            if candidates.contains_key(&parent) {
                break;
            }
            let Some(parent_node) = nodes.get_mut(&parent) else {
                break;
            };
            if parent_node.ideological_branch.is_some() {
                break;
            }
            parent_node.ideological_branch = Some(branch.clone());
            current = parent_node.first_parent().map(str::to_string);
        }
    }

    // HEAD's lineage goes to HEAD's branch, except commits carrying their own branch
    if let Some(head) = head_node(nodes, refs) {
        if let Some(branch) = nodes.get(&head).and_then(|n| n.ideological_branch.clone()) {
            let mut visited = HashSet::new();
            let mut current = Some(head);
            while let Some(sha1) = current {
                if !visited.insert(sha1.clone()) {
                    diagnostics.push(LayoutDiagnostic::ParentCycle { sha1 });
                    break;
                }
                let Some(node) = nodes.get_mut(&sha1) else {
                    break;
                };
                if !candidates.contains_key(&sha1) {
                    node.ideological_branch = Some(branch.clone());
                }
                current = node.first_parent().map(str::to_string);
            }
        }
    }

    for diagnostic in &diagnostics {
        warn!("Ownership walk stopped: {:?}", diagnostic);
    }
    diagnostics
}

/// Give every node a lane key: its branch, or a detached key shared by an
/// unowned first-parent chain and named after the chain's oldest commit,
/// so commits added on top of the chain keep it in place.
pub fn assign_lane_keys(nodes: &mut HashMap<String, GraphNode>, order: &[String]) {
    for node in nodes.values_mut() {
        node.lane_key = node.ideological_branch.clone().unwrap_or_default();
    }

    for sha1 in order {
        let needs_key = nodes
            .get(sha1)
            .map(|n| n.lane_key.is_empty())
            .unwrap_or(false);
        if !needs_key {
            continue;
        }
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(sha1.clone());
        while let Some(sha1) = current {
            let Some(node) = nodes.get(&sha1) else {
                break;
            };
            if !node.lane_key.is_empty() || !visited.insert(sha1.clone()) {
                break;
            }
            current = node.first_parent().map(str::to_string);
            chain.push(sha1);
        }

        let Some(oldest) = chain.last() else {
            continue;
        };
        let key = format!("{}{}", DETACHED_LANE_PREFIX, oldest);
        for sha1 in &chain {
            if let Some(node) = nodes.get_mut(sha1) {
                node.lane_key = key.clone();
            }
        }
    }
}

/// Layout engine with its persistent lane registry.
#[derive(Debug, Clone)]
pub struct LayoutEngine {
    settings: LayoutSettings,
    registry: BranchOrderRegistry,
}

impl LayoutEngine {
    pub fn new(settings: LayoutSettings) -> Self {
        Self {
            settings,
            registry: BranchOrderRegistry::new(),
        }
    }

    pub fn settings(&self) -> &LayoutSettings {
        &self.settings
    }

    pub fn registry(&self) -> &BranchOrderRegistry {
        &self.registry
    }

    /// Run a full pass: ownership, lane keys, lanes, rows and ref lanes.
    pub fn run(
        &mut self,
        nodes: &mut HashMap<String, GraphNode>,
        order: &[String],
        refs: &mut HashMap<String, Ref>,
        checked_out: Option<&str>,
        selection: &Selection,
    ) -> LayoutReport {
        let diagnostics = assign_ideological_branches(nodes, order, refs, checked_out);
        assign_lane_keys(nodes, order);

        let head_lane = head_node(nodes, refs)
            .and_then(|sha1| nodes.get(&sha1))
            .map(|n| n.lane_key.clone());

        let lanes = self.assign_lanes(nodes, order, refs, head_lane.as_deref());
        let (width, height) =
            self.assign_positions(nodes, order, refs, head_lane.as_deref(), selection);

        for r in refs.values_mut() {
            r.branch_order = lanes
                .get(&r.name)
                .copied()
                .or_else(|| self.registry.get(&r.name))
                .or_else(|| r.node.as_ref().and_then(|sha1| nodes.get(sha1)).map(|n| n.branch_order))
                .unwrap_or(0);
        }

        debug!(
            "Layout pass: {} nodes, {} lanes, head lane {:?}",
            order.len(),
            lanes.len(),
            head_lane
        );

        LayoutReport {
            diagnostics,
            head_lane,
            width,
            height,
        }
    }

    /// Resolve the lane of every key, registering new keys oldest first.
    ///
    /// A branch keeps its slot while its ref exists, even through passes
    /// where it owns no node (its tip shared with a branch that wins the
    /// tie-break).
    fn assign_lanes(
        &mut self,
        nodes: &mut HashMap<String, GraphNode>,
        order: &[String],
        refs: &HashMap<String, Ref>,
        head_lane: Option<&str>,
    ) -> HashMap<String, usize> {
        let mut drawn = HashSet::new();
        for sha1 in order.iter().rev() {
            let Some(node) = nodes.get(sha1) else {
                continue;
            };
            if !drawn.insert(node.lane_key.clone()) {
                continue;
            }
            let is_head = head_lane == Some(node.lane_key.as_str());
            if !is_head || self.registry.get(&node.lane_key).is_some() {
                self.registry.assign(&node.lane_key);
            }
        }

        let mut live: HashSet<String> = refs
            .values()
            .filter(|r| r.is_branch_candidate())
            .map(|r| r.name.clone())
            .collect();
        live.extend(drawn.iter().cloned());
        self.registry.retain(&live);

        let mut lanes = HashMap::new();
        for key in drawn {
            let lane = if head_lane == Some(key.as_str()) {
                0
            } else {
                self.registry.assign(&key)
            };
            lanes.insert(key, lane);
        }

        for node in nodes.values_mut() {
            node.branch_order = lanes.get(&node.lane_key).copied().unwrap_or(0);
        }
        lanes
    }

    /// Stack nodes newest first and return the graph extent.
    fn assign_positions(
        &self,
        nodes: &mut HashMap<String, GraphNode>,
        order: &[String],
        refs: &HashMap<String, Ref>,
        head_lane: Option<&str>,
        selection: &Selection,
    ) -> (f64, f64) {
        let s = &self.settings;
        let mut y = s.header_band;
        let mut previous_main = false;
        let mut previous_selected = false;
        let mut highest_lane = 0;

        for sha1 in order {
            let Some(node) = nodes.get_mut(sha1) else {
                continue;
            };
            let main = head_lane == Some(node.lane_key.as_str());

            let mut step = if main && previous_main {
                s.double_step
            } else {
                s.single_step
            };
            if previous_selected {
                step += s.selected_extra_spacing;
            }
            y += step;

            node.position = Vector2::new(s.lane_offset + s.lane_width * node.branch_order as f64, y);
            node.radius = if main { s.main_radius } else { s.side_radius };
            node.is_main_line = main;
            node.color = node
                .ideological_branch
                .as_ref()
                .and_then(|branch| refs.get(branch))
                .map(|r| r.color)
                .unwrap_or(Color::UNOWNED);

            highest_lane = highest_lane.max(node.branch_order);
            previous_main = main;
            previous_selected = selection.is_selected(&ActionTarget::Node(sha1.clone()));
        }

        let width = s.lane_offset + s.lane_width * (highest_lane + 1) as f64 + s.right_margin;
        let height = if order.is_empty() {
            s.header_band + s.bottom_margin
        } else {
            y + s.bottom_margin
        };
        (width, height)
    }
}

/// Endpoints of the line from `child` to `parent`, pulled in along the line
/// by each circle's radius plus `margin` so strokes stop short of the nodes.
pub fn edge_endpoints(
    child: Vector2,
    child_radius: f64,
    parent: Vector2,
    parent_radius: f64,
    margin: f64,
) -> (Vector2, Vector2) {
    let direction = (parent - child).normalized();
    (
        child + direction * (child_radius + margin),
        parent - direction * (parent_radius + margin),
    )
}
