//! Serializable render output handed to the view renderer.

use crate::graph::animation::NodeGraphic;
use crate::graph::layout::edge_endpoints;
use crate::graph::model::Graph;
use crate::graph::selection::{ActionTarget, Selectable};
use crate::models::{Color, Vector2};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeView {
    pub sha1: String,
    pub summary: String,
    pub position: Vector2,
    pub radius: f64,
    pub color: Color,
    pub branch: Option<String>,
    pub is_main_line: bool,
    pub selected: bool,
    pub highlighted: bool,
    pub mouse_hover: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeView {
    pub child: String,
    pub parent: String,
    pub start: Vector2,
    pub end: Vector2,
    pub color: Color,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefView {
    pub name: String,
    pub local_ref_name: String,
    pub color: Color,
    pub branch_order: usize,
    /// Anchor of the label: the displayed position of the ref's node
    pub position: Vector2,
    pub selected: bool,
    pub is_current: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frame {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    pub refs: Vec<RefView>,
    pub width: f64,
    pub height: f64,
}

impl Frame {
    /// Assemble a frame from the graph and the graphics currently displayed.
    /// Nodes without a displayed graphic are drawn at their layout target.
    pub fn build(graph: &Graph, displayed: &HashMap<String, NodeGraphic>) -> Self {
        let selection = graph.selection();
        let margin = graph.settings().edge_margin;
        let graphic = |sha1: &str| {
            displayed.get(sha1).copied().or_else(|| {
                graph
                    .node(sha1)
                    .map(|n| NodeGraphic::new(n.position, n.radius, n.color))
            })
        };

        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for node in graph.ordered_nodes() {
            let Some(shown) = graphic(node.sha1()) else {
                continue;
            };
            nodes.push(NodeView {
                sha1: node.sha1().to_string(),
                summary: node.commit.summary().to_string(),
                position: shown.position,
                radius: shown.radius,
                color: shown.color,
                branch: node.ideological_branch.clone(),
                is_main_line: node.is_main_line,
                selected: node.selected(selection),
                highlighted: node.highlighted,
                mouse_hover: node.is_mouse_hover,
            });

            for parent in node.parents() {
                let Some(parent_shown) = graphic(parent) else {
                    continue;
                };
                let (start, end) = edge_endpoints(
                    shown.position,
                    shown.radius,
                    parent_shown.position,
                    parent_shown.radius,
                    margin,
                );
                edges.push(EdgeView {
                    child: node.sha1().to_string(),
                    parent: parent.clone(),
                    start,
                    end,
                    color: parent_shown.color,
                });
            }
        }

        let checked_out = graph.checked_out_branch();
        let mut refs: Vec<RefView> = graph
            .refs()
            .values()
            .filter_map(|r| {
                let position = graphic(r.node.as_deref()?)?.position;
                Some(RefView {
                    name: r.name.clone(),
                    local_ref_name: r.local_ref_name.clone(),
                    color: r.color,
                    branch_order: r.branch_order,
                    position,
                    selected: selection.is_selected(&ActionTarget::Ref(r.name.clone())),
                    is_current: r.is_current(checked_out),
                })
            })
            .collect();
        refs.sort_by(|a, b| a.name.cmp(&b.name));

        Self {
            nodes,
            edges,
            refs,
            width: graph.width(),
            height: graph.height(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{make_commit, RefTarget};

    fn graph() -> Graph {
        let mut graph = Graph::default();
        graph.apply_snapshot(
            vec![
                make_commit("m", &["a", "b"], 40),
                make_commit("b", &["r"], 30),
                make_commit("a", &["r"], 20),
                make_commit("r", &[], 10),
            ],
            vec![
                RefTarget::new("HEAD", "m"),
                RefTarget::new("refs/heads/master", "m"),
                RefTarget::new("refs/heads/topic", "b"),
                RefTarget::new("refs/heads/far", "outside"),
            ],
            Some("master".into()),
        );
        graph
    }

    #[test]
    fn test_frame_contents() {
        let graph = graph();
        let frame = Frame::build(&graph, &HashMap::new());

        assert_eq!(frame.nodes.len(), 4);
        assert_eq!(frame.nodes[0].sha1, "m");
        // m→a, m→b, b→r, a→r
        assert_eq!(frame.edges.len(), 4);
        // refs outside the window are not drawn
        let names: Vec<&str> = frame.refs.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["HEAD", "refs/heads/master", "refs/heads/topic"]);
        assert!(frame.refs[1].is_current);
        assert_eq!(frame.height, graph.height());
    }

    #[test]
    fn test_edges_stop_at_circle_boundary() {
        let graph = graph();
        let frame = Frame::build(&graph, &HashMap::new());
        let edge = frame
            .edges
            .iter()
            .find(|e| e.child == "b" && e.parent == "r")
            .unwrap();
        let b = graph.node("b").unwrap();
        let r = graph.node("r").unwrap();
        let gap_start = (edge.start - b.position).length();
        let gap_end = (edge.end - r.position).length();
        assert!((gap_start - (b.radius + 4.0)).abs() < 1e-9);
        assert!((gap_end - (r.radius + 4.0)).abs() < 1e-9);
    }

    #[test]
    fn test_displayed_graphics_take_precedence() {
        let graph = graph();
        let mut displayed = HashMap::new();
        displayed.insert(
            "m".to_string(),
            NodeGraphic::new(Vector2::new(500.0, 500.0), 30.0, Color::UNOWNED),
        );
        let frame = Frame::build(&graph, &displayed);
        assert_eq!(frame.nodes[0].position, Vector2::new(500.0, 500.0));
        let head = frame.refs.iter().find(|r| r.name == "HEAD").unwrap();
        assert_eq!(head.position, Vector2::new(500.0, 500.0));
    }

    #[test]
    fn test_frame_serializes() {
        let frame = Frame::build(&graph(), &HashMap::new());
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["nodes"][0]["sha1"], "m");
        assert!(json["nodes"][0]["color"].is_string());
    }
}
