use crate::graph::selection::{ActionTarget, Selectable};
use crate::models::{Color, Commit, Vector2};

/// One commit in the graph plus the layout and view state derived for it.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub commit: Commit,
    /// Layout position, written by the layout engine
    pub position: Vector2,
    pub radius: f64,
    pub color: Color,
    /// Raw name of the branch this commit is attributed to
    pub ideological_branch: Option<String>,
    /// Lane key used for horizontal placement; the branch name, or a
    /// `detached:` key for history no branch claims
    pub lane_key: String,
    pub branch_order: usize,
    /// Node sits on HEAD's branch: drawn large with its detail box visible
    pub is_main_line: bool,
    pub highlighted: bool,
    pub is_mouse_hover: bool,
    /// Raw names of the refs currently pointing at this commit
    pub ref_names: Vec<String>,
    /// Loaded children, by sha1
    pub children: Vec<String>,
}

impl GraphNode {
    pub fn new(commit: Commit) -> Self {
        Self {
            commit,
            position: Vector2::ZERO,
            radius: 0.0,
            color: Color::UNOWNED,
            ideological_branch: None,
            lane_key: String::new(),
            branch_order: 0,
            is_main_line: false,
            highlighted: false,
            is_mouse_hover: false,
            ref_names: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn sha1(&self) -> &str {
        &self.commit.sha1
    }

    pub fn parents(&self) -> &[String] {
        &self.commit.parents
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.commit.first_parent()
    }

    pub fn is_merge(&self) -> bool {
        self.commit.parents.len() > 1
    }

    /// Replace the commit data in place, keeping view state for animation continuity.
    pub fn update_commit(&mut self, commit: Commit) {
        self.commit = commit;
        self.ref_names.clear();
        self.children.clear();
    }

    pub fn has_ref(&self, name: &str) -> bool {
        self.ref_names.iter().any(|r| r == name)
    }
}

impl Selectable for GraphNode {
    fn action_target(&self) -> ActionTarget {
        ActionTarget::Node(self.commit.sha1.clone())
    }
}
