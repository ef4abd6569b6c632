//! Orchestration of reloads, selection, drag and drop and ref mutations.
//!
//! The controller is driven from one task. Every operation takes `&self`;
//! the graph lives in a `RefCell` that is never borrowed across an await,
//! so reloads and mutations can interleave. Only the newest reload is
//! applied.

use crate::git::{
    DecisionProvider, ErrorReporter, GraphError, InputValidator, LoadWindow, RefTarget,
    RepositoryDataSource, Result,
};
use crate::graph::animation::{Animator, NodeGraphic};
use crate::graph::frame::Frame;
use crate::graph::layout::LayoutDiagnostic;
use crate::graph::model::Graph;
use crate::graph::refs::{MoveOutcome, Ref};
use crate::graph::selection::{ActionTarget, Selection, SelectionWrite};
use crate::models::Commit;
use crate::state::{GraphConfig, LoadSettings};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GraphState {
    Empty,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Applied,
    /// A newer reload was issued while this one was in flight
    Superseded,
}

/// Action offered when an entity is dropped on another
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DropAction {
    Move,
    Merge,
    Rebase,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropOutcome {
    Applied,
    /// The user refused a force push; nothing changed
    Declined,
    /// Nothing was being dragged, or the action is not offered for this drop
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum GraphEvent {
    StateChanged(GraphState),
    Reloaded { sequence: u64, nodes: usize, refs: usize },
    ReloadSuperseded { sequence: u64 },
    Diagnostics(Vec<LayoutDiagnostic>),
    MutationFailed { operation: String, message: String },
    RefRemoved(String),
}

type Snapshot = (Vec<Commit>, Vec<RefTarget>, Option<String>);

pub struct GraphController {
    source: Rc<dyn RepositoryDataSource>,
    decider: Rc<dyn DecisionProvider>,
    load_settings: LoadSettings,
    graph: RefCell<Graph>,
    animator: RefCell<Animator>,
    window: Cell<LoadWindow>,
    sequence: Cell<u64>,
    state: Cell<GraphState>,
    settled: Cell<GraphState>,
    in_flight: Cell<usize>,
    dragging: RefCell<Option<ActionTarget>>,
    rendered_generation: Cell<Option<u64>>,
    events: UnboundedSender<GraphEvent>,
}

impl std::fmt::Debug for GraphController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphController")
            .field("state", &self.state.get())
            .field("sequence", &self.sequence.get())
            .field("window", &self.window.get())
            .finish_non_exhaustive()
    }
}

impl GraphController {
    pub fn new(
        source: Rc<dyn RepositoryDataSource>,
        decider: Rc<dyn DecisionProvider>,
        config: &GraphConfig,
    ) -> (Self, UnboundedReceiver<GraphEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let controller = Self {
            source,
            decider,
            load_settings: config.load_settings.clone(),
            graph: RefCell::new(Graph::new(config.layout_settings.clone())),
            animator: RefCell::new(Animator::new(config.animation_settings.clone())),
            window: Cell::new(LoadWindow {
                limit: config.load_settings.commit_limit,
                skip: 0,
            }),
            sequence: Cell::new(0),
            state: Cell::new(GraphState::Empty),
            settled: Cell::new(GraphState::Empty),
            in_flight: Cell::new(0),
            dragging: RefCell::new(None),
            rendered_generation: Cell::new(None),
            events,
        };
        (controller, receiver)
    }

    pub fn state(&self) -> GraphState {
        self.state.get()
    }

    pub fn window(&self) -> LoadWindow {
        self.window.get()
    }

    /// Read access to the graph. Do not hold across an await.
    pub fn graph(&self) -> std::cell::Ref<'_, Graph> {
        self.graph.borrow()
    }

    pub fn is_animating(&self) -> bool {
        self.animator.borrow().is_animating()
    }

    fn emit(&self, event: GraphEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: GraphState) {
        if self.state.replace(state) != state {
            debug!("Graph state -> {:?}", state);
            self.emit(GraphEvent::StateChanged(state));
        }
    }

    fn begin_operation(&self) {
        self.in_flight.set(self.in_flight.get() + 1);
        self.set_state(GraphState::Loading);
    }

    fn end_operation(&self) {
        let remaining = self.in_flight.get().saturating_sub(1);
        self.in_flight.set(remaining);
        if remaining == 0 {
            self.set_state(self.settled.get());
        }
    }

    fn mutation_failed(&self, operation: &str, error: &GraphError) {
        ErrorReporter::log_error(error, operation);
        self.emit(GraphEvent::MutationFailed {
            operation: operation.to_string(),
            message: ErrorReporter::user_friendly_message(error),
        });
    }

    // Reloads

    /// Reload commits, refs and the checked-out branch from the data source.
    pub async fn load_nodes_from_api(&self) -> Result<ReloadOutcome> {
        let sequence = self.sequence.get() + 1;
        self.sequence.set(sequence);
        self.begin_operation();

        let result = self.fetch_snapshot(self.window.get()).await;
        let outcome = match result {
            Err(e) => {
                ErrorReporter::log_error(&e, "reload");
                self.end_operation();
                return Err(e);
            }
            Ok(_) if sequence != self.sequence.get() => {
                debug!(
                    "Discarding reload {} (latest is {})",
                    sequence,
                    self.sequence.get()
                );
                self.emit(GraphEvent::ReloadSuperseded { sequence });
                ReloadOutcome::Superseded
            }
            Ok((commits, refs, checked_out)) => {
                self.apply(sequence, commits, refs, checked_out);
                ReloadOutcome::Applied
            }
        };
        self.end_operation();
        Ok(outcome)
    }

    async fn fetch_snapshot(&self, window: LoadWindow) -> Result<Snapshot> {
        let commits = self.source.load_commits(window).await?;
        let refs = self.source.load_refs().await?;
        let checked_out = self.source.checked_out_branch().await?;
        Ok((commits, refs, checked_out))
    }

    fn apply(
        &self,
        sequence: u64,
        commits: Vec<Commit>,
        refs: Vec<RefTarget>,
        checked_out: Option<String>,
    ) {
        let (diagnostics, nodes, ref_count, live) = {
            let mut graph = self.graph.borrow_mut();
            let diagnostics = graph.apply_snapshot(commits, refs, checked_out);
            let live: HashSet<String> = graph.nodes().keys().cloned().collect();
            (diagnostics, graph.nodes().len(), graph.refs().len(), live)
        };
        self.animator.borrow_mut().retain(&live);
        self.settled.set(GraphState::Ready);

        info!("Reload {} applied: {} nodes, {} refs", sequence, nodes, ref_count);
        self.emit(GraphEvent::Reloaded {
            sequence,
            nodes,
            refs: ref_count,
        });
        if !diagnostics.is_empty() {
            self.emit(GraphEvent::Diagnostics(diagnostics));
        }
    }

    /// Load `show_more_step` more commits.
    pub async fn show_more(&self) -> Result<ReloadOutcome> {
        let mut window = self.window.get();
        window.limit += self.load_settings.show_more_step;
        self.window.set(window);
        debug!("Commit limit raised to {}", window.limit);
        self.load_nodes_from_api().await
    }

    // Selection

    fn update_selection(&self, change: impl FnOnce(&mut Selection)) {
        let mut graph = self.graph.borrow_mut();
        let before = graph.selection().generation();
        change(graph.selection_mut());
        if graph.selection().generation() != before {
            graph.relayout();
        }
    }

    /// Make `target` the action context. Unknown entities are ignored.
    pub fn select(&self, target: ActionTarget) -> bool {
        if !self.graph.borrow().entity_exists(&target) {
            debug!("Ignoring selection of unknown {:?}", target);
            return false;
        }
        self.update_selection(|selection| selection.select(target));
        true
    }

    pub fn set_selected(&self, target: &ActionTarget, value: SelectionWrite) {
        self.update_selection(|selection| selection.write(target, value));
    }

    pub fn clear_selection(&self) {
        self.update_selection(Selection::clear);
    }

    pub fn is_selected(&self, target: &ActionTarget) -> bool {
        self.graph.borrow().selection().is_selected(target)
    }

    pub fn selected(&self) -> Option<ActionTarget> {
        self.graph.borrow().selection().current().cloned()
    }

    pub fn set_highlighted(&self, sha1: &str, highlighted: bool) -> Result<()> {
        let mut graph = self.graph.borrow_mut();
        let node = graph
            .node_mut(sha1)
            .ok_or_else(|| GraphError::UnknownNode(sha1.to_string()))?;
        node.highlighted = highlighted;
        Ok(())
    }

    pub fn set_mouse_hover(&self, sha1: &str, hover: bool) -> Result<()> {
        let mut graph = self.graph.borrow_mut();
        let node = graph
            .node_mut(sha1)
            .ok_or_else(|| GraphError::UnknownNode(sha1.to_string()))?;
        node.is_mouse_hover = hover;
        Ok(())
    }

    // Drag and drop

    pub fn drag_start(&self, target: ActionTarget) -> Result<()> {
        if !self.select(target.clone()) {
            return Err(match target {
                ActionTarget::Node(sha1) => GraphError::UnknownNode(sha1),
                ActionTarget::Ref(name) => GraphError::UnknownRef(name),
            });
        }
        debug!("Drag started on {:?}", target);
        *self.dragging.borrow_mut() = Some(target);
        Ok(())
    }

    pub fn drag_cancel(&self) {
        self.dragging.borrow_mut().take();
        self.clear_selection();
    }

    fn drag_source(&self) -> Option<ActionTarget> {
        self.dragging.borrow().clone().or_else(|| self.selected())
    }

    /// Actions a drop of the dragged entity on `target` would offer.
    pub fn available_actions(&self, target: &ActionTarget) -> Vec<DropAction> {
        match self.drag_source() {
            Some(source) => actions_for(&self.graph.borrow(), &source, target),
            None => Vec::new(),
        }
    }

    /// Finish a drag on `target` with `action`.
    ///
    /// The action context is cleared before anything else happens.
    pub async fn drop_on(&self, target: ActionTarget, action: DropAction) -> Result<DropOutcome> {
        let source = self.drag_source();
        self.dragging.borrow_mut().take();
        self.clear_selection();

        let Some(source) = source else {
            return Ok(DropOutcome::Ignored);
        };
        let offered = actions_for(&self.graph.borrow(), &source, &target);
        if !offered.contains(&action) {
            debug!("{:?} not offered for {:?} on {:?}", action, source, target);
            return Ok(DropOutcome::Ignored);
        }

        info!("Drop {:?} on {:?}: {:?}", source, target, action);
        self.begin_operation();
        let result = self.perform(&source, &target, action).await;
        self.end_operation();

        match result {
            Ok(DropOutcome::Applied) => {
                self.load_nodes_from_api().await?;
                Ok(DropOutcome::Applied)
            }
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.mutation_failed(&format!("{:?}", action).to_lowercase(), &e);
                Err(e)
            }
        }
    }

    async fn perform(
        &self,
        source: &ActionTarget,
        target: &ActionTarget,
        action: DropAction,
    ) -> Result<DropOutcome> {
        let target_node = self.target_node(target)?;
        match (action, source) {
            (DropAction::Push, ActionTarget::Ref(name)) => {
                let remote = match target {
                    ActionTarget::Ref(remote_ref) => self
                        .ref_snapshot(remote_ref)?
                        .remote()
                        .map(str::to_string),
                    ActionTarget::Node(_) => None,
                }
                .ok_or_else(|| GraphError::invalid_input(name.clone(), "no remote to push to"))?;
                self.push(name, &remote).await
            }
            (DropAction::Move, ActionTarget::Ref(name)) => self.move_ref(name, &target_node).await,
            (DropAction::Move, ActionTarget::Node(sha1)) => match target {
                ActionTarget::Ref(name) => self.move_ref(name, sha1).await,
                ActionTarget::Node(_) => Ok(DropOutcome::Ignored),
            },
            (DropAction::Merge, ActionTarget::Ref(_)) => {
                self.source.merge(target_node).await?;
                Ok(DropOutcome::Applied)
            }
            (DropAction::Merge, ActionTarget::Node(sha1)) => {
                self.source.merge(sha1.clone()).await?;
                Ok(DropOutcome::Applied)
            }
            (DropAction::Rebase, ActionTarget::Ref(_)) => {
                self.source.rebase(target_node).await?;
                Ok(DropOutcome::Applied)
            }
            (DropAction::Rebase, ActionTarget::Node(sha1)) => {
                self.source.rebase(sha1.clone()).await?;
                Ok(DropOutcome::Applied)
            }
            (DropAction::Push, ActionTarget::Node(_)) => Ok(DropOutcome::Ignored),
        }
    }

    fn target_node(&self, target: &ActionTarget) -> Result<String> {
        match target {
            ActionTarget::Node(sha1) => Ok(sha1.clone()),
            ActionTarget::Ref(name) => self
                .ref_snapshot(name)?
                .node
                .ok_or_else(|| GraphError::UnknownNode(name.clone())),
        }
    }

    fn ref_snapshot(&self, name: &str) -> Result<Ref> {
        self.graph
            .borrow()
            .get_ref(name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownRef(name.to_string()))
    }

    /// Provisionally point the ref at `sha1`, then ask the repository.
    /// Rolled back on failure or a declined force push.
    async fn move_ref(&self, name: &str, sha1: &str) -> Result<DropOutcome> {
        let r = self.ref_snapshot(name)?;
        let (previous, checked_out) = {
            let mut graph = self.graph.borrow_mut();
            let previous = graph.set_ref_node(name, Some(sha1.to_string())).flatten();
            (previous, graph.checked_out_branch().map(str::to_string))
        };

        let result = r
            .move_to(sha1, checked_out.as_deref(), &*self.source, &*self.decider)
            .await;
        match result {
            Ok(MoveOutcome::Moved) => Ok(DropOutcome::Applied),
            Ok(MoveOutcome::Declined) => {
                self.rollback(name, previous);
                Ok(DropOutcome::Declined)
            }
            Err(e) => {
                self.rollback(name, previous);
                Err(e)
            }
        }
    }

    fn rollback(&self, name: &str, previous: Option<String>) {
        debug!("Rolling {} back to {:?}", name, previous);
        self.graph.borrow_mut().set_ref_node(name, previous);
    }

    async fn push(&self, name: &str, remote: &str) -> Result<DropOutcome> {
        let r = self.ref_snapshot(name)?;
        match r.push_to(remote, &*self.source, &*self.decider).await? {
            MoveOutcome::Moved => Ok(DropOutcome::Applied),
            MoveOutcome::Declined => Ok(DropOutcome::Declined),
        }
    }

    // Ref commands

    /// Create a local branch `name` at `sha1` and reload.
    pub async fn create_branch(&self, name: &str, sha1: &str) -> Result<()> {
        InputValidator::validate_ref_name(name)?;
        if self.graph.borrow().node(sha1).is_none() {
            return Err(GraphError::UnknownNode(sha1.to_string()));
        }
        self.run_mutation("create_branch", async {
            self.source
                .create_branch(name.to_string(), sha1.to_string())
                .await
        })
        .await?;
        self.load_nodes_from_api().await?;
        Ok(())
    }

    /// Delete a branch or tag, locally or on its remote, and reload.
    pub async fn remove_ref(&self, name: &str) -> Result<()> {
        let r = self.ref_snapshot(name)?;
        self.run_mutation("remove_ref", r.remove(&*self.source)).await?;
        self.emit(GraphEvent::RefRemoved(name.to_string()));
        self.load_nodes_from_api().await?;
        Ok(())
    }

    /// Push a local ref to `remote`, or to the default remote.
    pub async fn push_ref(&self, name: &str, remote: Option<&str>) -> Result<DropOutcome> {
        let remote = remote
            .unwrap_or(&self.load_settings.default_remote)
            .to_string();
        let outcome = self
            .run_mutation("push", self.push(name, &remote))
            .await?;
        if outcome == DropOutcome::Applied {
            self.load_nodes_from_api().await?;
        }
        Ok(outcome)
    }

    async fn run_mutation<T>(
        &self,
        operation: &str,
        mutation: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        self.begin_operation();
        let result = mutation.await;
        self.end_operation();
        if let Err(e) = &result {
            self.mutation_failed(operation, e);
        }
        result
    }

    // Rendering

    /// Advance animations to `now` and produce the frame to draw.
    ///
    /// `is_visible` says whether a node is currently mounted in the view;
    /// hidden nodes jump straight to their layout.
    pub fn render_frame(&self, now: Duration, is_visible: impl Fn(&str) -> bool) -> Frame {
        let graph = self.graph.borrow();
        let generation = graph.layout_generation();
        let force_redraw = self.rendered_generation.replace(Some(generation)) != Some(generation);

        let mut animator = self.animator.borrow_mut();
        let mut displayed = HashMap::new();
        for node in graph.ordered_nodes() {
            let target = NodeGraphic::new(node.position, node.radius, node.color);
            animator.sync(node.sha1(), target, is_visible(node.sha1()), force_redraw, now);
            if let Some(graphic) = animator.sample(node.sha1(), now) {
                displayed.insert(node.sha1().to_string(), graphic);
            }
        }
        Frame::build(&graph, &displayed)
    }
}

/// Drop rules, evaluated against the current graph.
pub fn actions_for(graph: &Graph, source: &ActionTarget, target: &ActionTarget) -> Vec<DropAction> {
    match (source, target) {
        (ActionTarget::Ref(name), ActionTarget::Node(sha1)) => ref_on_node(graph, name, sha1),
        (ActionTarget::Ref(name), ActionTarget::Ref(target_name)) => {
            let (Some(r), Some(t)) = (graph.get_ref(name), graph.get_ref(target_name)) else {
                return Vec::new();
            };
            if name == target_name {
                return Vec::new();
            }
            if let Some(remote) = t.remote() {
                if t.is_remote_branch()
                    && r.is_local_branch()
                    && r.can_be_pushed(remote, graph.refs())
                {
                    return vec![DropAction::Push];
                }
            }
            match &t.node {
                Some(sha1) => ref_on_node(graph, name, sha1),
                None => Vec::new(),
            }
        }
        (ActionTarget::Node(sha1), ActionTarget::Node(head)) => {
            let is_head = graph.head_node().map(|n| n.sha1()) == Some(head.as_str());
            if is_head && graph.node(sha1).is_some() && !graph.is_ancestor(sha1, head) {
                vec![DropAction::Merge, DropAction::Rebase]
            } else {
                Vec::new()
            }
        }
        (ActionTarget::Node(sha1), ActionTarget::Ref(name)) => match graph.get_ref(name) {
            Some(t)
                if (t.is_local_branch() || t.is_local_tag())
                    && graph.node(sha1).is_some()
                    && t.node.as_deref() != Some(sha1.as_str()) =>
            {
                vec![DropAction::Move]
            }
            _ => Vec::new(),
        },
    }
}

fn ref_on_node(graph: &Graph, name: &str, sha1: &str) -> Vec<DropAction> {
    let Some(r) = graph.get_ref(name) else {
        return Vec::new();
    };
    if graph.node(sha1).is_none() || !(r.is_branch() || r.is_tag()) {
        return Vec::new();
    }

    let mut actions = Vec::new();
    if r.node.as_deref() != Some(sha1) {
        actions.push(DropAction::Move);
    }
    if r.is_current(graph.checked_out_branch()) {
        if let Some(tip) = r.node.as_deref() {
            if !graph.is_ancestor(sha1, tip) {
                actions.push(DropAction::Rebase);
                actions.push(DropAction::Merge);
            }
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::{FixedDecision, InMemoryRepository, SourceCall};
    use pretty_assertions::assert_eq;

    fn repo() -> Rc<InMemoryRepository> {
        Rc::new(
            InMemoryRepository::new()
                .with_commit("c1", &[], 100)
                .with_commit("c2", &["c1"], 200)
                .with_commit("f1", &["c1"], 250)
                .with_ref("refs/heads/master", "c2")
                .with_ref("refs/heads/feature", "f1")
                .with_ref("refs/remotes/origin/master", "c2")
                .with_checked_out("master"),
        )
    }

    fn controller(
        repo: &Rc<InMemoryRepository>,
        answer: bool,
    ) -> (GraphController, UnboundedReceiver<GraphEvent>) {
        GraphController::new(
            repo.clone(),
            Rc::new(FixedDecision(answer)),
            &GraphConfig::default(),
        )
    }

    fn drain(events: &mut UnboundedReceiver<GraphEvent>) -> Vec<GraphEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_load_moves_through_states() {
        let repo = repo();
        let (controller, mut events) = controller(&repo, false);
        assert_eq!(controller.state(), GraphState::Empty);

        let outcome = controller.load_nodes_from_api().await.unwrap();
        assert_eq!(outcome, ReloadOutcome::Applied);
        assert_eq!(controller.state(), GraphState::Ready);
        assert_eq!(controller.graph().nodes().len(), 3);

        let events = drain(&mut events);
        assert_eq!(events[0], GraphEvent::StateChanged(GraphState::Loading));
        assert!(matches!(events[1], GraphEvent::Reloaded { sequence: 1, nodes: 3, .. }));
        assert_eq!(events[2], GraphEvent::StateChanged(GraphState::Ready));
    }

    #[tokio::test]
    async fn test_stale_reload_is_discarded() {
        let repo = repo();
        let (controller, mut events) = controller(&repo, false);
        let release = repo.hold_next_load();

        let (first, second) = futures::join!(controller.load_nodes_from_api(), async {
            repo.add_commit(crate::git::make_commit("c3", &["c2"], 300));
            repo.set_ref("refs/heads/master", "c3");
            repo.set_ref("HEAD", "c3");
            let outcome = controller.load_nodes_from_api().await;
            let _ = release.send(());
            outcome
        });

        assert_eq!(first.unwrap(), ReloadOutcome::Superseded);
        assert_eq!(second.unwrap(), ReloadOutcome::Applied);
        assert!(controller.graph().node("c3").is_some());
        assert_eq!(controller.state(), GraphState::Ready);
        assert!(drain(&mut events).contains(&GraphEvent::ReloadSuperseded { sequence: 1 }));
    }

    #[tokio::test]
    async fn test_show_more_raises_limit() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        let limit = controller.window().limit;
        controller.show_more().await.unwrap();
        assert_eq!(controller.window().limit, limit + 100);
        assert!(repo.calls().contains(&SourceCall::LoadCommits(LoadWindow {
            limit: limit + 100,
            skip: 0
        })));
    }

    #[tokio::test]
    async fn test_available_actions() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();

        // Checked-out branch onto a node that is not its ancestor
        controller
            .drag_start(ActionTarget::Ref("refs/heads/master".into()))
            .unwrap();
        assert_eq!(
            controller.available_actions(&ActionTarget::Node("f1".into())),
            vec![DropAction::Move, DropAction::Rebase, DropAction::Merge]
        );
        assert_eq!(
            controller.available_actions(&ActionTarget::Node("c1".into())),
            vec![DropAction::Move]
        );
        assert!(controller
            .available_actions(&ActionTarget::Node("c2".into()))
            .is_empty());
        controller.drag_cancel();

        // Local branch onto a remote branch it differs from
        controller
            .drag_start(ActionTarget::Ref("refs/heads/feature".into()))
            .unwrap();
        assert_eq!(
            controller.available_actions(&ActionTarget::Ref("refs/remotes/origin/master".into())),
            vec![DropAction::Push]
        );
        controller.drag_cancel();

        // Node onto HEAD
        controller.drag_start(ActionTarget::Node("f1".into())).unwrap();
        assert_eq!(
            controller.available_actions(&ActionTarget::Node("c2".into())),
            vec![DropAction::Merge, DropAction::Rebase]
        );
        assert_eq!(
            controller.available_actions(&ActionTarget::Ref("refs/heads/master".into())),
            vec![DropAction::Move]
        );
        assert!(controller
            .available_actions(&ActionTarget::Ref("HEAD".into()))
            .is_empty());
    }

    #[tokio::test]
    async fn test_cancel_clears_selection() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();

        controller.drag_start(ActionTarget::Node("c1".into())).unwrap();
        assert!(controller.is_selected(&ActionTarget::Node("c1".into())));
        controller.drag_cancel();
        assert_eq!(controller.selected(), None);
        assert!(controller
            .drag_start(ActionTarget::Node("missing".into()))
            .is_err());
    }

    #[tokio::test]
    async fn test_move_branch_and_reload() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();

        controller
            .drag_start(ActionTarget::Ref("refs/heads/feature".into()))
            .unwrap();
        let outcome = controller
            .drop_on(ActionTarget::Node("c2".into()), DropAction::Move)
            .await
            .unwrap();
        assert_eq!(outcome, DropOutcome::Applied);
        assert_eq!(controller.selected(), None);
        assert_eq!(repo.ref_target("refs/heads/feature").as_deref(), Some("c2"));
        assert_eq!(
            controller.graph().get_ref("refs/heads/feature").unwrap().node.as_deref(),
            Some("c2")
        );
        assert!(repo.calls().contains(&SourceCall::MoveBranch(
            "feature".into(),
            "c2".into(),
            true
        )));
    }

    #[tokio::test]
    async fn test_failed_move_rolls_back() {
        let repo = repo();
        let (controller, mut events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();
        drain(&mut events);

        repo.fail_next("move_branch", "locked");
        controller
            .drag_start(ActionTarget::Ref("refs/heads/feature".into()))
            .unwrap();
        let result = controller
            .drop_on(ActionTarget::Node("c2".into()), DropAction::Move)
            .await;
        assert!(result.is_err());
        assert_eq!(
            controller.graph().get_ref("refs/heads/feature").unwrap().node.as_deref(),
            Some("f1")
        );
        assert_eq!(controller.state(), GraphState::Ready);
        assert!(drain(&mut events)
            .iter()
            .any(|e| matches!(e, GraphEvent::MutationFailed { operation, .. } if operation == "move")));
    }

    #[tokio::test]
    async fn test_remote_move_force_push_declined() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();

        // origin/master on c2 cannot fast-forward to f1
        controller
            .drag_start(ActionTarget::Ref("refs/remotes/origin/master".into()))
            .unwrap();
        let outcome = controller
            .drop_on(ActionTarget::Node("f1".into()), DropAction::Move)
            .await
            .unwrap();
        assert_eq!(outcome, DropOutcome::Declined);
        assert_eq!(repo.ref_target("refs/remotes/origin/master").as_deref(), Some("c2"));
        assert_eq!(
            controller
                .graph()
                .get_ref("refs/remotes/origin/master")
                .unwrap()
                .node
                .as_deref(),
            Some("c2")
        );
    }

    #[tokio::test]
    async fn test_remote_move_force_push_confirmed() {
        let repo = repo();
        let (controller, _events) = controller(&repo, true);
        controller.load_nodes_from_api().await.unwrap();

        controller
            .drag_start(ActionTarget::Ref("refs/remotes/origin/master".into()))
            .unwrap();
        let outcome = controller
            .drop_on(ActionTarget::Node("f1".into()), DropAction::Move)
            .await
            .unwrap();
        assert_eq!(outcome, DropOutcome::Applied);
        let pushes: Vec<bool> = repo
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SourceCall::Push(request) => Some(request.force),
                _ => None,
            })
            .collect();
        assert_eq!(pushes, vec![false, true]);
        assert_eq!(repo.ref_target("refs/remotes/origin/master").as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn test_drop_without_offered_action_is_ignored() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();
        repo.clear_calls();

        controller.drag_start(ActionTarget::Node("c1".into())).unwrap();
        let outcome = controller
            .drop_on(ActionTarget::Node("f1".into()), DropAction::Merge)
            .await
            .unwrap();
        assert_eq!(outcome, DropOutcome::Ignored);
        assert_eq!(controller.selected(), None);
        assert!(repo.calls().is_empty());

        let outcome = controller
            .drop_on(ActionTarget::Node("f1".into()), DropAction::Move)
            .await
            .unwrap();
        assert_eq!(outcome, DropOutcome::Ignored);
    }

    #[tokio::test]
    async fn test_merge_node_into_head() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();

        controller.drag_start(ActionTarget::Node("f1".into())).unwrap();
        controller
            .drop_on(ActionTarget::Node("c2".into()), DropAction::Merge)
            .await
            .unwrap();
        let graph = controller.graph();
        let head = graph.head_node().unwrap();
        assert!(head.is_merge());
        assert_eq!(head.parents(), &["c2".to_string(), "f1".to_string()]);
    }

    #[tokio::test]
    async fn test_branch_commands() {
        let repo = repo();
        let (controller, mut events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();

        assert!(controller.create_branch("bad..name", "c1").await.is_err());
        controller.create_branch("topic", "c1").await.unwrap();
        assert!(controller.graph().get_ref("refs/heads/topic").is_some());

        controller.remove_ref("refs/heads/topic").await.unwrap();
        assert!(controller.graph().get_ref("refs/heads/topic").is_none());
        assert!(drain(&mut events).contains(&GraphEvent::RefRemoved("refs/heads/topic".into())));

        let outcome = controller.push_ref("refs/heads/feature", None).await.unwrap();
        assert_eq!(outcome, DropOutcome::Applied);
        assert_eq!(repo.ref_target("refs/remotes/origin/feature").as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn test_render_frame_animates_changes() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();

        let first = controller.render_frame(Duration::ZERO, |_| true);
        assert_eq!(first.nodes.len(), 3);
        assert!(!controller.is_animating());

        // Selecting c2 pushes the rows below it down
        controller.select(ActionTarget::Node("c2".into()));
        controller.render_frame(Duration::from_millis(10), |_| true);
        assert!(controller.is_animating());

        let settled = controller.render_frame(Duration::from_secs(2), |_| true);
        assert!(!controller.is_animating());
        let c1 = settled.nodes.iter().find(|n| n.sha1 == "c1").unwrap();
        assert_eq!(c1.position, controller.graph().node("c1").unwrap().position);
        assert!(settled.nodes.iter().any(|n| n.sha1 == "c2" && n.selected));
    }

    #[tokio::test]
    async fn test_hidden_nodes_do_not_animate() {
        let repo = repo();
        let (controller, _events) = controller(&repo, false);
        controller.load_nodes_from_api().await.unwrap();
        controller.render_frame(Duration::ZERO, |_| false);

        controller.select(ActionTarget::Node("c2".into()));
        controller.render_frame(Duration::from_millis(10), |_| false);
        assert!(!controller.is_animating());
    }
}
