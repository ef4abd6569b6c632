use serde::{Deserialize, Serialize};
use tracing::debug;

/// Entity that can be the current action context: a selected or dragged
/// node, or a dragged ref.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionTarget {
    Node(String),
    Ref(String),
}

/// Value written to an entity's `selected` property.
///
/// `Entity` covers bindings where a click handler passes the clicked entity
/// instead of a flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectionWrite {
    Flag(bool),
    Entity(ActionTarget),
}

/// The single action-context cell of a graph. At most one entity is selected.
#[derive(Debug, Default, Clone)]
pub struct Selection {
    current: Option<ActionTarget>,
    generation: u64,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ActionTarget> {
        self.current.as_ref()
    }

    pub fn is_selected(&self, target: &ActionTarget) -> bool {
        self.current.as_ref() == Some(target)
    }

    pub fn select(&mut self, target: ActionTarget) {
        if self.current.as_ref() == Some(&target) {
            return;
        }
        debug!("Action context -> {:?}", target);
        self.current = Some(target);
        self.generation += 1;
    }

    pub fn clear(&mut self) {
        if let Some(previous) = self.current.take() {
            debug!("Action context cleared (was {:?})", previous);
            self.generation += 1;
        }
    }

    /// Bumped on every change of the current context.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Apply a `selected` write on behalf of `target`.
    pub fn write(&mut self, target: &ActionTarget, value: SelectionWrite) {
        let selects = match &value {
            SelectionWrite::Flag(flag) => *flag,
            SelectionWrite::Entity(entity) => entity == target,
        };
        if selects {
            self.select(target.clone());
        } else if self.is_selected(target) {
            self.clear();
        }
    }
}

/// Shared selection protocol of nodes and refs.
pub trait Selectable {
    fn action_target(&self) -> ActionTarget;

    fn selected(&self, selection: &Selection) -> bool {
        selection.is_selected(&self.action_target())
    }

    fn set_selected(&self, selection: &mut Selection, value: SelectionWrite) {
        selection.write(&self.action_target(), value);
    }
}
