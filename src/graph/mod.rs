pub mod animation;
pub mod controller;
pub mod frame;
pub mod layout;
pub mod model;
pub mod node;
pub mod refs;
pub mod selection;

pub use animation::{Animateable, Animator, NodeGraphic};
pub use controller::{
    DropAction, DropOutcome, GraphController, GraphEvent, GraphState, ReloadOutcome,
};
pub use frame::{EdgeView, Frame, NodeView, RefView};
pub use layout::{BranchOrderRegistry, LayoutDiagnostic, LayoutEngine};
pub use model::Graph;
pub use node::GraphNode;
pub use refs::{parse_ref_name, MoveOutcome, ParsedRef, Ref, RefKind, RefScope};
pub use selection::{ActionTarget, Selectable, Selection, SelectionWrite};
