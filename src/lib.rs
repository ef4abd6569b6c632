//! # gitgraph-rs
//!
//! Core of a git repository visualizer: turns the commits and refs of a
//! repository into a stable, animated 2-D graph and turns drag gestures on
//! that graph into repository mutations.
//!
//! ## Architecture
//!
//! The library is organized into several main modules:
//! - [`git`] - Repository data sources, the `git2` backend and error handling
//! - [`graph`] - Graph model, branch ownership and layout, animation and the controller
//! - [`models`] - Plain data types: commits, vectors and colors
//! - [`state`] - Persisted configuration
//!
//! ## Example
//!
//! ```rust,no_run
//! use gitgraph_rs::git::{FixedDecision, GitRepository};
//! use gitgraph_rs::graph::GraphController;
//! use gitgraph_rs::state::GraphConfig;
//! use std::rc::Rc;
//!
//! # fn main() -> anyhow::Result<()> {
//! let repo = GitRepository::discover("/path/to/repo")?;
//! let (controller, _events) =
//!     GraphController::new(Rc::new(repo), Rc::new(FixedDecision(false)), &GraphConfig::load());
//!
//! futures::executor::block_on(controller.load_nodes_from_api())?;
//! let frame = controller.render_frame(std::time::Duration::ZERO, |_| true);
//! println!("{} nodes", frame.nodes.len());
//! # Ok(())
//! # }
//! ```

#![allow(clippy::type_complexity)]
#![allow(clippy::new_without_default)]

pub mod git;
pub mod graph;
pub mod models;
pub mod state;

pub use graph::{Graph, GraphController};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
