pub mod config;

pub use config::{AnimationSettings, GraphConfig, LayoutSettings, LoadSettings};
