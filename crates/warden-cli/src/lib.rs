//! Command-line workflow engine for multi-agent task hand-offs.

pub mod commands;
pub mod graph;
pub mod operations;
pub mod output;
pub mod picker;

pub use graph::DependencyGraph;
pub use output::{OutputChannel, OutputFormat};
pub use picker::TaskPicker;
