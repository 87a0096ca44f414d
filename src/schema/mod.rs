//! Schema module - Graph, game, and experiment specifications.

mod config;
mod graph;

pub use config::*;
pub use graph::*;
