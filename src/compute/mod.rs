//! Compute module - Graph quantities, exact evaluation, and simulation.

mod coalescence;
mod exact;
mod game;
mod generator;
mod graph;
mod linalg;
mod population;
mod simulation;

pub mod social;

pub use coalescence::*;
pub use exact::*;
pub use game::*;
pub use generator::*;
pub use graph::*;
pub use linalg::*;
pub use population::*;
pub use simulation::*;
