#![doc = include_str!("../README.md")]
#![forbid(unsafe_code)]

mod attractors;
mod builder;
mod error;
mod fatal_attractors;
mod find_loops;
mod partial_solve;
mod player;
mod random_game;
mod structure_graph;
mod vertex_set;
mod zielonka;

pub use attractors::*;
pub use builder::*;
pub use error::*;
pub use fatal_attractors::*;
pub use find_loops::*;
pub use partial_solve::*;
pub use player::*;
pub use random_game::*;
pub use structure_graph::*;
pub use vertex_set::*;
pub use zielonka::*;
