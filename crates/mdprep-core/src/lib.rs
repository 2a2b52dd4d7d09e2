pub mod atom_names;
pub mod classifier;
pub mod config;
pub mod equilibrate;
pub mod error;
pub mod gaussian;
pub mod gromacs;
pub mod io;
pub mod leap;
pub mod mdp;
pub mod paths;
pub mod pipeline;
pub mod resp;
pub mod rules;
pub mod sdf;
pub mod system;
pub mod tool_runner;
pub mod types;

pub use error::{PrepError, Result};
