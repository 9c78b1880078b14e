pub mod adapters;
pub mod api;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

#[cfg(feature = "cli")]
pub use config::{CliConfig, Command};

pub use config::SimConfig;
pub use crate::core::{clock::Clock, simulation::Simulation};
pub use utils::error::{Result, SimError};
