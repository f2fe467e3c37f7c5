//! Schema module - Configuration and seeding types for reaction-diffusion simulations.

mod config;
mod seed;

pub use config::*;
pub use seed::*;
