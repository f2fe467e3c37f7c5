//! Reaction Diffusion - Gray-Scott simulation orchestrated on the GPU.
//!
//! The simulation state lives in three 2D RGBA float buffers (Current, Next,
//! Display) owned by a compute program. A controller dispatches three kernels
//! over them: Init seeds Current from an initial-state image, Step advances
//! Current into Next, and Display renders Current into a presentable image.
//!
//! # Architecture
//!
//! - `schema`: Configuration types and initial-state image generation
//! - `compute`: Grid buffers, kernel dispatch, parameter binding, the
//!   simulation controller and the CPU/GPU compute programs
//! - `driver`: Fixed-tick frame driver implementing the step/refresh cadence
//!
//! # Example
//!
//! ```rust,no_run
//! use reaction_diffusion::{
//!     compute::{BufferRole, BufferSettings, CpuProgram, Simulation},
//!     schema::SimulationConfig,
//! };
//!
//! let config = SimulationConfig::default();
//! let params = &config.parameters;
//! let init_map = config.seed.generate(params.width, params.height);
//!
//! let mut sim = Simulation::new(CpuProgram::new(), &init_map, BufferSettings::from_config(&config))?;
//! sim.init(params)?;
//! sim.run(params, 100)?;
//! sim.refresh(params)?;
//!
//! let display = sim.read_buffer(BufferRole::Display)?;
//! println!("{} pixels rendered", display.len());
//! # Ok::<(), reaction_diffusion::compute::SimulationError>(())
//! ```

pub mod compute;
pub mod driver;
pub mod schema;

// Re-export commonly used types
pub use compute::{CpuProgram, Simulation, SimulationError};
pub use driver::{FrameDriver, FrameReport};
pub use schema::{Pattern, Seed, SimulationConfig, SimulationParameters};
