//! Host-side orchestration for a GPU slime mould simulation: the binary
//! layout shared with the kernels, agent spawning, field resources, and the
//! per-frame visualize / simulate / barrier pipeline.

pub mod config;
pub mod constants;
pub mod display;
pub mod error;
pub mod framework;
pub mod kernels;
pub mod layout;
pub mod orchestrator;
pub mod resources;
pub mod simulation;
pub mod spawn;

pub use config::{DispatchCoverage, Settings, SpawnMethod};
pub use error::{ConfigError, Result, SlimeError};
pub use kernels::SimulationKernel;
pub use layout::{Agent, SimulationParameters};
pub use orchestrator::{DispatchPlan, FrameInput, FramePasses, Orchestrator, RunState};
