//! # tourgen
//!
//! Simulation-control core for an evolving traveling-salesman visualizer.
//!
//! The optimization engine itself (population evolution, crossover,
//! mutation, fitness) lives in an external module and is consumed through
//! the handle-based contract in [`engine`]: worlds are constructed from a
//! settings handle, advanced one generation at a time, and report their
//! fittest tour as a fitness scalar plus an offset into the engine's linear
//! memory. This crate owns everything around that contract:
//!
//! - [`settings`]: validated world parameters.
//! - [`engine`]: the engine traits and the epoch-tagged [`MemoryView`]
//!   abstraction over the engine's shared byte buffer.
//! - [`controller`]: the [`SimulationController`] driving a world
//!   generation-by-generation, tracking the best tour ever observed and
//!   notifying subscribers after every state change.
//! - [`scene`]: tour geometry for a 2D renderer, kept free of any drawing
//!   backend so it can be tested on the host.

pub mod controller;
pub mod engine;
pub mod scene;
pub mod settings;

pub use controller::{SimulationController, WorldError, WorldState};
pub use engine::{
    Engine, EngineError, EngineWorld, GenomeHandle, MemoryView, SharedMemory, ViewError,
};
pub use scene::TourScene;
pub use settings::{LocationLayout, SettingsError, WorldSettings};
