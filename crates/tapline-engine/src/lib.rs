//! Orchestration and messaging core of the Tapline ETL engine.
//!
//! Components are explicitly constructed, dependency-injected services:
//! build a [`engine::Engine`] (or wire the pieces yourself), `start` what
//! needs starting, and `shutdown` in order when done. There are no
//! process-wide singletons.

pub mod control_bus;
pub mod definitions;
pub mod endpoint;
pub mod engine;
pub mod orchestrator;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod transform;
pub mod wiretap;

pub use control_bus::ControlBus;
pub use engine::{Engine, EngineConfig};
pub use orchestrator::Orchestrator;
pub use pipeline::Pipeline;
pub use retry::RetryHandler;
pub use scheduler::JobScheduler;
pub use wiretap::WireTap;
