pub mod convergence;
pub mod engine;
pub mod network_model;
pub mod scenario;
pub mod topology;
pub mod types;

pub use engine::{NetworkModelConfig, TickEngine, TickEngineConfig};
pub use types::{EventAction, ExternalEvent, RunResult};
