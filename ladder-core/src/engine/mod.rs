//! Engine wiring: the quoting trait seam, the lifecycle state machine,
//! and the orchestrator that connects the three event sources.

pub mod orchestrator;
pub mod state;
pub mod traits;

pub use orchestrator::{Engine, EngineChannels, EngineStats};
pub use state::{EnginePhase, EngineState, HealthInputs};
pub use traits::{ConcurrencyTargets, QuoteInputs, Quoter};
