//! The message pipeline.
//!
//! [`Pipeline`] owns the injected collaborators and runs one turn per
//! inbound message event; see [`turn`] for the step order.

pub mod context;
pub mod convert;
pub mod dispatch;
pub mod enrich;
pub mod indicator;
pub mod normalize;
pub mod turn;

pub use context::TurnContext;
pub use convert::{HistoryConverter, NameResolver, ProfileNames};
pub use enrich::ContextEnricher;
pub use indicator::{IndicatorHandle, IndicatorScheduler, IndicatorState};
pub use normalize::Normalizer;
pub use turn::{Collaborators, Pipeline, PipelineSettings, TurnOutcome};
