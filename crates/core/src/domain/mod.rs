// Domain Layer - Pure engine state, no I/O

pub mod error;
pub mod event;
pub mod unit;

// Re-exports
pub use error::DomainError;
pub use event::{CommandEvent, UnitOutcome};
pub use unit::{CommandParam, UnitId, UnitPhase, WorkUnit};
