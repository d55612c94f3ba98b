// Lifecycle Events & Terminal Outcomes

use serde::{Deserialize, Serialize};

use crate::domain::unit::{UnitId, UnitPhase};

/// Terminal result of one admitted unit, delivered to awaiting callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitOutcome {
    /// Delegate returned normally
    Completed,
    /// Delegate observed cancellation after `interrupt`
    Canceled,
    /// Delegate returned an error or panicked (captured message)
    Failed(String),
    /// Removed by `clear` before it ever started
    Discarded,
}

/// Event fanned out to subscribers, in transition order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandEvent {
    /// One unit crossed one phase boundary. `at` is the engine clock's
    /// epoch-ms reading when the transition was applied; `error` is set
    /// only for `Failed` phases.
    Unit {
        unit: UnitId,
        phase: UnitPhase,
        at: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// `notify()` was called: external enablement observers should
    /// re-evaluate the admission predicate. Carries no state change.
    Revalidate,
}

impl CommandEvent {
    pub fn unit(unit: UnitId, phase: UnitPhase, at: i64) -> Self {
        CommandEvent::Unit {
            unit,
            phase,
            at,
            error: None,
        }
    }

    pub fn failed(unit: UnitId, error: impl Into<String>, at: i64) -> Self {
        CommandEvent::Unit {
            unit,
            phase: UnitPhase::Failed,
            at,
            error: Some(error.into()),
        }
    }

    /// Phase of a unit event, `None` for `Revalidate`
    pub fn phase(&self) -> Option<UnitPhase> {
        match self {
            CommandEvent::Unit { phase, .. } => Some(*phase),
            CommandEvent::Revalidate => None,
        }
    }

    /// Clock stamp of a unit event, `None` for `Revalidate`
    pub fn at(&self) -> Option<i64> {
        match self {
            CommandEvent::Unit { at, .. } => Some(*at),
            CommandEvent::Revalidate => None,
        }
    }
}
