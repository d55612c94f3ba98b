// WorkUnit Domain Model

use serde::{Deserialize, Serialize};

use crate::domain::error::{DomainError, Result};

/// Unit ID, monotonically increasing per command.
///
/// Admission order is directly comparable: for two units of the same
/// command, the one with the smaller id was admitted first.
pub type UnitId = u64;

/// Admitted parameter (JSON serializable, opaque to the engine)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandParam(serde_json::Value);

impl CommandParam {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Parameter with no payload
    pub fn none() -> Self {
        Self(serde_json::Value::Null)
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

impl From<serde_json::Value> for CommandParam {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

/// Unit lifecycle phase
///
/// Legal transitions:
/// `Created -> Enqueued -> Dequeued -> Started -> {Completed|Canceled|Failed} -> Exited`
/// plus the discard shortcut `Enqueued -> Exited` for units removed by
/// `Clear` before they ever ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitPhase {
    Created,
    Enqueued,
    Dequeued,
    Started,
    Completed,
    Canceled,
    Failed,
    Exited,
}

impl std::fmt::Display for UnitPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnitPhase::Created => write!(f, "CREATED"),
            UnitPhase::Enqueued => write!(f, "ENQUEUED"),
            UnitPhase::Dequeued => write!(f, "DEQUEUED"),
            UnitPhase::Started => write!(f, "STARTED"),
            UnitPhase::Completed => write!(f, "COMPLETED"),
            UnitPhase::Canceled => write!(f, "CANCELED"),
            UnitPhase::Failed => write!(f, "FAILED"),
            UnitPhase::Exited => write!(f, "EXITED"),
        }
    }
}

/// One admitted invocation of the command delegate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnit {
    pub id: UnitId,
    pub param: CommandParam,
    pub phase: UnitPhase,

    pub created_at: i64, // epoch ms
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
}

impl WorkUnit {
    /// Create a freshly admitted unit with injected timestamp
    pub fn new(id: UnitId, param: CommandParam, created_at: i64) -> Self {
        Self {
            id,
            param,
            phase: UnitPhase::Created,
            created_at,
            started_at: None,
            finished_at: None,
        }
    }

    fn transition(&mut self, from: UnitPhase, to: UnitPhase) -> Result<()> {
        if self.phase != from {
            return Err(DomainError::InvalidPhaseTransition {
                from: self.phase.to_string(),
                to: to.to_string(),
            });
        }
        self.phase = to;
        Ok(())
    }

    /// Accepted into the FIFO queue
    pub fn enqueue(&mut self) -> Result<()> {
        self.transition(UnitPhase::Created, UnitPhase::Enqueued)
    }

    /// Pulled from the queue head by the dispatcher
    pub fn dequeue(&mut self) -> Result<()> {
        self.transition(UnitPhase::Enqueued, UnitPhase::Dequeued)
    }

    /// Handed to the delegate, with explicit timestamp
    pub fn start(&mut self, now_millis: i64) -> Result<()> {
        self.transition(UnitPhase::Dequeued, UnitPhase::Started)?;
        self.started_at = Some(now_millis);
        Ok(())
    }

    /// Delegate returned normally
    pub fn complete(&mut self, now_millis: i64) -> Result<()> {
        self.transition(UnitPhase::Started, UnitPhase::Completed)?;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Delegate observed cancellation
    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        self.transition(UnitPhase::Started, UnitPhase::Canceled)?;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Delegate returned an error or panicked
    pub fn fail(&mut self, now_millis: i64) -> Result<()> {
        self.transition(UnitPhase::Started, UnitPhase::Failed)?;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Removed by `Clear` without ever starting (`Enqueued -> Exited`)
    pub fn discard(&mut self, now_millis: i64) -> Result<()> {
        self.transition(UnitPhase::Enqueued, UnitPhase::Exited)?;
        self.finished_at = Some(now_millis);
        Ok(())
    }

    /// Final transition out of the pipeline
    pub fn exit(&mut self) -> Result<()> {
        match self.phase {
            UnitPhase::Completed | UnitPhase::Canceled | UnitPhase::Failed => {
                self.phase = UnitPhase::Exited;
                Ok(())
            }
            _ => Err(DomainError::InvalidPhaseTransition {
                from: self.phase.to_string(),
                to: UnitPhase::Exited.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit() -> WorkUnit {
        WorkUnit::new(1, CommandParam::new(json!({"n": 1})), 1000)
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut u = unit();
        u.enqueue().unwrap();
        u.dequeue().unwrap();
        u.start(1100).unwrap();
        u.complete(1200).unwrap();
        u.exit().unwrap();
        assert_eq!(u.phase, UnitPhase::Exited);
        assert_eq!(u.started_at, Some(1100));
        assert_eq!(u.finished_at, Some(1200));
    }

    #[test]
    fn test_cancel_and_fail_paths() {
        let mut u = unit();
        u.enqueue().unwrap();
        u.dequeue().unwrap();
        u.start(1100).unwrap();
        u.cancel(1150).unwrap();
        u.exit().unwrap();
        assert_eq!(u.phase, UnitPhase::Exited);

        let mut u = unit();
        u.enqueue().unwrap();
        u.dequeue().unwrap();
        u.start(1100).unwrap();
        u.fail(1150).unwrap();
        assert_eq!(u.phase, UnitPhase::Failed);
    }

    #[test]
    fn test_discard_only_from_enqueued() {
        let mut u = unit();
        u.enqueue().unwrap();
        u.discard(1050).unwrap();
        assert_eq!(u.phase, UnitPhase::Exited);
        assert_eq!(u.started_at, None);

        let mut u = unit();
        assert!(u.discard(1050).is_err()); // still Created

        let mut u = unit();
        u.enqueue().unwrap();
        u.dequeue().unwrap();
        assert!(u.discard(1050).is_err()); // already dequeued
    }

    #[test]
    fn test_invalid_transition_is_rejected() {
        let mut u = unit();
        let err = u.start(1100).unwrap_err();
        assert!(matches!(
            err,
            DomainError::InvalidPhaseTransition { .. }
        ));

        let mut u = unit();
        u.enqueue().unwrap();
        assert!(u.complete(1100).is_err());
        assert!(u.exit().is_err());
    }
}
