// Work Handler Port
// Abstraction over the delegate a command executes

use async_trait::async_trait;
use thiserror::Error;

use crate::application::cancel::CancelToken;
use crate::domain::CommandParam;

/// Delegate fault taxonomy
///
/// `Canceled` means the handler observed its cancellation token and bailed
/// out; the engine reports the unit as canceled. Any other error (and any
/// panic) is reported as failed. A handler that ignores the token and
/// returns `Ok` is reported as completed - cancellation is cooperative.
#[derive(Error, Debug)]
pub enum WorkError {
    #[error("work canceled")]
    Canceled,

    #[error("{0}")]
    Other(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkError {
    pub fn other(msg: impl Into<String>) -> Self {
        WorkError::Other(msg.into())
    }
}

/// Work Handler trait
///
/// Supplied once at command construction; the engine treats it as opaque
/// and calls it exactly once per admitted unit, outside the engine's
/// exclusion domain (a long-running handler never blocks admission or
/// control calls).
#[async_trait]
pub trait WorkHandler: Send + Sync {
    /// Execute one admitted unit
    ///
    /// # Arguments
    /// * `param` - The admitted parameter
    /// * `cancel` - Per-unit cancellation token; observe it to honor
    ///   `interrupt`
    async fn run(&self, param: &CommandParam, cancel: CancelToken) -> Result<(), WorkError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock handler behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Return Ok immediately
        Succeed,
        /// Sleep for the duration, ignoring the token, then return Ok
        SucceedAfter(Duration),
        /// Sleep for at most the duration, bailing out with
        /// `WorkError::Canceled` as soon as the token fires
        CancelAware(Duration),
        /// Always fail with message
        FailWith(String),
        /// Panic with message (for panic isolation testing)
        Panic(String),
    }

    /// Mock Work Handler for testing
    pub struct MockWorkHandler {
        behavior: Arc<Mutex<MockBehavior>>,
        call_count: Arc<Mutex<usize>>,
        started: Arc<Mutex<Vec<i64>>>,
    }

    impl MockWorkHandler {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                call_count: Arc::new(Mutex::new(0)),
                started: Arc::new(Mutex::new(Vec::new())),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Succeed)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::FailWith(message.into()))
        }

        pub fn new_panic_inducing(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        pub fn set_behavior(&self, behavior: MockBehavior) {
            *self.behavior.lock().unwrap() = behavior;
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }

        /// Millisecond timestamps (relative to process clock) at which
        /// calls entered `run`, for start-order assertions
        pub fn start_times_millis(&self) -> Vec<i64> {
            self.started.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl WorkHandler for MockWorkHandler {
        async fn run(&self, _param: &CommandParam, mut cancel: CancelToken) -> Result<(), WorkError> {
            *self.call_count.lock().unwrap() += 1;
            self.started
                .lock()
                .unwrap()
                .push(chrono::Utc::now().timestamp_millis());

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Succeed => Ok(()),
                MockBehavior::SucceedAfter(d) => {
                    tokio::time::sleep(d).await;
                    Ok(())
                }
                MockBehavior::CancelAware(d) => {
                    tokio::select! {
                        _ = tokio::time::sleep(d) => Ok(()),
                        _ = cancel.canceled() => Err(WorkError::Canceled),
                    }
                }
                MockBehavior::FailWith(msg) => Err(WorkError::Other(msg)),
                MockBehavior::Panic(msg) => {
                    panic!("{}", msg); // Actually panic for isolation testing
                }
            }
        }
    }
}
