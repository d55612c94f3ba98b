// Command Facade - the public surface over one engine instance
//
// A Command owns exactly one engine and lives exactly as long as its
// creator; anyone needing to invoke or observe it receives a reference
// or a clone of the handle (no ambient registry).

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::warn;

use crate::application::engine::Engine;
pub use crate::application::engine::CommandStatus;
use crate::application::notifier::EventStream;
use crate::domain::{CommandParam, UnitId, UnitOutcome};
use crate::error::{EngineError, Rejection};
use crate::port::{AdmissionPolicy, Clock, SystemClock, WorkHandler};

/// Default concurrency capacity (one unit at a time)
pub const DEFAULT_CAPACITY: usize = 1;

/// Command configuration surface
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandConfig {
    /// Informational name, used in logs and nowhere else
    pub name: String,
    /// Maximum concurrently running units (>= 1)
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Whether the admission policy is consulted
    #[serde(default)]
    pub validation: bool,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl CommandConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capacity: DEFAULT_CAPACITY,
            validation: false,
        }
    }
}

/// A named, concurrency-bounded, pausable execution pipeline around one
/// delegate.
///
/// Cloning the handle is cheap and shares the same pipeline.
#[derive(Clone)]
pub struct Command {
    engine: Arc<Engine>,
}

impl Command {
    pub fn builder(name: impl Into<String>, handler: Arc<dyn WorkHandler>) -> CommandBuilder {
        CommandBuilder {
            name: name.into(),
            capacity: DEFAULT_CAPACITY,
            handler,
            policy: None,
            clock: None,
        }
    }

    /// Build from a config plus the collaborators the config cannot carry.
    /// `policy` is only consulted when `config.validation` is set.
    pub fn from_config(
        config: CommandConfig,
        handler: Arc<dyn WorkHandler>,
        policy: Option<Arc<dyn AdmissionPolicy>>,
    ) -> Result<Self, EngineError> {
        let mut builder = Self::builder(config.name, handler).capacity(config.capacity)?;
        if config.validation {
            if let Some(policy) = policy {
                builder = builder.policy(policy);
            } else {
                warn!("validation enabled without a policy; admitting everything");
            }
        }
        Ok(builder.build())
    }

    pub fn name(&self) -> &str {
        self.engine.name()
    }

    // ------------------------------------------------------------------
    // Execution
    // ------------------------------------------------------------------

    /// Fire-and-forget: returns as soon as admission is decided. The unit
    /// runs (or waits for a slot) in the background.
    pub fn try_execute(&self, param: impl Into<CommandParam>) -> Result<UnitId, Rejection> {
        self.engine.admit(param.into(), None)
    }

    /// Awaitable: resolves when the admitted unit reaches `Exited`,
    /// carrying its terminal outcome. Rejection resolves immediately.
    pub async fn execute_wait(
        &self,
        param: impl Into<CommandParam>,
    ) -> Result<UnitOutcome, Rejection> {
        let (tx, rx) = oneshot::channel();
        self.engine.admit(param.into(), Some(tx))?;
        match rx.await {
            Ok(outcome) => Ok(outcome),
            // Engine dropped mid-flight; report as discarded rather than hang
            Err(_) => Ok(UnitOutcome::Discarded),
        }
    }

    // ------------------------------------------------------------------
    // Control operations - sync forms apply the state change before
    // returning; `_wait` forms additionally await the consequent drain
    // step where one exists. Both observe the same serialized state.
    // ------------------------------------------------------------------

    /// Close the admission gate. Nothing already admitted is touched.
    pub fn lock(&self) {
        self.engine.lock_gate();
    }

    pub async fn lock_wait(&self) {
        self.engine.lock_gate();
    }

    /// Reopen the admission gate. Idempotent.
    pub fn unlock(&self) {
        self.engine.unlock_gate();
    }

    pub async fn unlock_wait(&self) {
        self.engine.unlock_gate();
    }

    /// Discard all queued (not running) units; each reaches `Exited`
    /// without starting and its awaiter resolves `Discarded`. Returns the
    /// number discarded. Leaves `locked`/`paused` untouched.
    pub fn clear(&self) -> usize {
        self.engine.clear()
    }

    /// Async form of [`clear`](Self::clear); the discard is fully applied
    /// before this resolves (as it is for the sync form).
    pub async fn clear_wait(&self) -> usize {
        self.engine.clear()
    }

    /// Cancel every running unit's token and pause the dispatcher; queued
    /// units stay queued. Cancellation is cooperative - slots free as
    /// units observe their token (or finish on their own).
    pub fn interrupt(&self) {
        let _ = self.engine.interrupt();
    }

    /// Like [`interrupt`](Self::interrupt), then await the exit of every
    /// unit that was running at the call.
    pub async fn interrupt_wait(&self) {
        let watchers = self.engine.interrupt();
        for mut done in watchers {
            // Resolves on the done flag; a sender dropped with the engine
            // also unblocks.
            while !*done.borrow() {
                if done.changed().await.is_err() {
                    break;
                }
            }
        }
    }

    /// Clear the paused flag and resume draining the queue. Safe no-op
    /// beyond the flag when nothing was interrupted.
    pub fn resume(&self) {
        self.engine.resume();
    }

    /// Async form of [`resume`](Self::resume); units started by the drain
    /// step have been handed to the pool before this resolves.
    pub async fn resume_wait(&self) {
        self.engine.resume();
    }

    /// Change the concurrency capacity. Growing starts queued units into
    /// the new headroom immediately; shrinking never cancels running
    /// units. Zero is rejected.
    pub fn resize(&self, new_capacity: usize) -> Result<(), EngineError> {
        self.engine.resize(new_capacity)
    }

    pub async fn resize_wait(&self, new_capacity: usize) -> Result<(), EngineError> {
        self.engine.resize(new_capacity)
    }

    /// The canonical safe full stop: lock out new admissions, drop the
    /// backlog, cancel running work, await its drain, then reopen.
    /// The engine is empty, unlocked, and unpaused when this resolves.
    pub async fn full_stop(&self) {
        self.lock();
        self.clear();
        self.interrupt_wait().await;
        self.resume();
        self.unlock();
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Attach a lifecycle event subscriber. Dropping the stream detaches
    /// it; [`unsubscribe`](Self::unsubscribe) detaches immediately.
    pub fn subscribe(&self) -> EventStream {
        self.engine.subscribe()
    }

    pub fn unsubscribe(&self, stream: &EventStream) {
        self.engine.unsubscribe(stream.id());
    }

    /// Enablement query for UI bindings: would this parameter be admitted
    /// right now?
    pub fn can_execute(&self, param: &CommandParam) -> bool {
        self.engine.can_admit(param)
    }

    /// Broadcast `Revalidate` so enablement observers re-run
    /// [`can_execute`](Self::can_execute). Changes no engine state.
    pub fn notify(&self) {
        self.engine.notify();
    }

    /// Consistent snapshot of flags, counters, and capacity
    pub fn status(&self) -> CommandStatus {
        self.engine.status()
    }
}

/// Builder for [`Command`]
pub struct CommandBuilder {
    name: String,
    capacity: usize,
    handler: Arc<dyn WorkHandler>,
    policy: Option<Arc<dyn AdmissionPolicy>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CommandBuilder {
    /// Concurrency capacity; zero is rejected
    pub fn capacity(mut self, capacity: usize) -> Result<Self, EngineError> {
        if capacity == 0 {
            return Err(EngineError::InvalidCapacity(capacity));
        }
        self.capacity = capacity;
        Ok(self)
    }

    /// Enable admission validation with this policy
    pub fn policy(mut self, policy: Arc<dyn AdmissionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Inject a clock (tests); defaults to [`SystemClock`]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Command {
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        Command {
            engine: Arc::new(Engine::new(
                self.name,
                self.capacity,
                self.handler,
                self.policy,
                clock,
            )),
        }
    }
}
