// Engine - admission gate, bounded FIFO queue, dispatcher, pause control
//
// One mutex per command is the single exclusion domain: queue mutation,
// the running set, locked/paused flags, and event emission happen inside
// one critical section per transition. The lock is never held across an
// await; delegate execution runs on the tokio pool outside the lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::application::cancel::{cancel_pair, CancelSource, CancelToken};
use crate::application::notifier::{EventStream, LifecycleNotifier, SubscriptionId};
use crate::domain::{CommandEvent, CommandParam, UnitId, UnitOutcome, UnitPhase, WorkUnit};
use crate::error::{EngineError, Rejection};
use crate::port::{AdmissionPolicy, Clock, WorkError, WorkHandler};

/// Consistent snapshot of engine state, taken under the exclusion
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CommandStatus {
    pub locked: bool,
    pub paused: bool,
    pub running: usize,
    pub queued: usize,
    pub capacity: usize,
}

struct QueuedUnit {
    unit: WorkUnit,
    cancel: CancelSource,
    waiter: Option<oneshot::Sender<UnitOutcome>>,
}

struct RunningUnit {
    unit: WorkUnit,
    cancel: CancelSource,
    waiter: Option<oneshot::Sender<UnitOutcome>>,
    done_tx: watch::Sender<bool>,
}

struct EngineState {
    locked: bool,
    paused: bool,
    capacity: usize,
    queue: VecDeque<QueuedUnit>,
    running: Vec<RunningUnit>,
    next_unit: UnitId,
    notifier: LifecycleNotifier,
}

pub(crate) struct Engine {
    name: String,
    handler: Arc<dyn WorkHandler>,
    policy: Option<Arc<dyn AdmissionPolicy>>,
    clock: Arc<dyn Clock>,
    state: Mutex<EngineState>,
}

impl Engine {
    pub(crate) fn new(
        name: String,
        capacity: usize,
        handler: Arc<dyn WorkHandler>,
        policy: Option<Arc<dyn AdmissionPolicy>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name,
            handler,
            policy,
            clock,
            state: Mutex::new(EngineState {
                locked: false,
                paused: false,
                capacity,
                queue: VecDeque::new(),
                running: Vec::new(),
                next_unit: 1,
                notifier: LifecycleNotifier::new(),
            }),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        // Engine state is never mutated while panicking, so a poisoned
        // lock only ever carries consistent state.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Admission: reject on lock or failed validation (silently, no event),
    /// otherwise create the unit, enqueue it, and kick the dispatcher.
    pub(crate) fn admit(
        self: &Arc<Self>,
        param: CommandParam,
        waiter: Option<oneshot::Sender<UnitOutcome>>,
    ) -> Result<UnitId, Rejection> {
        let mut state = self.lock_state();

        if state.locked {
            debug!(command = %self.name, "Admission rejected: locked");
            return Err(Rejection::Locked);
        }
        if let Some(policy) = &self.policy {
            if !policy.admit(&param) {
                debug!(command = %self.name, "Admission rejected: validation failed");
                return Err(Rejection::ValidationFailed);
            }
        }

        let id = state.next_unit;
        state.next_unit += 1;
        let now = self.clock.now_millis();

        let mut unit = WorkUnit::new(id, param, now);
        state
            .notifier
            .emit(CommandEvent::unit(id, UnitPhase::Created, now));

        if let Err(e) = unit.enqueue() {
            error!(command = %self.name, unit = id, "Enqueue transition failed: {}", e);
        }
        let (cancel, _token) = cancel_pair();
        state.queue.push_back(QueuedUnit {
            unit,
            cancel,
            waiter,
        });
        state
            .notifier
            .emit(CommandEvent::unit(id, UnitPhase::Enqueued, now));
        info!(command = %self.name, unit = id, queued = state.queue.len(), "Unit admitted");

        self.try_start_next(&mut state);
        Ok(id)
    }

    /// Dispatcher drain step: start queued units while a slot is free and
    /// the engine is not paused. This and `finish` are the only places a
    /// unit starts or a slot is recycled.
    fn try_start_next(self: &Arc<Self>, state: &mut EngineState) {
        while !state.paused && state.running.len() < state.capacity {
            let Some(mut queued) = state.queue.pop_front() else {
                break;
            };
            let id = queued.unit.id;
            let now = self.clock.now_millis();

            if let Err(e) = queued.unit.dequeue() {
                error!(command = %self.name, unit = id, "Dequeue transition failed: {}", e);
            }
            state
                .notifier
                .emit(CommandEvent::unit(id, UnitPhase::Dequeued, now));

            if let Err(e) = queued.unit.start(now) {
                error!(command = %self.name, unit = id, "Start transition failed: {}", e);
            }
            state
                .notifier
                .emit(CommandEvent::unit(id, UnitPhase::Started, now));
            debug!(
                command = %self.name,
                unit = id,
                running = state.running.len() + 1,
                capacity = state.capacity,
                "Unit started"
            );

            let token = queued.cancel.token();
            let param = queued.unit.param.clone();
            let (done_tx, _done_rx) = watch::channel(false);
            state.running.push(RunningUnit {
                unit: queued.unit,
                cancel: queued.cancel,
                waiter: queued.waiter,
                done_tx,
            });

            self.spawn_runner(id, param, token);
        }
    }

    /// Run the delegate on the pool with panic isolation: the inner task's
    /// panic is captured by the outer join, classified, and fed back
    /// through the sole slot-recycling path.
    fn spawn_runner(self: &Arc<Self>, id: UnitId, param: CommandParam, token: CancelToken) {
        let engine = Arc::clone(self);
        let handler = Arc::clone(&self.handler);
        tokio::spawn(async move {
            let inner = tokio::spawn(async move { handler.run(&param, token).await });
            let outcome = match inner.await {
                Ok(Ok(())) => UnitOutcome::Completed,
                Ok(Err(WorkError::Canceled)) => UnitOutcome::Canceled,
                Ok(Err(e)) => UnitOutcome::Failed(e.to_string()),
                Err(join_err) if join_err.is_panic() => {
                    let payload = join_err.into_panic();
                    let msg = if let Some(s) = payload.downcast_ref::<&str>() {
                        s.to_string()
                    } else if let Some(s) = payload.downcast_ref::<String>() {
                        s.clone()
                    } else {
                        "unknown panic".to_string()
                    };
                    error!(command = %engine.name, unit = id, panic_msg = %msg, "Delegate panicked");
                    UnitOutcome::Failed(msg)
                }
                Err(_) => UnitOutcome::Canceled, // runtime shutdown aborted the task
            };
            engine.finish(id, outcome);
        });
    }

    /// Completion path: decrement running, emit the terminal pair, resolve
    /// the awaiter, then drain again. Runs for normal return, cancellation,
    /// fault, and panic alike, so a slot can never leak.
    fn finish(self: &Arc<Self>, id: UnitId, outcome: UnitOutcome) {
        let mut state = self.lock_state();

        let Some(pos) = state.running.iter().position(|r| r.unit.id == id) else {
            warn!(command = %self.name, unit = id, "Finished unit not in running set");
            return;
        };
        let mut running = state.running.swap_remove(pos);
        let now = self.clock.now_millis();

        let transition = match &outcome {
            UnitOutcome::Completed => running.unit.complete(now),
            UnitOutcome::Canceled => running.unit.cancel(now),
            UnitOutcome::Failed(_) => running.unit.fail(now),
            // Discarded never reaches finish; cleared units exit in clear()
            UnitOutcome::Discarded => Err(crate::domain::DomainError::Internal(
                "discarded unit reached completion path".into(),
            )),
        };
        if let Err(e) = transition {
            error!(command = %self.name, unit = id, "Terminal transition failed: {}", e);
        }

        let event = match &outcome {
            UnitOutcome::Failed(msg) => CommandEvent::failed(id, msg.clone(), now),
            UnitOutcome::Canceled => CommandEvent::unit(id, UnitPhase::Canceled, now),
            _ => CommandEvent::unit(id, UnitPhase::Completed, now),
        };
        state.notifier.emit(event);

        if let Err(e) = running.unit.exit() {
            error!(command = %self.name, unit = id, "Exit transition failed: {}", e);
        }
        state
            .notifier
            .emit(CommandEvent::unit(id, UnitPhase::Exited, now));
        info!(command = %self.name, unit = id, outcome = ?outcome, "Unit exited");

        if let Some(waiter) = running.waiter.take() {
            let _ = waiter.send(outcome); // caller may have gone away
        }
        let _ = running.done_tx.send(true);

        self.try_start_next(&mut state);
    }

    /// AdmissionGate toggle; touches nothing already admitted
    pub(crate) fn lock_gate(&self) {
        let mut state = self.lock_state();
        state.locked = true;
        info!(command = %self.name, "Locked");
    }

    pub(crate) fn unlock_gate(&self) {
        let mut state = self.lock_state();
        state.locked = false;
        info!(command = %self.name, "Unlocked");
    }

    /// Discard every queued unit (`Enqueued -> Exited`); running units and
    /// the locked/paused flags are untouched. Returns the discard count.
    pub(crate) fn clear(&self) -> usize {
        let mut state = self.lock_state();
        let now = self.clock.now_millis();
        let mut discarded = 0;

        while let Some(mut queued) = state.queue.pop_front() {
            let id = queued.unit.id;
            if let Err(e) = queued.unit.discard(now) {
                error!(command = %self.name, unit = id, "Discard transition failed: {}", e);
            }
            state
                .notifier
                .emit(CommandEvent::unit(id, UnitPhase::Exited, now));
            if let Some(waiter) = queued.waiter.take() {
                let _ = waiter.send(UnitOutcome::Discarded);
            }
            discarded += 1;
        }
        if discarded > 0 {
            info!(command = %self.name, discarded, "Queue cleared");
        }
        discarded
    }

    /// Cancel every running unit's token and pause the dispatcher. Slots
    /// are not forced free; they recycle as each unit observes the token.
    /// Returns done-watchers for the units that were running at the call.
    pub(crate) fn interrupt(&self) -> Vec<watch::Receiver<bool>> {
        let mut state = self.lock_state();
        state.paused = true;
        let watchers: Vec<_> = state
            .running
            .iter()
            .map(|r| {
                r.cancel.cancel();
                r.done_tx.subscribe()
            })
            .collect();
        info!(command = %self.name, canceled = watchers.len(), "Interrupted");
        watchers
    }

    /// Clear the paused flag and resume draining; a no-op beyond the flag
    /// when nothing was interrupted.
    pub(crate) fn resume(self: &Arc<Self>) {
        let mut state = self.lock_state();
        state.paused = false;
        info!(command = %self.name, queued = state.queue.len(), "Resumed");
        self.try_start_next(&mut state);
    }

    /// Change concurrency capacity. Growing drains immediately into the
    /// new headroom; shrinking never cancels running units - the
    /// dispatcher simply withholds starts until `running` drops below the
    /// new bound.
    pub(crate) fn resize(self: &Arc<Self>, new_capacity: usize) -> Result<(), EngineError> {
        if new_capacity == 0 {
            return Err(EngineError::InvalidCapacity(new_capacity));
        }
        let mut state = self.lock_state();
        let old = state.capacity;
        state.capacity = new_capacity;
        info!(command = %self.name, old, new = new_capacity, "Capacity changed");
        if new_capacity > old {
            self.try_start_next(&mut state);
        }
        Ok(())
    }

    /// Broadcast a re-validation signal; no other state is touched
    pub(crate) fn notify(&self) {
        let mut state = self.lock_state();
        state.notifier.emit(CommandEvent::Revalidate);
    }

    /// The UI-enablement query: would `admit` accept this parameter now?
    pub(crate) fn can_admit(&self, param: &CommandParam) -> bool {
        let state = self.lock_state();
        if state.locked {
            return false;
        }
        self.policy.as_ref().map_or(true, |p| p.admit(param))
    }

    pub(crate) fn status(&self) -> CommandStatus {
        let state = self.lock_state();
        CommandStatus {
            locked: state.locked,
            paused: state.paused,
            running: state.running.len(),
            queued: state.queue.len(),
            capacity: state.capacity,
        }
    }

    pub(crate) fn subscribe(&self) -> EventStream {
        self.lock_state().notifier.subscribe()
    }

    pub(crate) fn unsubscribe(&self, id: SubscriptionId) {
        self.lock_state().notifier.unsubscribe(id);
    }
}
