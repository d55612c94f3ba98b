// Lifecycle event contract: ordering, at-most-once, per-path shapes

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use dispatchq_core::{
    CancelToken, Command, CommandEvent, CommandParam, UnitId, UnitPhase, WorkError, WorkHandler,
};

struct ScriptedHandler {
    script: WorkScript,
}

#[derive(Clone, Copy)]
enum WorkScript {
    Succeed,
    Fail,
    Panic,
    AwaitCancel,
}

#[async_trait]
impl WorkHandler for ScriptedHandler {
    async fn run(&self, _param: &CommandParam, mut cancel: CancelToken) -> Result<(), WorkError> {
        match self.script {
            WorkScript::Succeed => Ok(()),
            WorkScript::Fail => Err(WorkError::other("scripted failure")),
            WorkScript::Panic => panic!("scripted panic"),
            WorkScript::AwaitCancel => {
                cancel.canceled().await;
                Err(WorkError::Canceled)
            }
        }
    }
}

fn command(script: WorkScript) -> Command {
    Command::builder("events", Arc::new(ScriptedHandler { script })).build()
}

fn p() -> CommandParam {
    CommandParam::none()
}

/// Drain every currently delivered event without blocking
fn drain(events: &mut dispatchq_core::EventStream) -> Vec<CommandEvent> {
    let mut out = Vec::new();
    while let Some(ev) = events.try_recv() {
        out.push(ev);
    }
    out
}

fn phases_of(events: &[CommandEvent], unit: UnitId) -> Vec<UnitPhase> {
    events
        .iter()
        .filter_map(|ev| match ev {
            CommandEvent::Unit { unit: u, phase, .. } if *u == unit => Some(*phase),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn completed_unit_emits_full_ordered_sequence() {
    let cmd = command(WorkScript::Succeed);
    let mut events = cmd.subscribe();

    cmd.execute_wait(p()).await.unwrap();
    let seen = drain(&mut events);
    assert_eq!(
        phases_of(&seen, 1),
        vec![
            UnitPhase::Created,
            UnitPhase::Enqueued,
            UnitPhase::Dequeued,
            UnitPhase::Started,
            UnitPhase::Completed,
            UnitPhase::Exited,
        ]
    );
}

#[tokio::test]
async fn failed_unit_carries_error_and_exits() {
    let cmd = command(WorkScript::Fail);
    let mut events = cmd.subscribe();

    cmd.execute_wait(p()).await.unwrap();
    let seen = drain(&mut events);
    assert_eq!(
        phases_of(&seen, 1),
        vec![
            UnitPhase::Created,
            UnitPhase::Enqueued,
            UnitPhase::Dequeued,
            UnitPhase::Started,
            UnitPhase::Failed,
            UnitPhase::Exited,
        ]
    );
    let failed = seen
        .iter()
        .find_map(|ev| match ev {
            CommandEvent::Unit {
                phase: UnitPhase::Failed,
                error,
                ..
            } => error.clone(),
            _ => None,
        })
        .unwrap();
    assert_eq!(failed, "scripted failure");
}

#[tokio::test]
async fn panicking_unit_is_reported_failed() {
    let cmd = command(WorkScript::Panic);
    let mut events = cmd.subscribe();

    let outcome = cmd.execute_wait(p()).await.unwrap();
    assert!(matches!(outcome, dispatchq_core::UnitOutcome::Failed(msg) if msg.contains("scripted panic")));

    let seen = drain(&mut events);
    let phases = phases_of(&seen, 1);
    assert_eq!(phases.last(), Some(&UnitPhase::Exited));
    assert!(phases.contains(&UnitPhase::Failed));
    assert_eq!(cmd.status().running, 0, "panicked unit must free its slot");
}

#[tokio::test]
async fn canceled_unit_emits_canceled_then_exited() {
    let cmd = command(WorkScript::AwaitCancel);
    let mut events = cmd.subscribe();

    let wait = {
        let cmd = cmd.clone();
        tokio::spawn(async move { cmd.execute_wait(p()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    cmd.interrupt_wait().await;
    cmd.resume();
    wait.await.unwrap().unwrap();

    let seen = drain(&mut events);
    assert_eq!(
        phases_of(&seen, 1),
        vec![
            UnitPhase::Created,
            UnitPhase::Enqueued,
            UnitPhase::Dequeued,
            UnitPhase::Started,
            UnitPhase::Canceled,
            UnitPhase::Exited,
        ]
    );
}

#[tokio::test]
async fn cleared_unit_emits_exited_without_started() {
    let cmd = command(WorkScript::AwaitCancel);
    let mut events = cmd.subscribe();

    cmd.try_execute(p()).unwrap(); // occupies the slot, never finishes alone
    cmd.try_execute(p()).unwrap(); // stays queued
    cmd.clear();

    let seen = drain(&mut events);
    assert_eq!(
        phases_of(&seen, 2),
        vec![UnitPhase::Created, UnitPhase::Enqueued, UnitPhase::Exited],
        "a cleared unit never starts"
    );

    cmd.full_stop().await;
}

/// Per unit, every phase is emitted at most once, across a burst of
/// units and control traffic.
#[tokio::test]
async fn phases_are_at_most_once_per_unit() {
    let cmd = command(WorkScript::Succeed);
    let mut events = cmd.subscribe();

    for _ in 0..10 {
        cmd.execute_wait(p()).await.unwrap();
    }
    cmd.notify();

    let seen = drain(&mut events);
    let mut counts: HashMap<(UnitId, UnitPhase), usize> = HashMap::new();
    for ev in &seen {
        if let CommandEvent::Unit { unit, phase, .. } = ev {
            *counts.entry((*unit, *phase)).or_default() += 1;
        }
    }
    for ((unit, phase), count) in counts {
        assert_eq!(count, 1, "unit {} phase {} emitted {} times", unit, phase, count);
    }
}

/// The stream implements futures::Stream and yields in emission order.
#[tokio::test]
async fn event_stream_works_as_a_stream() {
    let cmd = command(WorkScript::Succeed);
    let mut events = cmd.subscribe();

    cmd.execute_wait(p()).await.unwrap();
    drop(cmd); // closes the registry, ending the stream

    let collected: Vec<_> = (&mut events).collect().await;
    assert_eq!(collected.len(), 6);
    assert_eq!(collected[0].phase(), Some(UnitPhase::Created));
    assert_eq!(collected[5].phase(), Some(UnitPhase::Exited));
}

#[tokio::test]
async fn dropped_subscriber_does_not_disturb_others() {
    let cmd = command(WorkScript::Succeed);
    let dropped = cmd.subscribe();
    let mut kept = cmd.subscribe();
    drop(dropped);

    cmd.execute_wait(p()).await.unwrap();
    let seen = drain(&mut kept);
    assert_eq!(phases_of(&seen, 1).len(), 6);
}
