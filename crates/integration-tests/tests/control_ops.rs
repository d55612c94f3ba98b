// Control operation contracts: idempotence, commutation, safe stop

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use dispatchq_core::{
    CancelToken, Command, CommandParam, UnitOutcome, WorkError, WorkHandler,
};

struct CancelAwareHandler {
    duration: Duration,
}

#[async_trait]
impl WorkHandler for CancelAwareHandler {
    async fn run(&self, _param: &CommandParam, mut cancel: CancelToken) -> Result<(), WorkError> {
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => Ok(()),
            _ = cancel.canceled() => Err(WorkError::Canceled),
        }
    }
}

struct StubbornHandler {
    duration: Duration,
}

#[async_trait]
impl WorkHandler for StubbornHandler {
    async fn run(&self, _param: &CommandParam, _cancel: CancelToken) -> Result<(), WorkError> {
        // Never looks at the token
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

fn long_handler() -> Arc<CancelAwareHandler> {
    Arc::new(CancelAwareHandler {
        duration: Duration::from_secs(60),
    })
}

fn p() -> CommandParam {
    CommandParam::none()
}

#[tokio::test]
async fn unlock_when_unlocked_is_idempotent() {
    let cmd = Command::builder("ctl", long_handler()).build();
    let before = cmd.status();
    cmd.unlock();
    cmd.unlock();
    assert_eq!(cmd.status(), before);
}

#[tokio::test]
async fn resume_when_not_paused_is_idempotent() {
    let cmd = Command::builder("ctl", long_handler()).build();
    let before = cmd.status();
    cmd.resume();
    cmd.resume();
    assert_eq!(cmd.status(), before);
}

#[tokio::test]
async fn lock_does_not_drain_admitted_work() {
    let cmd = Command::builder("ctl", long_handler()).build();
    cmd.try_execute(p()).unwrap();
    cmd.try_execute(p()).unwrap();
    cmd.lock();
    let status = cmd.status();
    assert_eq!(status.running, 1);
    assert_eq!(status.queued, 1);

    cmd.full_stop().await;
}

/// Clear before interrupt and after interrupt discard the same queued
/// units and cancel the same running unit.
#[tokio::test(start_paused = true)]
async fn clear_and_interrupt_commute() {
    for clear_first in [true, false] {
        let cmd = Command::builder("ctl", long_handler()).build();

        let running = {
            let cmd = cmd.clone();
            tokio::spawn(async move { cmd.execute_wait(p()).await })
        };
        let queued = {
            let cmd = cmd.clone();
            tokio::spawn(async move { cmd.execute_wait(p()).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        if clear_first {
            cmd.clear();
            cmd.interrupt_wait().await;
        } else {
            cmd.interrupt_wait().await;
            cmd.clear();
        }

        assert_eq!(
            running.await.unwrap().unwrap(),
            UnitOutcome::Canceled,
            "clear_first={}",
            clear_first
        );
        assert_eq!(
            queued.await.unwrap().unwrap(),
            UnitOutcome::Discarded,
            "clear_first={}",
            clear_first
        );
        let status = cmd.status();
        assert_eq!(status.running, 0);
        assert_eq!(status.queued, 0);
    }
}

/// A handler that never observes its token simply finishes on its own:
/// interrupt keeps the engine paused until then and the unit is reported
/// Completed, not Canceled.
#[tokio::test(start_paused = true)]
async fn interrupt_with_ignoring_handler_completes() {
    let handler = Arc::new(StubbornHandler {
        duration: Duration::from_millis(200),
    });
    let cmd = Command::builder("ctl", handler).build();

    let running = {
        let cmd = cmd.clone();
        tokio::spawn(async move { cmd.execute_wait(p()).await })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    cmd.interrupt_wait().await; // resolves when the unit finishes naturally
    assert_eq!(running.await.unwrap().unwrap(), UnitOutcome::Completed);
    assert!(cmd.status().paused);
    cmd.resume();
}

/// Shrinking capacity never cancels running units; it only withholds
/// new starts until running drops below the new bound.
#[tokio::test(start_paused = true)]
async fn resize_down_withholds_starts() {
    let cmd = Command::builder("ctl", long_handler()).build();
    cmd.resize(3).unwrap();
    for _ in 0..3 {
        cmd.try_execute(p()).unwrap();
    }
    cmd.try_execute(p()).unwrap(); // queued
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(cmd.status().running, 3);
    assert_eq!(cmd.status().queued, 1);

    cmd.resize(1).unwrap();
    assert_eq!(cmd.status().running, 3, "running units are not canceled");

    cmd.interrupt_wait().await;
    cmd.resume();
    // Only one slot now
    assert_eq!(cmd.status().running, 1);
    assert_eq!(cmd.status().queued, 0);

    cmd.full_stop().await;
}

/// The canonical safe full stop leaves an empty, unlocked, unpaused,
/// immediately reusable engine.
#[tokio::test(start_paused = true)]
async fn full_stop_settles_to_empty_and_reusable() {
    let cmd = Command::builder("ctl", long_handler()).build();
    for _ in 0..4 {
        cmd.try_execute(p()).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;

    cmd.full_stop().await;
    let status = cmd.status();
    assert_eq!(status.running, 0);
    assert_eq!(status.queued, 0);
    assert!(!status.locked);
    assert!(!status.paused);

    // Engine accepts and runs new work afterwards
    cmd.try_execute(p()).unwrap();
    assert_eq!(cmd.status().running, 1);
    cmd.full_stop().await;
}
