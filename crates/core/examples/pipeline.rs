//! Command pipeline walkthrough
//!
//! Builds a capacity-2 command around a sleepy delegate, watches its
//! lifecycle events, then exercises interrupt / resume and the canonical
//! safe stop.
//!
//! ```bash
//! cargo run --package dispatchq-core --example pipeline
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use dispatchq_core::{
    CancelToken, Command, CommandParam, UnitOutcome, WorkError, WorkHandler,
};

struct SleepyWorker;

#[async_trait]
impl WorkHandler for SleepyWorker {
    async fn run(&self, param: &CommandParam, mut cancel: CancelToken) -> Result<(), WorkError> {
        let label = param.as_value()["label"].as_str().unwrap_or("?").to_string();
        println!("   > working on {label}");
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(300)) => Ok(()),
            _ = cancel.canceled() => {
                println!("   > {label} observed cancellation");
                Err(WorkError::Canceled)
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cmd = Command::builder("pipeline-demo", Arc::new(SleepyWorker))
        .capacity(2)?
        .build();

    // Watch the lifecycle stream in the background
    let mut events = cmd.subscribe();
    let watcher = tokio::spawn(async move {
        while let Some(ev) = events.recv().await {
            println!("   [event] {ev:?}");
        }
    });

    println!("1. Admitting four units at capacity 2...");
    let mut waits = Vec::new();
    for label in ["alpha", "beta", "gamma", "delta"] {
        let cmd = cmd.clone();
        let param = json!({ "label": label });
        waits.push(tokio::spawn(
            async move { cmd.execute_wait(param).await },
        ));
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    println!("   status: {:?}", cmd.status());

    println!("2. Interrupting (cancels running, keeps the queue)...");
    cmd.interrupt_wait().await;
    println!("   status: {:?}", cmd.status());

    println!("3. Resuming the drain...");
    cmd.resume();
    for w in waits {
        let outcome = w.await??;
        assert!(matches!(
            outcome,
            UnitOutcome::Completed | UnitOutcome::Canceled
        ));
    }

    println!("4. Safe full stop...");
    cmd.full_stop().await;
    println!("   status: {:?}", cmd.status());

    drop(cmd);
    let _ = watcher.await;
    println!("Done.");
    Ok(())
}
