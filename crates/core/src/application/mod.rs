// Application Layer - Engine and public facade

pub mod cancel;
pub mod command;
mod engine;
pub mod notifier;


// Re-exports
pub use cancel::{cancel_pair, CancelSource, CancelToken};
pub use command::{Command, CommandBuilder, CommandConfig, CommandStatus, DEFAULT_CAPACITY};
pub use notifier::{EventStream, SubscriptionId};
