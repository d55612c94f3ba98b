// DispatchQ Core - Command execution engine
// NO infrastructure dependencies (hexagonal layout)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{cancel_pair, CancelSource, CancelToken};
pub use application::{Command, CommandBuilder, CommandConfig, CommandStatus, EventStream};
pub use domain::{CommandEvent, CommandParam, UnitId, UnitOutcome, UnitPhase};
pub use error::{EngineError, Rejection, Result};
pub use port::{AdmissionPolicy, Clock, SystemClock, WorkError, WorkHandler};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
