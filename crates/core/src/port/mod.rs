// Port Layer - Interfaces for external collaborators

pub mod admission_policy;
pub mod clock; // For deterministic testing
pub mod work_handler;

// Re-exports
pub use admission_policy::AdmissionPolicy;
pub use clock::{Clock, SystemClock};
pub use work_handler::{WorkError, WorkHandler};
