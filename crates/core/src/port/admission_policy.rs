// Admission Policy Port
// Optional validation predicate consulted at admission time

use crate::domain::CommandParam;

/// Admission predicate interface
///
/// Must be side-effect free and fast: it is evaluated under the engine's
/// exclusion domain. Consulted at admission and re-consulted by external
/// enablement observers after `notify()`.
pub trait AdmissionPolicy: Send + Sync {
    /// Return true to accept the parameter into the queue
    fn admit(&self, param: &CommandParam) -> bool;
}

/// Plain closures are admission policies
impl<F> AdmissionPolicy for F
where
    F: Fn(&CommandParam) -> bool + Send + Sync,
{
    fn admit(&self, param: &CommandParam) -> bool {
        self(param)
    }
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Togglable policy with evaluation counting
    #[derive(Default)]
    pub struct TogglePolicy {
        allow: AtomicBool,
        checks: AtomicUsize,
    }

    impl TogglePolicy {
        pub fn new(allow: bool) -> Self {
            Self {
                allow: AtomicBool::new(allow),
                checks: AtomicUsize::new(0),
            }
        }

        pub fn set_allow(&self, allow: bool) {
            self.allow.store(allow, Ordering::SeqCst);
        }

        pub fn check_count(&self) -> usize {
            self.checks.load(Ordering::SeqCst)
        }
    }

    impl AdmissionPolicy for TogglePolicy {
        fn admit(&self, _param: &CommandParam) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.allow.load(Ordering::SeqCst)
        }
    }
}
