//! The host executor.
//!
//! [`HostExecutor`] is the only component that touches the operating
//! system. It groups the wrapped operations into four families (links,
//! namespaces, NAT, packet filtering), implemented in the sibling
//! modules as `impl` blocks on this type.

use std::sync::Arc;

use crate::runner::{CommandRunner, SystemRunner};

/// Executes host network operations through a [`CommandRunner`].
///
/// All methods are synchronous and blocking; callers sequence them and
/// decide which typed failures to treat as success.
#[derive(Clone)]
pub struct HostExecutor {
    pub(crate) runner: Arc<dyn CommandRunner>,
}

impl HostExecutor {
    /// Creates an executor backed by the system tools.
    #[must_use]
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemRunner))
    }

    /// Creates an executor over a custom runner (used by tests).
    #[must_use]
    pub fn with_runner(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

impl Default for HostExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HostExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostExecutor").finish_non_exhaustive()
    }
}
