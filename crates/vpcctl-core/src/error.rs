//! Control-plane error types and their exit-code mapping.

use thiserror::Error;

use crate::plan::PlanError;
use crate::store::StoreError;
use vpcctl_net::NetError;

/// Result type alias for control-plane operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the control plane.
///
/// The dispatcher maps these onto process exit codes: validation and
/// planning failures are user errors (1), host-execution failures and
/// lock timeouts are host errors (2), state-store failures are fatal
/// store errors (3).
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed user input: names, options, policy documents.
    #[error("{0}")]
    Validation(String),

    /// Address-plan rejection: overlap, containment, range.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// A host operation failed in a way the reconciler could not absorb.
    #[error(transparent)]
    Host(#[from] NetError),

    /// Another invocation holds the lock and the wait timed out.
    #[error("busy: {0}")]
    Busy(String),

    /// The state store could not be read, parsed, or written.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl Error {
    /// Process exit code for this error class.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation(_) | Self::Plan(_) => 1,
            Self::Host(_) | Self::Busy(_) => 2,
            Self::Store(_) => 3,
        }
    }

    /// Short remedial hint shown alongside the failure summary, when one
    /// applies.
    #[must_use]
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Host(NetError::PermissionDenied(_)) => Some("re-run as root"),
            Self::Host(_) => Some("kernel state may be partial; `vpcctl teardown-all` resets it"),
            Self::Busy(_) => Some("another vpcctl invocation is running; retry shortly"),
            Self::Store(_) => Some("inspect the state directory before retrying"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes_match_taxonomy() {
        assert_eq!(Error::Validation("bad".into()).exit_code(), 1);
        assert_eq!(
            Error::Plan(PlanError::CidrOutOfRange("10.0.0.0/30".parse().unwrap())).exit_code(),
            1
        );
        assert_eq!(Error::Host(NetError::NotFound("x".into())).exit_code(), 2);
        assert_eq!(Error::Busy("vpc a".into()).exit_code(), 2);
        assert_eq!(
            Error::Store(StoreError::Corrupt {
                path: "state/a.json".into(),
                source: serde_json::from_str::<()>("x").unwrap_err(),
            })
            .exit_code(),
            3
        );
    }

    #[test]
    fn test_permission_hint() {
        let err = Error::Host(NetError::PermissionDenied("ip link add".into()));
        assert_eq!(err.hint(), Some("re-run as root"));
    }
}
