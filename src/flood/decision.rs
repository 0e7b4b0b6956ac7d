//! Outcome of a flood-control check.

use std::time::Duration;

use crate::error::LimitExceeded;

/// The result of checking one call against an identity's window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// The call was admitted and recorded.
    Allowed {
        /// Calls that would still be admitted right now
        remaining: usize,
    },
    /// The identity was already at its limit; the call was not recorded.
    Denied {
        /// Time until the oldest counted call leaves the window
        retry_after: Duration,
    },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// Convert into a `Result`, turning a denial into [`LimitExceeded`].
    pub fn into_result(self) -> Result<(), LimitExceeded> {
        match self {
            Decision::Allowed { .. } => Ok(()),
            Decision::Denied { retry_after } => Err(LimitExceeded { retry_after }),
        }
    }
}
