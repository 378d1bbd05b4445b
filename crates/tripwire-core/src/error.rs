//! Errors returned from guarded calls.

use thiserror::Error;

/// The breaker refused to invoke the operation because the circuit is open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Circuit {} is open, next attempt at {next_attempt}", .breaker.as_deref().unwrap_or("breaker"))]
pub struct CircuitOpenError {
    /// Name of the breaker that rejected the call
    pub breaker: Option<String>,

    /// Milliseconds timestamp from which a trial call is allowed
    pub next_attempt: u64,
}

/// Outcome of a failed [`execute`](crate::Breaker::execute).
///
/// `Open` means the operation never ran. `Operation` carries the operation's
/// own error, untouched.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    #[error(transparent)]
    Operation(E),
}

impl<E> BreakerError<E> {
    /// True if the breaker rejected the call.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open(_))
    }

    /// The operation's error, if the operation ran and failed.
    pub fn into_operation(self) -> Option<E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            BreakerError::Open(_) => None,
        }
    }

    /// Borrow the operation's error, if any.
    pub fn operation(&self) -> Option<&E> {
        match self {
            BreakerError::Operation(e) => Some(e),
            BreakerError::Open(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_error_message() {
        let named = CircuitOpenError {
            breaker: Some("payments".to_string()),
            next_attempt: 1_000,
        };
        assert_eq!(named.to_string(), "Circuit payments is open, next attempt at 1000");

        let anonymous = CircuitOpenError {
            breaker: None,
            next_attempt: 7,
        };
        assert_eq!(anonymous.to_string(), "Circuit breaker is open, next attempt at 7");
    }

    #[test]
    fn test_operation_error_is_unchanged() {
        let err: BreakerError<std::io::Error> =
            BreakerError::Operation(std::io::Error::new(std::io::ErrorKind::Other, "boom"));

        assert!(!err.is_open());
        assert_eq!(err.to_string(), "boom");
        let inner = err.into_operation().unwrap();
        assert_eq!(inner.kind(), std::io::ErrorKind::Other);
    }
}
