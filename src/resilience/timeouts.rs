//! Timeout enforcement.
//!
//! # Responsibilities
//! - Bound each handshake read with the handshake deadline
//! - Turn an elapsed deadline into a transport-classified error
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; a dropped future cancels the read cleanly
//! - A deadline applies only to the wrapped operation, so nothing needs to be
//!   cleared once the handshake completes

use std::future::Future;
use std::time::Duration;

use crate::crypto::Act;
use crate::error::GateError;

/// Run `operation` with `deadline`, reporting expiry as a timeout on `act`.
pub async fn with_deadline<F, T>(deadline: Duration, act: Act, operation: F) -> Result<T, GateError>
where
    F: Future<Output = Result<T, GateError>>,
{
    match tokio::time::timeout(deadline, operation).await {
        Ok(result) => result,
        Err(_elapsed) => Err(GateError::Timeout { act }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_deadline_is_timeout() {
        let result: Result<(), GateError> = with_deadline(Duration::from_millis(10), Act::Three, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(GateError::Timeout { act: Act::Three })));
    }

    #[tokio::test]
    async fn passes_through_result() {
        let result = with_deadline(Duration::from_secs(1), Act::One, async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);

        let result: Result<(), _> =
            with_deadline(Duration::from_secs(1), Act::One, async { Err(GateError::Closed) }).await;
        assert!(result.unwrap_err().is_closed());
    }
}
