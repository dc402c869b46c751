//! Cancellable suspension.

use std::time::Duration;

use delve_core::PollingError;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;

/// Wait for `duration` unless `token` fires first.
///
/// An already-cancelled token fails without starting a timer. When the token
/// fires mid-wait the sleep future is dropped, which releases its timer.
pub async fn cancellable_delay(
    clock: &dyn Clock,
    duration: Duration,
    token: Option<&CancellationToken>,
) -> Result<(), PollingError> {
    let Some(token) = token else {
        clock.sleep(duration).await;
        return Ok(());
    };

    if token.is_cancelled() {
        return Err(PollingError::cancelled());
    }

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(PollingError::cancelled()),
        _ = clock.sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, TokioClock};
    use delve_core::ErrorCode;
    use tokio::time::Instant;

    #[tokio::test]
    async fn pre_cancelled_token_never_sleeps() {
        let clock = ManualClock::new();
        let token = CancellationToken::new();
        token.cancel();

        let err = cancellable_delay(&clock, Duration::from_secs(5), Some(&token))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::Cancelled);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn completes_when_not_cancelled() {
        let clock = ManualClock::new();
        let token = CancellationToken::new();

        cancellable_delay(&clock, Duration::from_secs(5), Some(&token))
            .await
            .unwrap();

        assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn sleeps_without_token() {
        let clock = ManualClock::new();
        cancellable_delay(&clock, Duration::from_millis(1_000), None)
            .await
            .unwrap();
        assert_eq!(clock.elapsed(), Duration::from_millis(1_000));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_mid_wait_returns_early() {
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            canceller.cancel();
        });

        let start = Instant::now();
        let err = cancellable_delay(&TokioClock, Duration::from_secs(60), Some(&token))
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        let waited = Instant::now() - start;
        assert!(waited >= Duration::from_secs(2));
        assert!(waited < Duration::from_secs(60));
    }
}
