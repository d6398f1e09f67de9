// ABOUTME: Blocking admission wait on top of the quota ledger.
// ABOUTME: Polls with a floor and a cap, wakes early when held tokens are freed.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::ledger::{QuotaLedger, Reservation};
use crate::clock::Clock;
use crate::error::AdmissionError;

/// Turns the ledger's yes/no answer into a bounded wait.
///
/// Admission is checked atomically per caller but there is no queue: when
/// several callers wait near the limit, whichever rechecks first after
/// capacity frees up wins.
#[derive(Debug, Clone)]
pub struct AdmissionController {
    ledger: Arc<QuotaLedger>,
    clock: Arc<dyn Clock>,
    min_poll: Duration,
    max_poll: Duration,
}

impl AdmissionController {
    /// Create a controller.
    ///
    /// # Arguments
    ///
    /// * `min_poll` - Shortest sleep between rechecks, so a low wait estimate
    ///   cannot turn the loop into a spin.
    /// * `max_poll` - Longest sleep between rechecks.
    pub fn new(
        ledger: Arc<QuotaLedger>,
        clock: Arc<dyn Clock>,
        min_poll: Duration,
        max_poll: Duration,
    ) -> Self {
        Self {
            ledger,
            clock,
            min_poll,
            max_poll: max_poll.max(min_poll),
        }
    }

    pub fn ledger(&self) -> &Arc<QuotaLedger> {
        &self.ledger
    }

    /// Clamp an estimate to what the window can ever hold.
    pub fn admissible_estimate(&self, estimated: u64) -> u64 {
        let ceiling = self.ledger.limits().max_tokens;
        if estimated > ceiling {
            tracing::warn!(
                estimated,
                ceiling,
                "Estimate exceeds token ceiling, waiting for an empty window instead"
            );
            return ceiling;
        }
        estimated
    }

    /// Wait until `estimated` tokens are admitted.
    ///
    /// Returns the reservation holding the tokens, or `Err(Timeout)` if
    /// `deadline` elapses first. Dropping the future while it waits cancels
    /// it; neither path touches the ledger.
    pub async fn await_admission(
        &self,
        estimated: u64,
        deadline: Option<Duration>,
    ) -> Result<Reservation<'_>, AdmissionError> {
        let estimated = self.admissible_estimate(estimated);
        let started = Instant::now();

        let expired = async move {
            match deadline {
                Some(limit) => tokio::time::sleep_until(started + limit).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(expired);

        loop {
            // Register for wakeups before checking so a release in between is not lost.
            let freed = self.ledger.capacity_freed();
            tokio::pin!(freed);
            freed.as_mut().enable();

            let wait = match self.ledger.try_reserve(estimated, self.clock.now_millis()) {
                Ok(reservation) => {
                    tracing::debug!(
                        estimated,
                        waited_ms = started.elapsed().as_millis() as u64,
                        "Admission granted"
                    );
                    return Ok(reservation);
                }
                Err(wait) => wait,
            };

            // The estimate can be early; never sleep less than the floor.
            let pause = wait.clamp(self.min_poll, self.max_poll);
            tracing::debug!(
                estimated,
                estimated_wait_ms = wait.as_millis() as u64,
                pause_ms = pause.as_millis() as u64,
                "Waiting for quota"
            );

            tokio::select! {
                biased;
                () = &mut expired => {
                    return Err(AdmissionError::Timeout {
                        waited: started.elapsed(),
                    });
                }
                () = &mut freed => {}
                () = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Estimated time until `estimated` tokens could be admitted.
    pub fn estimated_wait(&self, estimated: u64) -> Duration {
        let estimated = self.ledger.limits().max_tokens.min(estimated);
        self.ledger
            .time_until_admittable(estimated, self.clock.now_millis())
    }
}
