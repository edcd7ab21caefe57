//! DeadlineWorker - Background service that closes lapsed cycle windows.
//!
//! Cycles advance on wall-clock deadlines, not on user actions:
//! 1. Command handlers record orders and payments while a window is open
//! 2. **DeadlineWorker polls for due cycles and closes their windows** ← This module
//!
//! ## Why a Background Service?
//!
//! - A window must close even if no user ever touches the cycle again
//! - Closing a window fans out to suspensions and group pointers
//! - Survives restarts (due cycles are found again on the next poll)
//!
//! ## Configuration
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `poll_interval` | 30s | How often to check for due cycles |
//! | `batch_size` | 100 | Max cycles to close per poll cycle |
//!
//! ## Durability
//!
//! A poll failure or a single cycle failing to close is logged and
//! retried on the next poll; the loop itself only exits on shutdown.
//! The close handlers are idempotent, so a cycle closed by a racing
//! worker instance is a no-op here.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{debug, warn};

use crate::application::handlers::cycle::{
    CloseCollectingCommand, CloseCollectingHandler, ClosePaymentWindowCommand,
    ClosePaymentWindowHandler,
};
use crate::domain::foundation::{CyclePhase, DomainError, Timestamp};
use crate::ports::CycleStore;

/// Configuration for the DeadlineWorker service.
#[derive(Debug, Clone)]
pub struct DeadlineWorkerConfig {
    /// How often to poll for due cycles.
    pub poll_interval: Duration,

    /// Maximum cycles to close per poll cycle.
    pub batch_size: u32,
}

impl Default for DeadlineWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            batch_size: 100,
        }
    }
}

impl DeadlineWorkerConfig {
    /// Create config with custom poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Create config with custom batch size.
    pub fn with_batch_size(mut self, size: u32) -> Self {
        self.batch_size = size;
        self
    }
}

/// Background service that closes due cycle windows.
///
/// Polls the cycle store for cycles whose deadline has passed and
/// dispatches each to the close handler for its phase: collecting
/// windows advance or cancel, payment windows confirm or cancel.
pub struct DeadlineWorker {
    cycle_store: Arc<dyn CycleStore>,
    close_collecting: CloseCollectingHandler,
    close_payment_window: ClosePaymentWindowHandler,
    config: DeadlineWorkerConfig,
}

impl DeadlineWorker {
    /// Create a new DeadlineWorker with default configuration.
    pub fn new(
        cycle_store: Arc<dyn CycleStore>,
        close_collecting: CloseCollectingHandler,
        close_payment_window: ClosePaymentWindowHandler,
    ) -> Self {
        Self {
            cycle_store,
            close_collecting,
            close_payment_window,
            config: DeadlineWorkerConfig::default(),
        }
    }

    /// Create a new DeadlineWorker with custom configuration.
    pub fn with_config(
        cycle_store: Arc<dyn CycleStore>,
        close_collecting: CloseCollectingHandler,
        close_payment_window: ClosePaymentWindowHandler,
        config: DeadlineWorkerConfig,
    ) -> Self {
        Self {
            cycle_store,
            close_collecting,
            close_payment_window,
            config,
        }
    }

    /// Run the worker loop until shutdown signal is received.
    ///
    /// # Arguments
    ///
    /// * `shutdown` - Watch channel that signals when to stop
    ///
    /// Poll failures are logged and retried on the next tick; the loop
    /// never exits on its own.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.poll_interval);

        loop {
            tokio::select! {
                // Check for shutdown signal
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        // Shutdown requested - process one final batch then exit
                        if let Err(err) = self.process_batch().await {
                            warn!(error = %err, "Final deadline poll failed during shutdown");
                        }
                        return;
                    }
                }

                // Poll interval elapsed
                _ = interval.tick() => {
                    if let Err(err) = self.process_batch().await {
                        warn!(error = %err, "Deadline poll failed");
                    }
                }
            }
        }
    }

    /// Process a single batch of due cycles.
    ///
    /// Returns how many cycles were closed. One cycle failing to close
    /// does not stop the rest of the batch.
    ///
    /// This method is also useful for testing without running the full loop.
    pub async fn process_batch(&self) -> Result<usize, DomainError> {
        let now = Timestamp::now();
        let due = self.cycle_store.list_due(now, self.config.batch_size).await?;
        let mut closed_count = 0;

        for cycle in due {
            let cycle_id = cycle.id();
            match cycle.phase() {
                CyclePhase::Collecting => {
                    match self
                        .close_collecting
                        .handle(CloseCollectingCommand { cycle_id })
                        .await
                    {
                        Ok(result) => {
                            debug!(
                                cycle_id = %cycle_id,
                                phase = %result.cycle.phase(),
                                "Closed collecting window"
                            );
                            closed_count += 1;
                        }
                        Err(err) => {
                            // Retried on the next poll
                            warn!(
                                cycle_id = %cycle_id,
                                error = %err,
                                "Failed to close collecting window"
                            );
                        }
                    }
                }
                CyclePhase::PaymentWindow => {
                    match self
                        .close_payment_window
                        .handle(ClosePaymentWindowCommand { cycle_id })
                        .await
                    {
                        Ok(result) => {
                            debug!(
                                cycle_id = %cycle_id,
                                phase = %result.cycle.phase(),
                                suspended = result.suspended.len(),
                                "Closed payment window"
                            );
                            closed_count += 1;
                        }
                        Err(err) => {
                            // Retried on the next poll
                            warn!(
                                cycle_id = %cycle_id,
                                error = %err,
                                "Failed to close payment window"
                            );
                        }
                    }
                }
                // Only open phases carry deadlines; anything else in the
                // batch is a stale snapshot another worker already closed.
                _ => {}
            }
        }

        Ok(closed_count)
    }

    /// Run exactly one poll cycle (for testing).
    pub async fn poll_once(&self) -> Result<usize, DomainError> {
        self.process_batch().await
    }
}
