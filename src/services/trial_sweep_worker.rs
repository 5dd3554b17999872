use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::ApiError;
use crate::metrics::TRIAL_SWEEP_TICKS_TOTAL;
use crate::services::payment::PaymentGateway;
use crate::services::subscription_service::SubscriptionService;

const SWEEP_BATCH_SIZE: i64 = 100;

/// Periodic sweep that applies due lifecycle transitions. The schedule is
/// durable: due-ness lives on the subscription rows themselves
/// (`trialEndDate`, `startDate`), so a restart never drops a pending
/// transition, and the conditional updates in the service make duplicate
/// evaluation harmless.
pub struct TrialSweepWorker {
    subscription_service: SubscriptionService,
    gateway: Box<dyn PaymentGateway>,
    config: Config,
}

impl TrialSweepWorker {
    pub fn new(
        subscription_service: SubscriptionService,
        gateway: Box<dyn PaymentGateway>,
        config: Config,
    ) -> Self {
        Self {
            subscription_service,
            gateway,
            config,
        }
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let interval = Duration::from_secs(self.config.trial_sweep_interval_secs);
        info!(
            "Starting trial sweep worker loop (interval {}s)",
            interval.as_secs()
        );

        loop {
            match self.run_once().await {
                Ok((activated, promoted)) => {
                    TRIAL_SWEEP_TICKS_TOTAL
                        .with_label_values(&["success"])
                        .inc();
                    if activated > 0 || promoted > 0 {
                        info!(activated, promoted, "Trial sweep tick completed");
                    }
                }
                Err(err) => {
                    TRIAL_SWEEP_TICKS_TOTAL.with_label_values(&["error"]).inc();
                    warn!(error = %err, "Trial sweep tick failed");
                }
            }

            sleep(interval).await;
        }
    }

    /// One pass: convert due trials, then promote due upcoming
    /// subscriptions. Per-subscription failures are logged and skipped so
    /// one bad row never starves the rest of the batch.
    pub async fn run_once(&self) -> Result<(u64, u64), ApiError> {
        let due = self
            .subscription_service
            .find_due_trials(SWEEP_BATCH_SIZE)
            .await?;

        let mut activated = 0u64;
        for subscription in &due {
            match self
                .subscription_service
                .evaluate_trial_end(subscription, self.gateway.as_ref())
                .await
            {
                Ok(true) => activated += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(
                        subscription_id = ?subscription.id.map(|id| id.to_hex()),
                        error = %err,
                        "Trial-end evaluation failed"
                    );
                }
            }
        }

        let promoted = self.subscription_service.promote_due_upcoming().await?;

        Ok((activated, promoted))
    }
}
