use async_trait::async_trait;

/// Outcome of a charge attempt against the gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// The gateway accepted the charge.
    Charged { reference: String },
    /// No charge was attempted; the subscription proceeds unbilled.
    Skipped,
}

/// Seam to the card gateway. The authorization charge happens client-side
/// during signup; the server-side hook here is invoked when a trial
/// converts to active.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Charge the card saved during signup. Implementations may decline
    /// by returning an error; `Skipped` means billing is deferred.
    async fn charge_saved_card(
        &self,
        payment_reference: &str,
        amount: f64,
    ) -> anyhow::Result<ChargeOutcome>;
}

/// Default gateway: records the intent and charges nothing. Swapping in a
/// real gateway client is the supported extension point.
pub struct RecordOnlyGateway;

#[async_trait]
impl PaymentGateway for RecordOnlyGateway {
    async fn charge_saved_card(
        &self,
        payment_reference: &str,
        amount: f64,
    ) -> anyhow::Result<ChargeOutcome> {
        tracing::info!(
            reference = %payment_reference,
            amount,
            "Charge intent recorded; no gateway charge executed"
        );
        Ok(ChargeOutcome::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_only_gateway_never_charges() {
        let gateway = RecordOnlyGateway;
        let outcome = gateway
            .charge_saved_card("ref_123456", 27.0)
            .await
            .unwrap();
        assert_eq!(outcome, ChargeOutcome::Skipped);
    }
}
