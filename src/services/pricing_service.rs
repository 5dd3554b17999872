use anyhow::Context;
use chrono::Utc;
use mongodb::{
    bson::{doc, from_document, to_document},
    Database,
};
use std::sync::{Arc, RwLock};

use crate::error::ApiError;
use crate::models::pricing::{
    final_price, PricingTable, QuoteQuery, QuoteResponse, PRICING_SETTINGS_KEY,
};
use crate::models::system_settings::SystemSetting;

/// Process-wide snapshot of the parsed pricing table. Loaded once at
/// startup and replaced wholesale on admin update or explicit reload;
/// request handlers only ever clone the Arc.
#[derive(Default)]
pub struct PricingCache {
    inner: RwLock<Option<Arc<PricingTable>>>,
}

impl PricingCache {
    pub fn snapshot(&self) -> Option<Arc<PricingTable>> {
        self.inner.read().expect("pricing cache lock poisoned").clone()
    }

    fn replace(&self, table: PricingTable) {
        *self.inner.write().expect("pricing cache lock poisoned") = Some(Arc::new(table));
    }
}

pub struct PricingService {
    mongo: Database,
}

impl PricingService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Reads and validates the `default_pricing` blob. `Ok(None)` means
    /// no pricing has been configured yet; a present-but-malformed blob
    /// is an error, never silently ignored.
    pub async fn load(&self) -> Result<Option<PricingTable>, ApiError> {
        let collection = self.mongo.collection::<SystemSetting>("system_settings");
        let setting = collection
            .find_one(doc! { "key": PRICING_SETTINGS_KEY })
            .await
            .context("Failed to query pricing settings")?;

        let Some(setting) = setting else {
            return Ok(None);
        };

        let table: PricingTable = from_document(setting.value)
            .map_err(|e| ApiError::InvalidPricingConfiguration(e.to_string()))?;
        table
            .validate()
            .map_err(ApiError::InvalidPricingConfiguration)?;

        Ok(Some(table))
    }

    /// Re-reads the blob and swaps the cache snapshot.
    pub async fn reload_into(&self, cache: &PricingCache) -> Result<PricingTable, ApiError> {
        let table = self.load().await?.ok_or_else(|| {
            ApiError::InvalidPricingConfiguration("no pricing configured".to_string())
        })?;
        cache.replace(table.clone());
        Ok(table)
    }

    /// Validates, persists, and publishes a new pricing table.
    pub async fn update(
        &self,
        table: PricingTable,
        updated_by: &str,
        cache: &PricingCache,
    ) -> Result<PricingTable, ApiError> {
        table
            .validate()
            .map_err(ApiError::InvalidPricingConfiguration)?;

        let collection = self.mongo.collection::<SystemSetting>("system_settings");
        let value_doc = to_document(&table).context("Failed to serialize pricing table")?;
        let now = mongodb::bson::DateTime::from_millis(Utc::now().timestamp_millis());

        collection
            .update_one(
                doc! { "key": PRICING_SETTINGS_KEY },
                doc! {
                    "$set": {
                        "key": PRICING_SETTINGS_KEY,
                        "category": "billing",
                        "value": value_doc,
                        "updatedBy": updated_by,
                        "updatedAt": now,
                    }
                },
            )
            .upsert(true)
            .await
            .context("Failed to upsert pricing settings")?;

        cache.replace(table.clone());
        tracing::info!(updated_by, plans = table.plans.len(), "Pricing table updated");

        Ok(table)
    }
}

/// Computes a quote from the cached snapshot. The flat per-learner
/// discount is the only adjustment applied here; the yearly percentage is
/// already baked into the stored yearly price.
pub fn quote_from_table(table: &PricingTable, query: &QuoteQuery) -> Result<QuoteResponse, ApiError> {
    if query.children_count < 1 {
        return Err(ApiError::bad_request("children_count must be at least 1"));
    }

    let plan = table.plan(query.plan_type).ok_or_else(|| {
        ApiError::InvalidPricingConfiguration(format!(
            "no pricing entry for plan {}",
            query.plan_type.as_str()
        ))
    })?;

    let base_price = plan.base_price(query.billing_cycle);
    let total = final_price(base_price, query.children_count, plan.additional_learner_discount);

    Ok(QuoteResponse {
        plan_type: query.plan_type,
        billing_cycle: query.billing_cycle,
        children_count: query.children_count,
        base_price,
        additional_learner_discount: plan.additional_learner_discount,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::pricing::{bake_yearly_price, PlanPricing};
    use crate::models::subscription::{BillingCycle, PlanType};

    fn table() -> PricingTable {
        PricingTable {
            plans: vec![PlanPricing {
                plan_type: PlanType::Single,
                monthly_price: 11.0,
                yearly_price: bake_yearly_price(11.0, 20.0),
                yearly_discount_percent: 20.0,
                additional_learner_discount: 3.0,
            }],
        }
    }

    #[test]
    fn quote_applies_the_flat_learner_discount() {
        let quote = quote_from_table(
            &table(),
            &QuoteQuery {
                plan_type: PlanType::Single,
                billing_cycle: BillingCycle::Monthly,
                children_count: 3,
            },
        )
        .unwrap();

        assert_eq!(quote.base_price, 11.0);
        assert_eq!(quote.total, 27.0);
    }

    #[test]
    fn quote_uses_the_baked_yearly_price() {
        let quote = quote_from_table(
            &table(),
            &QuoteQuery {
                plan_type: PlanType::Single,
                billing_cycle: BillingCycle::Yearly,
                children_count: 1,
            },
        )
        .unwrap();

        assert!((quote.total - 105.6).abs() < 1e-9);
    }

    #[test]
    fn quote_rejects_zero_learners_and_unknown_plans() {
        let err = quote_from_table(
            &table(),
            &QuoteQuery {
                plan_type: PlanType::Single,
                billing_cycle: BillingCycle::Monthly,
                children_count: 0,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = quote_from_table(
            &table(),
            &QuoteQuery {
                plan_type: PlanType::Combo,
                billing_cycle: BillingCycle::Monthly,
                children_count: 1,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::InvalidPricingConfiguration(_)));
    }

    #[test]
    fn cache_snapshot_swaps_atomically() {
        let cache = PricingCache::default();
        assert!(cache.snapshot().is_none());

        cache.replace(table());
        let snapshot = cache.snapshot().unwrap();
        assert_eq!(snapshot.plans.len(), 1);
    }
}
