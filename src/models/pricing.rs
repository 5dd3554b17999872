use serde::{Deserialize, Serialize};

use super::subscription::{BillingCycle, PlanType};

/// Key of the pricing blob in the "system_settings" collection.
pub const PRICING_SETTINGS_KEY: &str = "default_pricing";

/// Per-plan pricing record. Two independently configured discounts:
/// the yearly percentage is baked into `yearly_price` when the plan is
/// saved, while the flat per-learner amount is applied at quote time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanPricing {
    pub plan_type: PlanType,
    pub monthly_price: f64,
    pub yearly_price: f64,
    pub yearly_discount_percent: f64,
    pub additional_learner_discount: f64,
}

impl PlanPricing {
    pub fn base_price(&self, cycle: BillingCycle) -> f64 {
        match cycle {
            BillingCycle::Monthly => self.monthly_price,
            BillingCycle::Yearly => self.yearly_price,
        }
    }
}

/// Parsed shape of the `default_pricing` settings blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingTable {
    pub plans: Vec<PlanPricing>,
}

impl PricingTable {
    /// Shape validation applied on every load and update. A blob that
    /// fails here is unusable; no fallback price is invented.
    pub fn validate(&self) -> Result<(), String> {
        if self.plans.is_empty() {
            return Err("pricing table has no plans".to_string());
        }
        for plan in &self.plans {
            let name = plan.plan_type.as_str();
            if self
                .plans
                .iter()
                .filter(|other| other.plan_type == plan.plan_type)
                .count()
                > 1
            {
                return Err(format!("duplicate pricing entry for plan {}", name));
            }
            if plan.monthly_price < 0.0 || plan.yearly_price < 0.0 {
                return Err(format!("plan {} has a negative base price", name));
            }
            if !(0.0..=100.0).contains(&plan.yearly_discount_percent) {
                return Err(format!("plan {} yearly discount out of range", name));
            }
            if plan.additional_learner_discount < 0.0 {
                return Err(format!("plan {} has a negative learner discount", name));
            }
            if plan.additional_learner_discount > plan.monthly_price
                || plan.additional_learner_discount > plan.yearly_price
            {
                return Err(format!(
                    "plan {} learner discount exceeds its base price",
                    name
                ));
            }
        }
        Ok(())
    }

    pub fn plan(&self, plan_type: PlanType) -> Option<&PlanPricing> {
        self.plans.iter().find(|plan| plan.plan_type == plan_type)
    }
}

/// Final payable amount for one billing cycle: the first learner pays the
/// base price, each additional learner pays the base price minus the flat
/// discount.
pub fn final_price(base_price: f64, learner_count: u32, additional_learner_discount: f64) -> f64 {
    if learner_count <= 1 {
        return base_price;
    }
    let per_additional = base_price - additional_learner_discount;
    base_price + per_additional * f64::from(learner_count - 1)
}

/// Derives the stored yearly price from the monthly price and the
/// percentage discount (applied to twelve monthly cycles).
pub fn bake_yearly_price(monthly_price: f64, yearly_discount_percent: f64) -> f64 {
    monthly_price * 12.0 * (1.0 - yearly_discount_percent / 100.0)
}

/// Admin payload for PUT /admin/settings/pricing. The yearly price is
/// derived server-side, never submitted.
#[derive(Debug, Deserialize)]
pub struct PricingUpdateRequest {
    pub plans: Vec<PlanPricingInput>,
}

#[derive(Debug, Deserialize)]
pub struct PlanPricingInput {
    pub plan_type: PlanType,
    pub monthly_price: f64,
    pub yearly_discount_percent: f64,
    pub additional_learner_discount: f64,
}

impl PricingUpdateRequest {
    pub fn into_table(self) -> PricingTable {
        PricingTable {
            plans: self
                .plans
                .into_iter()
                .map(|input| PlanPricing {
                    plan_type: input.plan_type,
                    yearly_price: bake_yearly_price(
                        input.monthly_price,
                        input.yearly_discount_percent,
                    ),
                    monthly_price: input.monthly_price,
                    yearly_discount_percent: input.yearly_discount_percent,
                    additional_learner_discount: input.additional_learner_discount,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct QuoteQuery {
    pub plan_type: PlanType,
    pub billing_cycle: BillingCycle,
    pub children_count: u32,
}

#[derive(Debug, Serialize)]
pub struct QuoteResponse {
    pub plan_type: PlanType,
    pub billing_cycle: BillingCycle,
    pub children_count: u32,
    pub base_price: f64,
    pub additional_learner_discount: f64,
    pub total: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PricingTable {
        PricingTable {
            plans: vec![
                PlanPricing {
                    plan_type: PlanType::Single,
                    monthly_price: 11.0,
                    yearly_price: bake_yearly_price(11.0, 20.0),
                    yearly_discount_percent: 20.0,
                    additional_learner_discount: 3.0,
                },
                PlanPricing {
                    plan_type: PlanType::AllAccess,
                    monthly_price: 29.0,
                    yearly_price: bake_yearly_price(29.0, 25.0),
                    yearly_discount_percent: 25.0,
                    additional_learner_discount: 5.0,
                },
            ],
        }
    }

    #[test]
    fn single_learner_pays_the_base_price() {
        assert_eq!(final_price(11.0, 1, 3.0), 11.0);
        assert_eq!(final_price(11.0, 0, 100.0), 11.0);
    }

    #[test]
    fn additional_learners_pay_the_discounted_rate() {
        // 11.00 + (11.00 - 3.00) * 2 = 27.00
        assert_eq!(final_price(11.0, 3, 3.0), 27.0);
    }

    #[test]
    fn price_is_strictly_increasing_in_learner_count() {
        let mut previous = final_price(11.0, 1, 3.0);
        for count in 2..10 {
            let current = final_price(11.0, count, 3.0);
            assert!(current > previous, "count {} did not increase total", count);
            previous = current;
        }
    }

    #[test]
    fn yearly_price_bakes_the_percentage_discount() {
        let yearly = bake_yearly_price(10.0, 25.0);
        assert!((yearly - 90.0).abs() < f64::EPSILON);
    }

    #[test]
    fn valid_table_passes_validation() {
        assert!(table().validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_shapes() {
        let empty = PricingTable { plans: vec![] };
        assert!(empty.validate().is_err());

        let mut duplicated = table();
        duplicated.plans.push(duplicated.plans[0].clone());
        assert!(duplicated.validate().is_err());

        let mut oversized_discount = table();
        oversized_discount.plans[0].additional_learner_discount = 50.0;
        assert!(oversized_discount.validate().is_err());

        let mut negative = table();
        negative.plans[0].monthly_price = -1.0;
        assert!(negative.validate().is_err());
    }

    #[test]
    fn plan_lookup_by_type() {
        let table = table();
        assert!(table.plan(PlanType::Single).is_some());
        assert!(table.plan(PlanType::Combo).is_none());
    }
}
