use learnsphere_api::error::ApiError;
use learnsphere_api::models::pricing::{
    bake_yearly_price, final_price, PlanPricing, PricingTable, QuoteQuery,
};
use learnsphere_api::models::subscription::{BillingCycle, PlanType};
use learnsphere_api::services::pricing_service::quote_from_table;

fn single_plan_table() -> PricingTable {
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
fn one_learner_always_pays_the_base_price() {
    for discount in [0.0, 1.0, 3.0, 11.0] {
        assert_eq!(final_price(11.0, 1, discount), 11.0);
    }
}

#[test]
fn single_plan_three_learners_scenario() {
    // 11.00 + (11.00 - 3.00) * 2 = 27.00
    let quote = quote_from_table(
        &single_plan_table(),
        &QuoteQuery {
            plan_type: PlanType::Single,
            billing_cycle: BillingCycle::Monthly,
            children_count: 3,
        },
    )
    .unwrap();
    assert_eq!(quote.total, 27.0);
}

#[test]
fn totals_increase_strictly_with_learner_count() {
    let base = 11.0;
    let discount = 3.0;
    let mut previous = final_price(base, 1, discount);
    for count in 2..20 {
        let current = final_price(base, count, discount);
        assert!(current > previous);
        previous = current;
    }
}

#[test]
fn yearly_percentage_and_flat_discount_stay_independent() {
    let table = single_plan_table();
    let plan = table.plan(PlanType::Single).unwrap();

    // The yearly rate is baked once from the percentage...
    assert!((plan.yearly_price - 11.0 * 12.0 * 0.8).abs() < 1e-9);

    // ...and the flat per-learner subtraction applies on top of it.
    let quote = quote_from_table(
        &table,
        &QuoteQuery {
            plan_type: PlanType::Single,
            billing_cycle: BillingCycle::Yearly,
            children_count: 2,
        },
    )
    .unwrap();
    assert!((quote.total - (plan.yearly_price * 2.0 - 3.0)).abs() < 1e-9);
}

#[test]
fn malformed_tables_are_fatal_for_quoting() {
    let mut table = single_plan_table();
    table.plans[0].additional_learner_discount = 100.0;
    assert!(table.validate().is_err());

    // A plan missing from the table is a configuration error, not a
    // silent fallback.
    let err = quote_from_table(
        &single_plan_table(),
        &QuoteQuery {
            plan_type: PlanType::AllAccess,
            billing_cycle: BillingCycle::Monthly,
            children_count: 1,
        },
    )
    .unwrap_err();
    assert!(matches!(err, ApiError::InvalidPricingConfiguration(_)));
}
