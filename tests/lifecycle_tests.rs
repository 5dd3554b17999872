use chrono::{Duration, Utc};
use mongodb::bson::oid::ObjectId;

use learnsphere_api::models::subscription::{
    BillingCycle, PlanType, Subscription, SubscriptionStatus,
};

fn subscription(status: SubscriptionStatus) -> Subscription {
    let now = Utc::now();
    Subscription {
        id: Some(ObjectId::new()),
        user_id: ObjectId::new(),
        plan_type: PlanType::AllAccess,
        billing_cycle: BillingCycle::Yearly,
        children_count: 2,
        selected_subject: None,
        amount_paid: 278.4,
        payment_reference: "ref_lifecycle_1".to_string(),
        status,
        start_date: now,
        end_date: now + Duration::days(365),
        trial_end_date: (status == SubscriptionStatus::Trial).then(|| now + Duration::days(7)),
        auto_renew: true,
        card_last_four: Some("4242".to_string()),
        created_at: now,
        updated_at: now,
    }
}

#[test]
fn trial_converts_to_active_exactly_once() {
    // First evaluation: a running trial with auto-renew converts.
    assert_eq!(
        SubscriptionStatus::Trial.trial_end_transition(true),
        Some(SubscriptionStatus::Active)
    );

    // Duplicate delivery: the subscription already moved to active, so
    // the re-read status makes the second firing a no-op.
    assert_eq!(SubscriptionStatus::Active.trial_end_transition(true), None);
}

#[test]
fn cancelled_trials_are_never_resurrected_by_the_sweep() {
    // A cancel during the trial clears auto_renew...
    assert_eq!(SubscriptionStatus::Trial.trial_end_transition(false), None);
    // ...and a cancel that already landed keeps the terminal state.
    assert_eq!(SubscriptionStatus::Cancelled.trial_end_transition(true), None);
    assert!(SubscriptionStatus::Cancelled.is_terminal());
}

#[test]
fn cancelled_is_the_only_terminal_state() {
    // Cancel is reachable from every state (the service writes it
    // unconditionally and treats an already-cancelled row as a no-op
    // success); nothing transitions out of it.
    for status in [
        SubscriptionStatus::Trial,
        SubscriptionStatus::Active,
        SubscriptionStatus::Upcoming,
        SubscriptionStatus::Frozen,
        SubscriptionStatus::Cancelled,
    ] {
        assert_eq!(status.is_terminal(), status == SubscriptionStatus::Cancelled);
        assert_eq!(SubscriptionStatus::Cancelled.trial_end_transition(true), None);
    }
}

#[test]
fn freeze_toggle_covers_only_the_admin_pair() {
    assert_eq!(
        SubscriptionStatus::Active.freeze_toggle(),
        Some(SubscriptionStatus::Frozen)
    );
    assert_eq!(
        SubscriptionStatus::Frozen.freeze_toggle(),
        Some(SubscriptionStatus::Active)
    );

    // Freezing a trial, upcoming, or cancelled subscription changes
    // nothing.
    for status in [
        SubscriptionStatus::Trial,
        SubscriptionStatus::Upcoming,
        SubscriptionStatus::Cancelled,
    ] {
        assert_eq!(status.freeze_toggle(), None);
    }
}

#[test]
fn upcoming_subscriptions_promote_to_active() {
    assert_eq!(
        SubscriptionStatus::Upcoming.upcoming_start_transition(),
        Some(SubscriptionStatus::Active)
    );
    for status in [
        SubscriptionStatus::Trial,
        SubscriptionStatus::Active,
        SubscriptionStatus::Frozen,
        SubscriptionStatus::Cancelled,
    ] {
        assert_eq!(status.upcoming_start_transition(), None);
    }
}

#[test]
fn trial_records_satisfy_the_trial_end_date_invariant() {
    let trial = subscription(SubscriptionStatus::Trial);
    assert!(trial.check_invariants().is_ok());
    assert!(trial.trial_end_date.is_some());

    // The trial→active update unsets trial_end_date; the invariant holds
    // on both sides of the transition.
    let mut active = subscription(SubscriptionStatus::Active);
    assert!(active.check_invariants().is_ok());
    active.trial_end_date = Some(Utc::now());
    assert!(active.check_invariants().is_err());
}

#[test]
fn trial_window_is_seven_days_from_signup() {
    let trial = subscription(SubscriptionStatus::Trial);
    let window = trial.trial_end_date.unwrap() - trial.created_at;
    assert_eq!(window.num_days(), 7);
    assert!(trial.end_date >= trial.start_date);
}
