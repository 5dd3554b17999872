use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use mongodb::bson::oid::ObjectId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::user::{bson_datetime_as_chrono, bson_datetime_as_chrono_option};

lazy_static! {
    static ref PAYMENT_REFERENCE_REGEX: Regex = Regex::new(r"^[A-Za-z0-9_-]{6,64}$").unwrap();
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PlanType {
    AllAccess,
    Combo,
    Single,
}

impl PlanType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanType::AllAccess => "all_access",
            PlanType::Combo => "combo",
            PlanType::Single => "single",
        }
    }
}

impl std::str::FromStr for PlanType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "all_access" => Ok(PlanType::AllAccess),
            "combo" => Ok(PlanType::Combo),
            "single" => Ok(PlanType::Single),
            _ => Err(format!("Invalid plan type: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingCycle {
    Monthly,
    Yearly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
        }
    }
}

impl std::str::FromStr for BillingCycle {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "monthly" => Ok(BillingCycle::Monthly),
            "yearly" => Ok(BillingCycle::Yearly),
            _ => Err(format!("Invalid billing cycle: {}", value)),
        }
    }
}

/// Subscription lifecycle states. `cancelled` is terminal; every other
/// transition goes through the decision helpers below so that the
/// persistence layer can issue a conditional update keyed on the prior
/// status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Trial,
    Active,
    Upcoming,
    Frozen,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Upcoming => "upcoming",
            SubscriptionStatus::Frozen => "frozen",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }

    /// Outcome of the trial-end evaluation. Only a still-running trial
    /// with auto-renew left on converts; any other state means a cancel
    /// (or an earlier firing) got there first and the evaluation is a
    /// no-op.
    pub fn trial_end_transition(self, auto_renew: bool) -> Option<SubscriptionStatus> {
        match (self, auto_renew) {
            (SubscriptionStatus::Trial, true) => Some(SubscriptionStatus::Active),
            _ => None,
        }
    }

    /// Admin freeze/unfreeze flip. Restricted to the active ⇄ frozen
    /// pair; a trial or cancelled subscription is left untouched.
    pub fn freeze_toggle(self) -> Option<SubscriptionStatus> {
        match self {
            SubscriptionStatus::Active => Some(SubscriptionStatus::Frozen),
            SubscriptionStatus::Frozen => Some(SubscriptionStatus::Active),
            _ => None,
        }
    }

    /// An upcoming subscription becomes active once its start date
    /// arrives (applied by the sweep worker).
    pub fn upcoming_start_transition(self) -> Option<SubscriptionStatus> {
        match self {
            SubscriptionStatus::Upcoming => Some(SubscriptionStatus::Active),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SubscriptionStatus::Cancelled)
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "trial" => Ok(SubscriptionStatus::Trial),
            "active" => Ok(SubscriptionStatus::Active),
            "upcoming" => Ok(SubscriptionStatus::Upcoming),
            "frozen" => Ok(SubscriptionStatus::Frozen),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            _ => Err(format!("Invalid subscription status: {}", value)),
        }
    }
}

/// Subscription stored in MongoDB "subscriptions" collection. A user may
/// accumulate several over time; at most one is current (non-cancelled).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    #[serde(rename = "userId")]
    pub user_id: ObjectId,

    pub plan_type: PlanType,
    pub billing_cycle: BillingCycle,
    pub children_count: u32,

    /// Required iff plan_type is `single`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_subject: Option<String>,

    pub amount_paid: f64,

    /// Gateway reference of the authorization charge; unique per payment.
    pub payment_reference: String,

    pub status: SubscriptionStatus,

    #[serde(rename = "startDate", with = "bson_datetime_as_chrono")]
    pub start_date: DateTime<Utc>,

    #[serde(rename = "endDate", with = "bson_datetime_as_chrono")]
    pub end_date: DateTime<Utc>,

    /// Present iff status is `trial`; unset by the trial→active update.
    #[serde(
        rename = "trialEndDate",
        default,
        skip_serializing_if = "Option::is_none",
        with = "bson_datetime_as_chrono_option"
    )]
    pub trial_end_date: Option<DateTime<Utc>>,

    pub auto_renew: bool,

    /// Opaque, display only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_last_four: Option<String>,

    #[serde(rename = "createdAt", with = "bson_datetime_as_chrono")]
    pub created_at: DateTime<Utc>,

    #[serde(rename = "updatedAt", with = "bson_datetime_as_chrono")]
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Record-level invariants: trial_end_date accompanies the trial
    /// state only, and the billing window is non-degenerate.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.end_date < self.start_date {
            return Err("end_date must not precede start_date".to_string());
        }
        match (self.status, self.trial_end_date.is_some()) {
            (SubscriptionStatus::Trial, false) => {
                Err("trial subscription is missing trial_end_date".to_string())
            }
            (status, true) if status != SubscriptionStatus::Trial => {
                Err(format!("{} subscription carries trial_end_date", status.as_str()))
            }
            _ => Ok(()),
        }
    }
}

/// View of a subscription returned to clients.
#[derive(Debug, Serialize)]
pub struct SubscriptionView {
    pub id: String,
    pub plan_type: PlanType,
    pub billing_cycle: BillingCycle,
    pub children_count: u32,
    pub selected_subject: Option<String>,
    pub amount_paid: f64,
    pub status: SubscriptionStatus,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub trial_end_date: Option<DateTime<Utc>>,
    pub auto_renew: bool,
    pub card_last_four: Option<String>,
}

impl From<Subscription> for SubscriptionView {
    fn from(sub: Subscription) -> Self {
        SubscriptionView {
            id: sub.id.map(|id| id.to_hex()).unwrap_or_default(),
            plan_type: sub.plan_type,
            billing_cycle: sub.billing_cycle,
            children_count: sub.children_count,
            selected_subject: sub.selected_subject,
            amount_paid: sub.amount_paid,
            status: sub.status,
            start_date: sub.start_date,
            end_date: sub.end_date,
            trial_end_date: sub.trial_end_date,
            auto_renew: sub.auto_renew,
            card_last_four: sub.card_last_four,
        }
    }
}

/// Request to start a trial subscription. The payment reference comes
/// back from the gateway's client-side authorization flow.
#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = validate_trial_request))]
pub struct StartTrialRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(
        min = 3,
        max = 50,
        message = "Username must be between 3 and 50 characters"
    ))]
    pub username: String,

    pub plan_type: PlanType,
    pub billing_cycle: BillingCycle,

    #[validate(range(min = 1, message = "At least one learner is required"))]
    pub children_count: u32,

    pub selected_subject: Option<String>,

    #[validate(regex(
        path = *PAYMENT_REFERENCE_REGEX,
        message = "Invalid payment reference"
    ))]
    pub reference: String,

    #[validate(length(equal = 4, message = "card_last_four must be 4 digits"))]
    pub card_last_four: Option<String>,
}

fn validate_trial_request(req: &StartTrialRequest) -> Result<(), ValidationError> {
    if req.plan_type == PlanType::Single
        && req
            .selected_subject
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .is_empty()
    {
        return Err(ValidationError::new("selected_subject_required")
            .with_message("single plans require a selected subject".into()));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct StartTrialResponse {
    pub user_id: String,
    pub subscription_id: String,
    pub trial_end_date: DateTime<Utc>,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct SubscriptionStatusResponse {
    pub id: String,
    pub status: SubscriptionStatus,
}

/// Query params for the admin subscription listing
#[derive(Debug, Deserialize)]
pub struct ListSubscriptionsQuery {
    pub status: Option<String>,
    pub plan_type: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(status: SubscriptionStatus) -> Subscription {
        let now = Utc::now();
        Subscription {
            id: Some(ObjectId::new()),
            user_id: ObjectId::new(),
            plan_type: PlanType::Combo,
            billing_cycle: BillingCycle::Monthly,
            children_count: 2,
            selected_subject: None,
            amount_paid: 19.0,
            payment_reference: "ref_000001".to_string(),
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
    fn trial_end_converts_only_running_trials() {
        assert_eq!(
            SubscriptionStatus::Trial.trial_end_transition(true),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(SubscriptionStatus::Trial.trial_end_transition(false), None);
        assert_eq!(SubscriptionStatus::Active.trial_end_transition(true), None);
        assert_eq!(SubscriptionStatus::Cancelled.trial_end_transition(true), None);
        assert_eq!(SubscriptionStatus::Frozen.trial_end_transition(true), None);
    }

    #[test]
    fn freeze_toggle_restricted_to_active_frozen_pair() {
        assert_eq!(
            SubscriptionStatus::Active.freeze_toggle(),
            Some(SubscriptionStatus::Frozen)
        );
        assert_eq!(
            SubscriptionStatus::Frozen.freeze_toggle(),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(SubscriptionStatus::Trial.freeze_toggle(), None);
        assert_eq!(SubscriptionStatus::Cancelled.freeze_toggle(), None);
        assert_eq!(SubscriptionStatus::Upcoming.freeze_toggle(), None);
    }

    #[test]
    fn upcoming_promotes_to_active() {
        assert_eq!(
            SubscriptionStatus::Upcoming.upcoming_start_transition(),
            Some(SubscriptionStatus::Active)
        );
        assert_eq!(SubscriptionStatus::Trial.upcoming_start_transition(), None);
    }

    #[test]
    fn invariants_tie_trial_end_date_to_trial_state() {
        assert!(subscription(SubscriptionStatus::Trial).check_invariants().is_ok());
        assert!(subscription(SubscriptionStatus::Active).check_invariants().is_ok());

        let mut bad = subscription(SubscriptionStatus::Active);
        bad.trial_end_date = Some(Utc::now());
        assert!(bad.check_invariants().is_err());

        let mut bad = subscription(SubscriptionStatus::Trial);
        bad.trial_end_date = None;
        assert!(bad.check_invariants().is_err());

        let mut bad = subscription(SubscriptionStatus::Active);
        bad.end_date = bad.start_date - Duration::days(1);
        assert!(bad.check_invariants().is_err());
    }

    #[test]
    fn trial_request_requires_subject_for_single_plans() {
        let mut req = StartTrialRequest {
            email: "parent@example.com".to_string(),
            username: "parent42".to_string(),
            plan_type: PlanType::Single,
            billing_cycle: BillingCycle::Monthly,
            children_count: 1,
            selected_subject: None,
            reference: "ref_abc123".to_string(),
            card_last_four: Some("4242".to_string()),
        };
        assert!(req.validate().is_err());

        req.selected_subject = Some("mathematics".to_string());
        assert!(req.validate().is_ok());

        req.plan_type = PlanType::AllAccess;
        req.selected_subject = None;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn trial_request_rejects_malformed_reference() {
        let req = StartTrialRequest {
            email: "parent@example.com".to_string(),
            username: "parent42".to_string(),
            plan_type: PlanType::Combo,
            billing_cycle: BillingCycle::Yearly,
            children_count: 2,
            selected_subject: None,
            reference: "bad ref!".to_string(),
            card_last_four: None,
        };
        assert!(req.validate().is_err());
    }
}
