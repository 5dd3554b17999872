use anyhow::Context;
use bcrypt::{hash, DEFAULT_COST};
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId},
    Client as MongoClient, Collection, Database,
};
use uuid::Uuid;

use crate::error::ApiError;
use crate::metrics::{SUBSCRIPTIONS_CANCELLED_TOTAL, TRIALS_ACTIVATED_TOTAL, TRIALS_STARTED_TOTAL};
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::subscription::{
    ListSubscriptionsQuery, PlanType, StartTrialRequest, StartTrialResponse, Subscription,
    SubscriptionStatus, SubscriptionStatusResponse,
};
use crate::models::user::{User, UserRole};
use crate::services::payment::PaymentGateway;
use crate::utils::time::chrono_to_bson;

const ACCESS_TOKEN_TTL_SECONDS: i64 = 3600;

pub struct SubscriptionService {
    client: MongoClient,
    mongo: Database,
    jwt_service: JwtService,
}

impl SubscriptionService {
    pub fn new(client: MongoClient, mongo: Database, jwt_service: JwtService) -> Self {
        Self {
            client,
            mongo,
            jwt_service,
        }
    }

    fn subscriptions(&self) -> Collection<Subscription> {
        self.mongo.collection("subscriptions")
    }

    fn users(&self) -> Collection<User> {
        self.mongo.collection("users")
    }

    /// Creates a trial subscription, resolving or creating the account by
    /// email. User and subscription writes run in one transaction: a
    /// failed subscription insert leaves no orphaned trial account.
    pub async fn start_trial(
        &self,
        req: StartTrialRequest,
        amount_due: f64,
        trial_days: i64,
    ) -> Result<StartTrialResponse, ApiError> {
        let existing_reference = self
            .subscriptions()
            .find_one(doc! { "payment_reference": &req.reference })
            .await
            .context("Failed to check payment reference")?;
        if existing_reference.is_some() {
            return Err(ApiError::conflict("payment reference already used"));
        }

        let now = Utc::now();
        let trial_end = now + Duration::days(trial_days);

        let mut session = self
            .client
            .start_session()
            .await
            .context("Failed to start session")?;
        session
            .start_transaction()
            .await
            .context("Failed to start transaction")?;

        let result = async {
            let users = self.users();

            let existing_user = users
                .find_one(doc! { "email": &req.email })
                .session(&mut session)
                .await
                .context("Failed to query user by email")?;

            let (user_id, role) = match existing_user {
                Some(user) => {
                    let id = user
                        .id
                        .ok_or_else(|| anyhow::anyhow!("User record missing id"))?;
                    (id, user.role)
                }
                None => {
                    // Placeholder credential; replaced when the trial
                    // account sets a real password.
                    let placeholder = hash(Uuid::new_v4().to_string(), DEFAULT_COST)
                        .context("Failed to hash placeholder password")?;
                    let user = User {
                        id: None,
                        email: req.email.clone(),
                        username: req.username.clone(),
                        password_hash: placeholder,
                        role: UserRole::Trial,
                        has_subscription: false,
                        is_blocked: false,
                        created_at: now,
                        updated_at: now,
                        last_login_at: None,
                    };
                    let inserted = users
                        .insert_one(&user)
                        .session(&mut session)
                        .await
                        .context("Failed to insert trial user")?;
                    let id = inserted
                        .inserted_id
                        .as_object_id()
                        .ok_or_else(|| anyhow::anyhow!("Failed to read inserted user id"))?;
                    (id, UserRole::Trial)
                }
            };

            let subscription = Subscription {
                id: None,
                user_id,
                plan_type: req.plan_type,
                billing_cycle: req.billing_cycle,
                children_count: req.children_count,
                selected_subject: req.selected_subject.clone(),
                amount_paid: amount_due,
                payment_reference: req.reference.clone(),
                status: SubscriptionStatus::Trial,
                start_date: now,
                end_date: now + Duration::days(365),
                trial_end_date: Some(trial_end),
                auto_renew: true,
                card_last_four: req.card_last_four.clone(),
                created_at: now,
                updated_at: now,
            };

            let inserted = self
                .subscriptions()
                .insert_one(&subscription)
                .session(&mut session)
                .await
                .context("Failed to insert subscription")?;
            let subscription_id = inserted
                .inserted_id
                .as_object_id()
                .ok_or_else(|| anyhow::anyhow!("Failed to read inserted subscription id"))?;

            users
                .update_one(
                    doc! { "_id": user_id },
                    doc! { "$set": { "has_subscription": true, "updatedAt": chrono_to_bson(now) } },
                )
                .session(&mut session)
                .await
                .context("Failed to flag user subscription")?;

            Ok::<(ObjectId, UserRole, ObjectId), anyhow::Error>((user_id, role, subscription_id))
        }
        .await;

        let (user_id, role, subscription_id) = match result {
            Ok(values) => values,
            Err(err) => {
                session.abort_transaction().await.ok();
                return Err(err.into());
            }
        };

        session
            .commit_transaction()
            .await
            .context("Failed to commit trial signup")?;

        TRIALS_STARTED_TOTAL.inc();
        tracing::info!(
            user_id = %user_id.to_hex(),
            subscription_id = %subscription_id.to_hex(),
            plan = req.plan_type.as_str(),
            trial_end = %trial_end,
            "Trial subscription created"
        );

        let claims = JwtClaims {
            sub: user_id.to_hex(),
            role: role.as_str().to_string(),
            exp: (now.timestamp() + ACCESS_TOKEN_TTL_SECONDS) as usize,
            iat: now.timestamp() as usize,
        };
        let token = self
            .jwt_service
            .generate_token(claims)
            .map_err(|e| ApiError::Persistence(anyhow::anyhow!("Failed to issue token: {}", e)))?;

        Ok(StartTrialResponse {
            user_id: user_id.to_hex(),
            subscription_id: subscription_id.to_hex(),
            trial_end_date: trial_end,
            token,
        })
    }

    pub async fn get(&self, id: ObjectId) -> Result<Subscription, ApiError> {
        self.subscriptions()
            .find_one(doc! { "_id": id })
            .await
            .context("Failed to query subscription")?
            .ok_or(ApiError::SubscriptionNotFound)
    }

    /// Latest non-cancelled subscription of a user, if any.
    pub async fn current_for_user(
        &self,
        user_id: ObjectId,
    ) -> Result<Option<Subscription>, ApiError> {
        let subscription = self
            .subscriptions()
            .find_one(doc! {
                "userId": user_id,
                "status": { "$ne": SubscriptionStatus::Cancelled.as_str() },
            })
            .sort(doc! { "createdAt": -1 })
            .await
            .context("Failed to query current subscription")?;
        Ok(subscription)
    }

    /// Cancels from any state; repeating the call is a no-op success.
    pub async fn cancel(&self, id: ObjectId) -> Result<SubscriptionStatusResponse, ApiError> {
        let subscription = self.get(id).await?;
        let now = Utc::now();

        if subscription.status != SubscriptionStatus::Cancelled {
            self.subscriptions()
                .update_one(
                    doc! { "_id": id },
                    doc! {
                        "$set": {
                            "status": SubscriptionStatus::Cancelled.as_str(),
                            "auto_renew": false,
                            "updatedAt": chrono_to_bson(now),
                        },
                        "$unset": { "trialEndDate": "" },
                    },
                )
                .await
                .context("Failed to cancel subscription")?;

            self.users()
                .update_one(
                    doc! { "_id": subscription.user_id },
                    doc! { "$set": { "has_subscription": false, "updatedAt": chrono_to_bson(now) } },
                )
                .await
                .context("Failed to clear user subscription flag")?;

            SUBSCRIPTIONS_CANCELLED_TOTAL.inc();
            tracing::info!(
                subscription_id = %id.to_hex(),
                prior = subscription.status.as_str(),
                "Subscription cancelled"
            );
        }

        Ok(SubscriptionStatusResponse {
            id: id.to_hex(),
            status: SubscriptionStatus::Cancelled,
        })
    }

    /// Admin freeze/unfreeze. Only flips the active ⇄ frozen pair; any
    /// other state is returned unchanged. The update is conditional on
    /// the status just read, so a concurrent transition wins cleanly.
    pub async fn toggle_frozen(&self, id: ObjectId) -> Result<SubscriptionStatusResponse, ApiError> {
        let subscription = self.get(id).await?;

        let Some(next) = subscription.status.freeze_toggle() else {
            tracing::warn!(
                subscription_id = %id.to_hex(),
                status = subscription.status.as_str(),
                "Freeze toggle ignored for non-freezable status"
            );
            return Ok(SubscriptionStatusResponse {
                id: id.to_hex(),
                status: subscription.status,
            });
        };

        let updated = self
            .subscriptions()
            .update_one(
                doc! { "_id": id, "status": subscription.status.as_str() },
                doc! {
                    "$set": {
                        "status": next.as_str(),
                        "updatedAt": chrono_to_bson(Utc::now()),
                    }
                },
            )
            .await
            .context("Failed to toggle freeze")?;

        if updated.modified_count == 0 {
            // Lost the race against another transition; report whatever
            // state won.
            let current = self.get(id).await?;
            return Ok(SubscriptionStatusResponse {
                id: id.to_hex(),
                status: current.status,
            });
        }

        tracing::info!(
            subscription_id = %id.to_hex(),
            from = subscription.status.as_str(),
            to = next.as_str(),
            "Subscription freeze toggled"
        );

        Ok(SubscriptionStatusResponse {
            id: id.to_hex(),
            status: next,
        })
    }

    /// Applies the trial-end transition to one subscription. Safe under
    /// duplicate delivery: the update is keyed on the trial status, so a
    /// second evaluation (or a cancel that happened in between) makes
    /// this a no-op. Returns whether the subscription was activated.
    pub async fn evaluate_trial_end(
        &self,
        subscription: &Subscription,
        gateway: &dyn PaymentGateway,
    ) -> Result<bool, ApiError> {
        let now = Utc::now();

        let due = subscription
            .trial_end_date
            .map(|end| now >= end)
            .unwrap_or(false);
        if !due
            || subscription
                .status
                .trial_end_transition(subscription.auto_renew)
                .is_none()
        {
            return Ok(false);
        }

        let id = subscription
            .id
            .ok_or_else(|| anyhow::anyhow!("Subscription record missing id"))?;

        // Charge intent first; the default gateway records and skips.
        if let Err(err) = gateway
            .charge_saved_card(&subscription.payment_reference, subscription.amount_paid)
            .await
        {
            tracing::warn!(
                subscription_id = %id.to_hex(),
                error = %err,
                "Charge attempt failed; trial activation deferred to next sweep"
            );
            return Ok(false);
        }

        let updated = self
            .subscriptions()
            .update_one(
                doc! {
                    "_id": id,
                    "status": SubscriptionStatus::Trial.as_str(),
                    "auto_renew": true,
                },
                doc! {
                    "$set": {
                        "status": SubscriptionStatus::Active.as_str(),
                        "updatedAt": chrono_to_bson(now),
                    },
                    "$unset": { "trialEndDate": "" },
                },
            )
            .await
            .context("Failed to activate trial subscription")?;

        let activated = updated.modified_count == 1;
        if activated {
            TRIALS_ACTIVATED_TOTAL.inc();
            tracing::info!(
                subscription_id = %id.to_hex(),
                "Trial converted to active subscription"
            );
        }
        Ok(activated)
    }

    /// Trials whose end date has passed, for the sweep worker.
    pub async fn find_due_trials(&self, limit: i64) -> Result<Vec<Subscription>, ApiError> {
        let now = chrono_to_bson(Utc::now());
        let cursor = self
            .subscriptions()
            .find(doc! {
                "status": SubscriptionStatus::Trial.as_str(),
                "trialEndDate": { "$lte": now },
            })
            .limit(limit)
            .await
            .context("Failed to query due trials")?;

        let due = cursor
            .try_collect()
            .await
            .context("Failed to collect due trials")?;
        Ok(due)
    }

    /// Promotes upcoming subscriptions whose start date has arrived.
    pub async fn promote_due_upcoming(&self) -> Result<u64, ApiError> {
        let now = Utc::now();
        let updated = self
            .subscriptions()
            .update_many(
                doc! {
                    "status": SubscriptionStatus::Upcoming.as_str(),
                    "startDate": { "$lte": chrono_to_bson(now) },
                },
                doc! {
                    "$set": {
                        "status": SubscriptionStatus::Active.as_str(),
                        "updatedAt": chrono_to_bson(now),
                    }
                },
            )
            .await
            .context("Failed to promote upcoming subscriptions")?;
        Ok(updated.modified_count)
    }

    pub async fn list(&self, query: ListSubscriptionsQuery) -> Result<Vec<Subscription>, ApiError> {
        let mut filter = doc! {};
        if let Some(status) = query.status.as_deref() {
            let parsed: SubscriptionStatus = status
                .parse()
                .map_err(|e: String| ApiError::bad_request(e))?;
            filter.insert("status", parsed.as_str());
        }
        if let Some(plan) = query.plan_type.as_deref() {
            let parsed: PlanType = plan.parse().map_err(|e: String| ApiError::bad_request(e))?;
            filter.insert("plan_type", parsed.as_str());
        }

        let cursor = self
            .subscriptions()
            .find(filter)
            .sort(doc! { "createdAt": -1 })
            .skip(query.offset.unwrap_or(0) as u64)
            .limit(query.limit.unwrap_or(50).min(200) as i64)
            .await
            .context("Failed to query subscriptions")?;

        let subscriptions = cursor
            .try_collect()
            .await
            .context("Failed to collect subscriptions")?;
        Ok(subscriptions)
    }
}
