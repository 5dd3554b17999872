use anyhow::Context;
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use redis::aio::ConnectionManager;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::ApiError;
use crate::middlewares::auth::{JwtClaims, JwtService};
use crate::models::refresh_token::RefreshToken;
use crate::models::user::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, SetPasswordRequest, User,
    UserProfile, UserRole,
};
use crate::utils::time::chrono_to_bson;

const FAILED_ATTEMPTS_LIMIT: u32 = 5;
const FAILED_ATTEMPTS_WINDOW_SECONDS: u64 = 900; // 15 minutes

pub struct AuthService {
    mongo: Database,
    redis: ConnectionManager,
    jwt_service: JwtService,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
}

impl AuthService {
    pub fn new(mongo: Database, redis: ConnectionManager, jwt_service: JwtService) -> Self {
        let access_token_ttl_seconds = std::env::var("JWT_ACCESS_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(3600); // Default: 1 hour

        let refresh_token_ttl_seconds = std::env::var("JWT_REFRESH_TOKEN_TTL_SECONDS")
            .ok()
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(2592000); // Default: 30 days

        Self {
            mongo,
            redis,
            jwt_service,
            access_token_ttl_seconds,
            refresh_token_ttl_seconds,
        }
    }

    pub fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        Ok(hash(password, DEFAULT_COST).context("Failed to hash password")?)
    }

    pub fn verify_password(&self, password: &str, hashed: &str) -> Result<bool, ApiError> {
        Ok(verify(password, hashed).context("Failed to verify password")?)
    }

    /// Register a new user account with the default `user` role.
    pub async fn register(&self, req: RegisterRequest) -> Result<AuthResponse, ApiError> {
        let users = self.mongo.collection::<User>("users");

        let existing_user = users
            .find_one(doc! { "email": &req.email })
            .await
            .context("Failed to check existing user")?;
        if existing_user.is_some() {
            return Err(ApiError::conflict("User with this email already exists"));
        }

        let password_hash = self.hash_password(&req.password)?;

        let now = Utc::now();
        let user = User {
            id: None, // MongoDB will generate
            email: req.email.clone(),
            username: req.username,
            password_hash,
            role: UserRole::User,
            has_subscription: false,
            is_blocked: false,
            created_at: now,
            updated_at: now,
            last_login_at: None,
        };

        let insert_result = users
            .insert_one(&user)
            .await
            .context("Failed to insert user")?;

        let user_id = insert_result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| anyhow::anyhow!("Failed to get inserted user ID"))?;

        let access_token = self.generate_access_token(&user_id, &user.role)?;
        let refresh_token = self
            .create_refresh_token(&user_id, true, None, None)
            .await?;

        let mut user_with_id = user;
        user_with_id.id = Some(user_id);

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user: UserProfile::from(user_with_id),
        })
    }

    /// Login user with email and password
    pub async fn login(
        &self,
        req: LoginRequest,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<AuthResponse, ApiError> {
        let users = self.mongo.collection::<User>("users");

        let user = users
            .find_one(doc! { "email": &req.email })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ApiError::unauthorized("Invalid email or password"))?;

        if user.is_blocked {
            return Err(ApiError::forbidden("User account is blocked"));
        }

        if !self.verify_password(&req.password, &user.password_hash)? {
            tracing::warn!(
                email = %req.email,
                ip = ?ip,
                "Failed login attempt: invalid password"
            );
            return Err(ApiError::unauthorized("Invalid email or password"));
        }

        let user_id = user
            .id
            .ok_or_else(|| anyhow::anyhow!("User record missing id"))?;

        users
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": { "lastLoginAt": chrono_to_bson(Utc::now()) } },
            )
            .await
            .context("Failed to update last login timestamp")?;

        let access_token = self.generate_access_token(&user_id, &user.role)?;
        let refresh_token = self
            .create_refresh_token(&user_id, req.remember_me, ip.clone(), user_agent)
            .await?;

        tracing::info!(
            user_id = %user_id.to_hex(),
            email = %req.email,
            ip = ?ip,
            "Successful login"
        );

        Ok(AuthResponse {
            access_token,
            refresh_token,
            user: UserProfile::from(user),
        })
    }

    /// Replaces the placeholder password of a trial-signup account and
    /// promotes its role from `trial` to `user`.
    pub async fn set_password(&self, req: SetPasswordRequest) -> Result<UserProfile, ApiError> {
        let users = self.mongo.collection::<User>("users");

        let user = users
            .find_one(doc! { "email": &req.email })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ApiError::not_found("No account for this email"))?;

        if user.role != UserRole::Trial {
            return Err(ApiError::conflict(
                "Account already has a password; use change-password",
            ));
        }

        let user_id = user
            .id
            .ok_or_else(|| anyhow::anyhow!("User record missing id"))?;
        let password_hash = self.hash_password(&req.password)?;

        users
            .update_one(
                doc! { "_id": user_id },
                doc! {
                    "$set": {
                        "password_hash": password_hash,
                        "role": UserRole::User.as_str(),
                        "updatedAt": chrono_to_bson(Utc::now()),
                    }
                },
            )
            .await
            .context("Failed to set password")?;

        tracing::info!(user_id = %user_id.to_hex(), "Trial account promoted to user");

        let mut updated = user;
        updated.role = UserRole::User;
        Ok(UserProfile::from(updated))
    }

    pub async fn change_password(
        &self,
        user_id: &str,
        req: ChangePasswordRequest,
    ) -> Result<(), ApiError> {
        let object_id =
            ObjectId::parse_str(user_id).map_err(|_| ApiError::bad_request("Invalid user ID"))?;
        let users = self.mongo.collection::<User>("users");

        let user = users
            .find_one(doc! { "_id": object_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ApiError::not_found("User not found"))?;

        if !self.verify_password(&req.old_password, &user.password_hash)? {
            return Err(ApiError::unauthorized("Old password is incorrect"));
        }

        let password_hash = self.hash_password(&req.new_password)?;
        users
            .update_one(
                doc! { "_id": object_id },
                doc! {
                    "$set": {
                        "password_hash": password_hash,
                        "updatedAt": chrono_to_bson(Utc::now()),
                    }
                },
            )
            .await
            .context("Failed to update password")?;

        Ok(())
    }

    /// Generate JWT access token
    fn generate_access_token(
        &self,
        user_id: &ObjectId,
        role: &UserRole,
    ) -> Result<String, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.access_token_ttl_seconds);

        let claims = JwtClaims {
            sub: user_id.to_hex(),
            role: role.as_str().to_string(),
            exp: exp.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        self.jwt_service
            .generate_token(claims)
            .map_err(|e| ApiError::Persistence(anyhow::anyhow!("Failed to generate token: {}", e)))
    }

    /// Create refresh token and store its hash in MongoDB
    async fn create_refresh_token(
        &self,
        user_id: &ObjectId,
        remember_me: bool,
        ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<String, ApiError> {
        let token = Uuid::new_v4().to_string();
        let token_hash = self.hash_token(&token);

        let now = Utc::now();
        let ttl = if remember_me {
            self.refresh_token_ttl_seconds
        } else {
            86400 // 1 day if not "remember me"
        };
        let expires_at = now + Duration::seconds(ttl);

        let refresh_token = RefreshToken {
            id: None,
            user_id: *user_id,
            token_hash,
            created_at: now,
            expires_at,
            last_used_at: now,
            user_agent,
            ip,
            revoked: false,
        };

        let collection = self.mongo.collection::<RefreshToken>("refresh_tokens");
        collection
            .insert_one(&refresh_token)
            .await
            .context("Failed to insert refresh token")?;

        Ok(token)
    }

    /// Hash a token using SHA-256
    fn hash_token(&self, token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Refresh access token using refresh token
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<String, ApiError> {
        let token_hash = self.hash_token(refresh_token);
        let collection = self.mongo.collection::<RefreshToken>("refresh_tokens");

        let token_doc = collection
            .find_one(doc! { "token_hash": &token_hash, "revoked": false })
            .await
            .context("Failed to query refresh token")?
            .ok_or_else(|| ApiError::unauthorized("Invalid or expired refresh token"))?;

        if token_doc.expires_at < Utc::now() {
            return Err(ApiError::unauthorized("Refresh token has expired"));
        }

        collection
            .update_one(
                doc! { "token_hash": &token_hash },
                doc! { "$set": { "lastUsedAt": chrono_to_bson(Utc::now()) } },
            )
            .await
            .context("Failed to update refresh token")?;

        let users = self.mongo.collection::<User>("users");
        let user = users
            .find_one(doc! { "_id": token_doc.user_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ApiError::unauthorized("User not found"))?;

        if user.is_blocked {
            return Err(ApiError::forbidden("User account is blocked"));
        }

        let user_id = user
            .id
            .ok_or_else(|| anyhow::anyhow!("User record missing id"))?;
        self.generate_access_token(&user_id, &user.role)
    }

    /// Logout user by revoking refresh token. Returns the user id.
    pub async fn logout(&self, refresh_token: &str) -> Result<String, ApiError> {
        let token_hash = self.hash_token(refresh_token);
        let collection = self.mongo.collection::<RefreshToken>("refresh_tokens");

        let token_doc = collection
            .find_one(doc! { "token_hash": &token_hash, "revoked": false })
            .await
            .context("Failed to query refresh token")?
            .ok_or_else(|| ApiError::unauthorized("Invalid or already revoked refresh token"))?;

        let user_id = token_doc.user_id.to_hex();

        collection
            .update_one(
                doc! { "token_hash": &token_hash },
                doc! { "$set": { "revoked": true } },
            )
            .await
            .context("Failed to revoke refresh token")?;

        Ok(user_id)
    }

    /// Get user by ID
    pub async fn get_user_by_id(&self, user_id: &str) -> Result<User, ApiError> {
        let object_id =
            ObjectId::parse_str(user_id).map_err(|_| ApiError::bad_request("Invalid user ID"))?;

        let collection = self.mongo.collection::<User>("users");
        collection
            .find_one(doc! { "_id": object_id })
            .await
            .context("Failed to query user")?
            .ok_or_else(|| ApiError::not_found("User not found"))
    }

    /// Check if account is locked due to failed login attempts
    pub async fn check_failed_attempts(&self, email: &str) -> Result<bool, ApiError> {
        let key = format!("failed_login:{}", email);
        let mut conn = self.redis.clone();

        let count: Option<u32> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to query failed login attempts")?;

        Ok(count.unwrap_or(0) >= FAILED_ATTEMPTS_LIMIT)
    }

    /// Increment failed login attempts counter. The window TTL is set on
    /// the first failure.
    pub async fn increment_failed_attempts(&self, email: &str) -> Result<u32, ApiError> {
        let key = format!("failed_login:{}", email);
        let mut conn = self.redis.clone();

        let count: u32 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .context("Failed to increment failed login attempts")?;

        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(FAILED_ATTEMPTS_WINDOW_SECONDS)
                .query_async::<()>(&mut conn)
                .await
                .context("Failed to set failed-attempts TTL")?;
        }

        Ok(count)
    }

    /// Clear failed login attempts on successful login
    pub async fn clear_failed_attempts(&self, email: &str) -> Result<(), ApiError> {
        let key = format!("failed_login:{}", email);
        let mut conn = self.redis.clone();

        redis::cmd("DEL")
            .arg(&key)
            .query_async::<()>(&mut conn)
            .await
            .context("Failed to clear failed login attempts")?;

        Ok(())
    }
}
