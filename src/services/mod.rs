use crate::config::Config;
use mongodb::{Client as MongoClient, Database};
use redis::aio::ConnectionManager;

use self::pricing_service::PricingCache;

pub struct AppState {
    pub config: Config,
    /// Kept alongside the database handle because multi-document
    /// transactions start sessions on the client.
    pub mongo_client: MongoClient,
    pub mongo: Database,
    pub redis: ConnectionManager,
    pub pricing: PricingCache,
}

impl AppState {
    pub async fn new(
        config: Config,
        mongo_client: MongoClient,
        redis_client: redis::Client,
    ) -> anyhow::Result<Self> {
        let mongo = mongo_client.database(&config.mongo_database);

        tracing::info!("Attempting to connect to Redis...");

        // Create ConnectionManager with longer timeout
        let redis = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            ConnectionManager::new(redis_client),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis connection timeout after 30s"))??;

        tracing::info!("Redis ConnectionManager created, testing with PING...");

        // Test connection
        let mut conn = redis.clone();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| anyhow::anyhow!("Redis PING timeout after 5s"))??;

        tracing::info!("Redis connection established successfully");

        Ok(Self {
            config,
            mongo_client,
            mongo,
            redis,
            pricing: PricingCache::default(),
        })
    }
}

pub mod auth_service;
pub mod content_service;
pub mod grader;
pub mod payment;
pub mod pricing_service;
pub mod quiz_service;
pub mod subscription_service;
pub mod trial_sweep_worker;
