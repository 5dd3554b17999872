use tracing_subscriber::fmt::init;

use learnsphere_api::{
    config::Config,
    middlewares::auth::JwtService,
    services::{
        payment::RecordOnlyGateway, subscription_service::SubscriptionService,
        trial_sweep_worker::TrialSweepWorker, AppState,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();

    let config = Config::load().expect("Failed to load configuration");

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_uri)
        .await
        .expect("Failed to connect to MongoDB");

    let redis_client =
        redis::Client::open(config.redis_uri.clone()).expect("Failed to create Redis client");

    let app_state = AppState::new(config.clone(), mongo_client, redis_client)
        .await
        .expect("Failed to initialize app state");

    let jwt_service = JwtService::new(&app_state.config.jwt_secret);
    let subscription_service = SubscriptionService::new(
        app_state.mongo_client.clone(),
        app_state.mongo.clone(),
        jwt_service,
    );

    let worker = TrialSweepWorker::new(subscription_service, Box::new(RecordOnlyGateway), config);

    worker.run().await?;

    Ok(())
}
