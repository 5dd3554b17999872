use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub mongo_uri: String,
    pub redis_uri: String,
    pub mongo_database: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub cookie_secure: bool,
    /// Trial length granted on signup.
    pub trial_days: i64,
    /// Poll interval of the trial-end sweep worker.
    pub trial_sweep_interval_secs: u64,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();

        // Determine environment (defaults to dev)
        let env = env::var("APP_ENV").unwrap_or_else(|_| "dev".to_string());

        // Build configuration from config/*.toml + ENV overrides
        let config_builder = config::Config::builder()
            .add_source(
                config::File::with_name(&format!("config/{}", env)).required(false), // Allow missing config file, fallback to ENV
            )
            // Override with environment variables (prefix: APP_)
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings = config_builder.build()?;

        let mongo_uri = settings
            .get_string("database.mongo_uri")
            .or_else(|_| env::var("MONGO_URI"))
            .unwrap_or_else(|_| "mongodb://localhost:27017/learnsphere".to_string());

        let redis_uri = settings
            .get_string("redis.uri")
            .or_else(|_| env::var("REDIS_URI"))
            .unwrap_or_else(|_| "redis://127.0.0.1:6379/0".to_string());

        let mongo_database = settings
            .get_string("database.mongo_database")
            .or_else(|_| env::var("MONGO_DATABASE"))
            .unwrap_or_else(|_| "learnsphere".to_string());

        let jwt_secret = settings
            .get_string("auth.jwt_secret")
            .or_else(|_| env::var("JWT_SECRET"))
            .unwrap_or_else(|_| {
                if env == "prod" {
                    panic!("FATAL: JWT_SECRET must be set in production!");
                }
                eprintln!("WARNING: Using default JWT_SECRET (dev mode only!)");
                "dev-secret-only-for-local-testing".to_string()
            });

        let bind_addr = settings
            .get_string("server.bind_addr")
            .or_else(|_| env::var("BIND_ADDR"))
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string());

        let cookie_secure = settings
            .get_bool("server.cookie_secure")
            .ok()
            .or_else(|| {
                env::var("COOKIE_SECURE")
                    .ok()
                    .and_then(|v| v.parse::<bool>().ok())
            })
            .unwrap_or(env == "prod");

        let trial_days = settings
            .get_int("billing.trial_days")
            .ok()
            .or_else(|| {
                env::var("TRIAL_DAYS")
                    .ok()
                    .and_then(|v| v.parse::<i64>().ok())
            })
            .unwrap_or(7);

        let trial_sweep_interval_secs = settings
            .get_int("billing.trial_sweep_interval_secs")
            .ok()
            .map(|v| v as u64)
            .or_else(|| {
                env::var("TRIAL_SWEEP_INTERVAL_SECS")
                    .ok()
                    .and_then(|v| v.parse::<u64>().ok())
            })
            .unwrap_or(300);

        Ok(Config {
            mongo_uri,
            redis_uri,
            mongo_database,
            jwt_secret,
            bind_addr,
            cookie_secure,
            trial_days,
            trial_sweep_interval_secs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn load_falls_back_to_defaults() {
        for key in [
            "MONGO_URI",
            "REDIS_URI",
            "MONGO_DATABASE",
            "JWT_SECRET",
            "BIND_ADDR",
            "COOKIE_SECURE",
            "TRIAL_DAYS",
            "TRIAL_SWEEP_INTERVAL_SECS",
            "APP_ENV",
        ] {
            std::env::remove_var(key);
        }

        let config = Config::load().expect("config should load from defaults");
        assert_eq!(config.mongo_database, "learnsphere");
        assert_eq!(config.trial_days, 7);
        assert_eq!(config.trial_sweep_interval_secs, 300);
        assert!(!config.cookie_secure);
    }

    #[test]
    #[serial]
    fn env_overrides_trial_settings() {
        std::env::set_var("TRIAL_DAYS", "14");
        std::env::set_var("TRIAL_SWEEP_INTERVAL_SECS", "60");

        let config = Config::load().expect("config should load");
        assert_eq!(config.trial_days, 14);
        assert_eq!(config.trial_sweep_interval_secs, 60);

        std::env::remove_var("TRIAL_DAYS");
        std::env::remove_var("TRIAL_SWEEP_INTERVAL_SECS");
    }
}
