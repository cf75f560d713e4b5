use secrecy::SecretString;
use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub mongo_conn_string: String,
    pub mongo_db_name: String,
    pub attempts_collection: String,
    pub answers_collection: String,
    pub web_server_host: String,
    pub web_server_port: u16,
    /// Clients are told to send a heartbeat this often, in seconds.
    pub heartbeat_interval_secs: u64,
    /// An in-progress attempt with no sign of life for this long is swept
    /// into the abandoned state.
    pub stale_after_secs: i64,
    /// How often the background sweeper runs, in seconds.
    pub sweep_interval_secs: u64,
    pub directory_base_url: String,
    pub directory_service_token: SecretString,
    pub completion_webhook_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            mongo_conn_string: env::var("MONGO_CONN_STRING")
                .unwrap_or_else(|_| "mongodb://localhost:27017".to_string()),
            mongo_db_name: env::var("MONGO_DB_NAME").unwrap_or_else(|_| "aralin-local".to_string()),
            attempts_collection: env::var("ATTEMPTS_COLLECTION")
                .unwrap_or_else(|_| "attempts".to_string()),
            answers_collection: env::var("ANSWERS_COLLECTION")
                .unwrap_or_else(|_| "answers".to_string()),
            web_server_host: env::var("WEB_SERVER_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            web_server_port: env::var("WEB_SERVER_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            heartbeat_interval_secs: env::var("HEARTBEAT_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
            stale_after_secs: env::var("STALE_AFTER_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(7200),
            sweep_interval_secs: env::var("SWEEP_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
            directory_base_url: env::var("DIRECTORY_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8090".to_string()),
            directory_service_token: SecretString::from(
                env::var("DIRECTORY_SERVICE_TOKEN")
                    .unwrap_or_else(|_| "dev_directory_token_change_in_production".to_string()),
            ),
            completion_webhook_url: env::var("COMPLETION_WEBHOOK_URL").ok(),
        }
    }

    /// Validate that production-critical configuration is set
    /// Panics if required secrets are using default values
    pub fn validate_for_production(&self) {
        use secrecy::ExposeSecret;

        let directory_token = self.directory_service_token.expose_secret();

        // Check for dangerous default values
        if directory_token == "dev_directory_token_change_in_production" {
            panic!(
                "FATAL: DIRECTORY_SERVICE_TOKEN is using default value! Set DIRECTORY_SERVICE_TOKEN environment variable."
            );
        }

        if self.stale_after_secs <= self.heartbeat_interval_secs as i64 {
            panic!(
                "FATAL: STALE_AFTER_SECS ({}) must exceed HEARTBEAT_INTERVAL_SECS ({}), or every attempt gets swept between heartbeats.",
                self.stale_after_secs, self.heartbeat_interval_secs
            );
        }
    }

    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            mongo_conn_string: "mongodb://localhost:27017".to_string(),
            mongo_db_name: "aralin-test".to_string(),
            attempts_collection: "attempts".to_string(),
            answers_collection: "answers".to_string(),
            web_server_host: "127.0.0.1".to_string(),
            web_server_port: 8080,
            heartbeat_interval_secs: 30,
            stale_after_secs: 7200,
            sweep_interval_secs: 300,
            directory_base_url: "http://localhost:8090".to_string(),
            directory_service_token: SecretString::from("test_directory_token".to_string()),
            completion_webhook_url: None,
        }
    }
}
