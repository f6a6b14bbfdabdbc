use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database_url: String,
    /// Base64 encoded 32-byte key for account passwords at rest.
    pub encryption_key: String,
    /// Bearer token required on `/api/admin` routes.
    pub admin_token: String,
    pub server_host: String,
    pub server_port: u16,

    pub paypal_client_id: String,
    pub paypal_client_secret: String,
    pub paypal_base_url: String,
    pub paypal_return_url: String,
    pub paypal_cancel_url: String,

    pub expiry_sweep_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("STREAMSHOP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .set_default("server_host", "0.0.0.0")?
            .set_default("server_port", 8080)?
            .set_default("paypal_client_id", "")?
            .set_default("paypal_client_secret", "")?
            .set_default("paypal_base_url", "https://api-m.sandbox.paypal.com")?
            .set_default("paypal_return_url", "http://localhost:3000/checkout/success")?
            .set_default("paypal_cancel_url", "http://localhost:3000/checkout/cancel")?
            .set_default("expiry_sweep_interval_secs", 300)?
            .build()?;

        config.try_deserialize()
    }
}
