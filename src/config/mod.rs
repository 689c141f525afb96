use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub stripe: StripeConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL used to build Stripe redirect targets.
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    #[serde(default = "default_expiry_hours")]
    pub expiry_hours: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Price id of the membership subscription.
    pub price_id: String,
    #[serde(default = "default_amount_cents")]
    pub amount_cents: u64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    #[serde(default = "default_max_requests")]
    pub max_requests: u64,
    /// Use the Redis-backed store so the limit holds across instances.
    #[serde(default)]
    pub distributed: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_expiry_hours() -> u64 {
    24
}

fn default_api_base() -> String {
    "https://api.stripe.com/v1".to_string()
}

fn default_amount_cents() -> u64 {
    9900
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_window_secs() -> u64 {
    60
}

fn default_max_requests() -> u64 {
    60
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("server.base_url", "http://localhost:3000")?
            .set_default("database.url", "postgres://localhost/community")?
            .set_default("database.max_connections", 10)?
            .set_default("redis.url", "redis://localhost:6379")?
            .set_default("jwt.secret", "development-secret-change-in-production")?
            .set_default("jwt.expiry_hours", 24)?
            .set_default("stripe.secret_key", "sk_test_placeholder")?
            .set_default("stripe.webhook_secret", "whsec_placeholder")?
            .set_default("stripe.price_id", "price_placeholder")?
            .set_default("stripe.amount_cents", 9900)?
            .set_default("stripe.currency", "usd")?
            .set_default("stripe.api_base", "https://api.stripe.com/v1")?
            .set_default("rate_limit.window_secs", 60)?
            .set_default("rate_limit.max_requests", 60)?
            .set_default("rate_limit.distributed", false)?
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
