use std::env;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    /// When set, inbound webhook calls must carry this value in
    /// `X-Telegram-Bot-Api-Secret-Token`.
    pub telegram_webhook_secret: Option<String>,
    pub webhook_url: Option<String>,
    /// SHA-256 hex of the staff key (see `gen_staff_key`).
    pub staff_key_hash: String,
    pub institution_name: String,
    pub institution_contact: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = env::var("DATABASE_URL")?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let db_max_connections = env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(5);

        let telegram_bot_token = env::var("TELEGRAM_BOT_TOKEN")
            .map_err(|_| anyhow::anyhow!("TELEGRAM_BOT_TOKEN is not set"))?;
        let telegram_api_base = env::var("TELEGRAM_API_BASE")
            .unwrap_or_else(|_| "https://api.telegram.org".to_string());

        let staff_key_hash = env::var("STAFF_KEY_HASH")
            .map_err(|_| anyhow::anyhow!("STAFF_KEY_HASH is not set (run gen_staff_key)"))?
            .trim()
            .to_ascii_lowercase();
        if staff_key_hash.len() != 64 || hex::decode(&staff_key_hash).is_err() {
            anyhow::bail!("STAFF_KEY_HASH must be a 64-char SHA-256 hex digest");
        }

        let institution_name =
            env::var("INSTITUTION_NAME").unwrap_or_else(|_| "Girum Hospital".to_string());

        Ok(Self {
            database_url,
            bind_addr,
            db_max_connections,
            telegram_bot_token,
            telegram_api_base,
            telegram_webhook_secret: non_empty_var("TELEGRAM_WEBHOOK_SECRET"),
            webhook_url: non_empty_var("WEBHOOK_URL"),
            staff_key_hash,
            institution_name,
            institution_contact: non_empty_var("INSTITUTION_CONTACT"),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
