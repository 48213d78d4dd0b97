use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::collections::HashSet;
use std::env;
use std::sync::OnceLock;
use std::time::Duration;

/// Where verified Telegram ids are checked against the allow-list.
#[derive(Clone)]
pub enum AllowListSource {
    Static(HashSet<i64>),
    Postgres { database_url: String },
}

impl std::fmt::Debug for AllowListSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AllowListSource::Static(ids) => f.debug_tuple("Static").field(ids).finish(),
            AllowListSource::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("database_url", &"<redacted>")
                .finish(),
        }
    }
}

#[derive(Clone)]
pub struct Config {
    pub server_address: String,
    pub allow_list: AllowListSource,
    pub jwt_secret: String,
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    pub auth_rps: u32,
    pub trust_forwarded_for: bool,
    pub session_ttl_minutes: i64,
    pub allow_list_app_name: String,
    pub allow_list_timeout: Duration,
    pub telegram_auth_max_age: Option<Duration>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("server_address", &self.server_address)
            .field("allow_list", &self.allow_list)
            .field("jwt_secret", &"<redacted>")
            .field("telegram_bot_token", &"<redacted>")
            .field("telegram_api_base", &self.telegram_api_base)
            .field("auth_rps", &self.auth_rps)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .field("session_ttl_minutes", &self.session_ttl_minutes)
            .field("allow_list_app_name", &self.allow_list_app_name)
            .field("allow_list_timeout", &self.allow_list_timeout)
            .field("telegram_auth_max_age", &self.telegram_auth_max_age)
            .finish()
    }
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            allow_list: allow_list_source(
                env::var("TELEGRAM_ALLOWED_IDS").ok(),
                env::var("DATABASE_URL").ok(),
            )?,
            jwt_secret: get_env("JWT_SECRET")?,
            telegram_bot_token: get_env("TELEGRAM_BOT_TOKEN")?,
            telegram_api_base: env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            auth_rps: get_env_parse("AUTH_RPS")?,
            trust_forwarded_for: get_env_parse_or("TRUST_FORWARDED_FOR", false)?,
            session_ttl_minutes: get_env_parse_or("SESSION_TTL_MINUTES", 720)?,
            allow_list_app_name: env::var("ALLOW_LIST_APP_NAME")
                .unwrap_or_else(|_| "Telegram".to_string()),
            allow_list_timeout: Duration::from_millis(get_env_parse_or(
                "ALLOW_LIST_TIMEOUT_MS",
                3000,
            )?),
            telegram_auth_max_age: get_env_parse_opt::<u64>("TELEGRAM_AUTH_MAX_AGE_SECS")?
                .map(Duration::from_secs),
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse<T>(name: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(name)?;
    raw.parse()
        .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e)))
}

fn get_env_parse_opt<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(None),
    }
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    Ok(get_env_parse_opt(name)?.unwrap_or(default))
}

/// A static id list wins; otherwise `DATABASE_URL` is required.
pub fn allow_list_source(
    allowed_ids: Option<String>,
    database_url: Option<String>,
) -> Result<AllowListSource> {
    if let Some(raw) = allowed_ids.filter(|raw| !raw.trim().is_empty()) {
        return Ok(AllowListSource::Static(parse_id_list(&raw)?));
    }
    match database_url.filter(|url| !url.trim().is_empty()) {
        Some(database_url) => Ok(AllowListSource::Postgres { database_url }),
        None => Err(Error::Config(
            "Missing environment variable: DATABASE_URL (or set TELEGRAM_ALLOWED_IDS)".to_string(),
        )),
    }
}

pub fn parse_id_list(raw: &str) -> Result<HashSet<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|e| Error::Config(format!("Invalid Telegram id '{}': {}", s, e)))
        })
        .collect()
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
