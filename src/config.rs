use std::env;

use url::Url;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub notification_queue_size: usize,
    pub chat_webhook_url: Option<Url>,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: Url,
    pub storage_url: Option<Url>,
    pub storage_service_key: Option<String>,
    pub storage_bucket: String,
    pub max_photo_bytes: usize,
    pub simulation_tick_ms: u64,
    pub simulation_step: f64,
    pub enforce_transitions: bool,
    pub otp_issuer: String,
    pub static_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 1024,
            notification_queue_size: 256,
            chat_webhook_url: None,
            stripe_secret_key: None,
            stripe_api_base: Url::parse(DEFAULT_STRIPE_API_BASE)
                .expect("default stripe api base is a valid url"),
            storage_url: None,
            storage_service_key: None,
            storage_bucket: "proof-of-delivery".to_string(),
            max_photo_bytes: 5 * 1024 * 1024,
            simulation_tick_ms: 3000,
            simulation_step: 0.1,
            enforce_transitions: true,
            otp_issuer: "MediDispatch".to_string(),
            static_dir: "static".to_string(),
        }
    }
}

const DEFAULT_STRIPE_API_BASE: &str = "https://api.stripe.com";

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        let defaults = Self::default();

        let log_format = match env::var("LOG_FORMAT") {
            Ok(raw) if raw.eq_ignore_ascii_case("json") => LogFormat::Json,
            Ok(raw) if raw.eq_ignore_ascii_case("compact") => LogFormat::Compact,
            Ok(raw) => {
                return Err(AppError::Internal(format!(
                    "invalid LOG_FORMAT: {raw}, expected compact or json"
                )));
            }
            Err(_) => defaults.log_format,
        };

        let simulation_step: f64 = parse_or_default("SIMULATION_STEP", defaults.simulation_step)?;
        if !(simulation_step > 0.0 && simulation_step <= 1.0) {
            return Err(AppError::Internal(format!(
                "invalid SIMULATION_STEP: {simulation_step}, expected (0, 1]"
            )));
        }

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", defaults.http_port)?,
            log_level: env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", defaults.event_buffer_size)?,
            notification_queue_size: parse_or_default(
                "NOTIFICATION_QUEUE_SIZE",
                defaults.notification_queue_size,
            )?,
            chat_webhook_url: parse_optional("CHAT_WEBHOOK_URL")?,
            stripe_secret_key: non_empty_var("STRIPE_SECRET_KEY"),
            stripe_api_base: parse_or_default("STRIPE_API_BASE", defaults.stripe_api_base)?,
            storage_url: parse_optional("STORAGE_URL")?,
            storage_service_key: non_empty_var("STORAGE_SERVICE_KEY"),
            storage_bucket: env::var("STORAGE_BUCKET").unwrap_or(defaults.storage_bucket),
            max_photo_bytes: parse_or_default("MAX_PHOTO_BYTES", defaults.max_photo_bytes)?,
            simulation_tick_ms: parse_or_default(
                "SIMULATION_TICK_MS",
                defaults.simulation_tick_ms,
            )?,
            simulation_step,
            enforce_transitions: parse_or_default(
                "ENFORCE_TRANSITIONS",
                defaults.enforce_transitions,
            )?,
            otp_issuer: env::var("OTP_ISSUER").unwrap_or(defaults.otp_issuer),
            static_dir: env::var("STATIC_DIR").unwrap_or(defaults.static_dir),
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T>(key: &str) -> Result<Option<T>, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        None => Ok(None),
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
