//! Process-wide settings, read once at startup and immutable afterwards.

use std::path::PathBuf;
use std::str::FromStr;

use chrono::Duration;
use thiserror::Error;

/// Placeholder secrets that must not be used in production.
const PLACEHOLDER_SECRETS: &[&str] = &["dev-secret-change-me", "change-me", "superSecretKey"];

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("MICROBLOG_SECRET_KEY is unset or still a placeholder")]
    InsecureSecret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailTransportConfig {
    Smtp {
        host: String,
        port: u16,
        use_tls: bool,
        username: Option<String>,
        password: Option<String>,
    },
    /// Writes each message as an .eml file into `dir`.
    File { dir: PathBuf },
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub transport: MailTransportConfig,
    pub sender: String,
}

impl MailConfig {
    pub fn is_smtp(&self) -> bool {
        matches!(self.transport, MailTransportConfig::Smtp { .. })
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub production: bool,
    pub secret_key: String,
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    /// Absolute URL of the site, used for links in outgoing mail.
    pub base_url: String,
    pub posts_per_page: u32,
    pub about_me_max_length: usize,
    pub reset_token_ttl: Duration,
    pub log_dir: PathBuf,
    pub mail: MailConfig,
    pub admins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            production: false,
            secret_key: DEV_SECRET.to_string(),
            database_path: PathBuf::from("microblog.db"),
            host: "0.0.0.0".to_string(),
            port: 5000,
            base_url: "http://localhost:5000".to_string(),
            posts_per_page: 25,
            about_me_max_length: 140,
            reset_token_ttl: Duration::seconds(600),
            log_dir: PathBuf::from("logs"),
            mail: MailConfig {
                transport: MailTransportConfig::File {
                    dir: PathBuf::from("outbox"),
                },
                sender: "no-reply@localhost".to_string(),
            },
            admins: Vec::new(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Config::default();

        let production = get("MICROBLOG_ENV").is_some_and(|v| v.eq_ignore_ascii_case("production"));

        let secret_key = get("MICROBLOG_SECRET_KEY").unwrap_or(defaults.secret_key);
        if production && PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            return Err(ConfigError::InsecureSecret);
        }

        let mail_server = get("MICROBLOG_MAIL_SERVER");
        let sender = get("MICROBLOG_MAIL_SENDER").unwrap_or_else(|| {
            format!("no-reply@{}", mail_server.as_deref().unwrap_or("localhost"))
        });
        let transport = match mail_server {
            Some(host) => MailTransportConfig::Smtp {
                host,
                port: parse(&get, "MICROBLOG_MAIL_PORT", 25)?,
                use_tls: parse_flag(&get, "MICROBLOG_MAIL_USE_TLS")?,
                username: get("MICROBLOG_MAIL_USERNAME"),
                password: get("MICROBLOG_MAIL_PASSWORD"),
            },
            None => MailTransportConfig::File {
                dir: get("MICROBLOG_MAIL_OUTBOX")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("outbox")),
            },
        };

        let admins = get("MICROBLOG_ADMINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|a| !a.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let ttl_secs: i64 = parse(&get, "MICROBLOG_RESET_TOKEN_TTL_SECS", 600)?;

        Ok(Self {
            production,
            secret_key,
            database_path: get("MICROBLOG_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.database_path),
            host: get("MICROBLOG_HOST").unwrap_or(defaults.host),
            port: parse(&get, "MICROBLOG_PORT", defaults.port)?,
            base_url: get("MICROBLOG_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            posts_per_page: parse(&get, "MICROBLOG_POSTS_PER_PAGE", defaults.posts_per_page)?.max(1),
            about_me_max_length: parse(
                &get,
                "MICROBLOG_ABOUT_ME_MAX_LENGTH",
                defaults.about_me_max_length,
            )?,
            reset_token_ttl: Duration::seconds(ttl_secs),
            log_dir: get("MICROBLOG_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            mail: MailConfig { transport, sender },
            admins,
        })
    }

    /// Admin failure mails go out only from production with a real mail server.
    pub fn admin_alerts_enabled(&self) -> bool {
        self.production && self.mail.is_smtp() && !self.admins.is_empty()
    }
}

fn parse<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

fn parse_flag<G>(get: &G, key: &'static str) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(value) => Err(ConfigError::Invalid { key, value }),
    }
}
