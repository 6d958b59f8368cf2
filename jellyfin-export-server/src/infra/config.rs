use anyhow::{Context, anyhow};
use jellyfin_export_core::{settings::ExportSettings, types::QueueName};
use std::{
    env, fs,
    path::Path,
    time::Duration,
};

/// Server configuration loaded from environment variables, plus an optional
/// settings document used to seed an empty store.
#[derive(Debug, Clone)]
pub struct Config {
    // Server settings
    pub server_host: String,
    pub server_port: u16,

    // Database settings
    pub database_url: Option<String>,
    pub db_max_connections: u32,

    // Redis settings
    pub redis_url: Option<String>,

    /// Prefix of the lock keys; several sites may share one Redis.
    pub site_name: String,

    // Worker settings
    pub workers: usize,
    pub queues: Vec<QueueName>,
    pub poll_interval: Duration,
    /// Period of the full resync; zero disables the scheduler.
    pub resync_interval: Duration,
    /// Finished jobs older than this are deleted; zero keeps them forever.
    pub job_retention: Duration,

    // CORS settings
    pub cors_allowed_origins: Vec<String>,

    // Development settings
    pub dev_mode: bool,

    pub settings_seed: Option<ExportSettings>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_host: "0.0.0.0".to_string(),
            server_port: 3000,
            database_url: None,
            db_max_connections: 10,
            redis_url: None,
            site_name: "localhost".to_string(),
            workers: 2,
            queues: vec![QueueName::default()],
            poll_interval: Duration::from_secs(2),
            resync_interval: Duration::from_secs(60 * 60 * 24),
            job_retention: Duration::from_secs(60 * 60 * 24 * 7),
            cors_allowed_origins: vec!["http://localhost:8000".to_string()],
            dev_mode: false,
            settings_seed: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            server_host: env::var("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_env("SERVER_PORT")?.unwrap_or(defaults.server_port),

            database_url: non_empty_env("DATABASE_URL"),
            db_max_connections: parse_env("DATABASE_MAX_CONNECTIONS")?
                .unwrap_or(defaults.db_max_connections),
            redis_url: non_empty_env("REDIS_URL"),

            site_name: non_empty_env("EXPORT_SITE_NAME").unwrap_or(defaults.site_name),

            workers: parse_env("EXPORT_WORKERS")?.unwrap_or(defaults.workers),
            queues: non_empty_env("EXPORT_QUEUES")
                .map(|raw| parse_queues(&raw))
                .unwrap_or(defaults.queues),
            poll_interval: duration_env("EXPORT_POLL_INTERVAL")?
                .unwrap_or(defaults.poll_interval),
            resync_interval: duration_env("EXPORT_RESYNC_INTERVAL")?
                .unwrap_or(defaults.resync_interval),
            job_retention: duration_env("EXPORT_JOB_RETENTION")?
                .unwrap_or(defaults.job_retention),

            cors_allowed_origins: non_empty_env("CORS_ALLOWED_ORIGINS")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(defaults.cors_allowed_origins),

            dev_mode: parse_env("DEV_MODE")?.unwrap_or(false),

            settings_seed: load_settings_seed()?,
        })
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T>(key: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    non_empty_env(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|err| anyhow!("invalid {key}={raw}: {err}"))
        })
        .transpose()
}

fn duration_env(key: &str) -> anyhow::Result<Option<Duration>> {
    non_empty_env(key)
        .map(|raw| {
            humantime::parse_duration(raw.trim())
                .with_context(|| format!("invalid duration {key}={raw}"))
        })
        .transpose()
}

pub fn parse_queues(raw: &str) -> Vec<QueueName> {
    let mut queues: Vec<QueueName> = raw
        .split(',')
        .filter(|name| !name.trim().is_empty())
        .map(QueueName::new)
        .collect();
    queues.dedup();
    if queues.is_empty() {
        queues.push(QueueName::default());
    }
    queues
}

/// Evaluation order:
/// 1) `$EXPORT_SETTINGS_PATH` (TOML or JSON file),
/// 2) `$EXPORT_SETTINGS_JSON` (inline JSON),
/// 3) no seed.
fn load_settings_seed() -> anyhow::Result<Option<ExportSettings>> {
    if let Some(path) = non_empty_env("EXPORT_SETTINGS_PATH") {
        return load_settings_file(Path::new(&path)).map(Some);
    }

    if let Some(raw) = non_empty_env("EXPORT_SETTINGS_JSON") {
        return serde_json::from_str(&raw)
            .context("failed to parse EXPORT_SETTINGS_JSON")
            .map(Some);
    }

    Ok(None)
}

pub fn load_settings_file(path: &Path) -> anyhow::Result<ExportSettings> {
    let contents = fs::read_to_string(path).with_context(|| {
        format!("failed to read export settings from {}", path.display())
    })?;

    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => serde_json::from_str(&contents)
            .with_context(|| format!("invalid export settings {}", path.display())),
        Some("toml") | Some("tml") => toml::from_str(&contents).map_err(|err| {
            anyhow!("invalid export settings {}: {}", path.display(), err)
        }),
        _ => parse_settings_str(&contents, &path.display().to_string()),
    }
}

fn parse_settings_str(contents: &str, origin: &str) -> anyhow::Result<ExportSettings> {
    match serde_json::from_str(contents) {
        Ok(settings) => Ok(settings),
        Err(json_err) => toml::from_str(contents).map_err(|toml_err| {
            anyhow!(
                "invalid export settings {origin}: not JSON ({json_err}) nor TOML ({toml_err})"
            )
        }),
    }
}
