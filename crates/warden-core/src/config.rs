use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, platform::throttled::ThrottleConfig, Result};

/// Typed configuration for the moderation bot.
#[derive(Clone, Debug)]
pub struct Config {
    /// Prefix used when a server has no prefix of its own.
    pub default_prefix: String,

    // Persistence
    pub data_file: PathBuf,

    // Settings cache
    pub cache_refresh_interval: Duration,

    // Fan-out scans
    pub max_concurrent_scans: usize,

    // Error reporting
    pub error_webhook_url: Option<String>,

    // Outbound throttling
    pub throttle_enabled: bool,
    pub throttle: ThrottleConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_prefix: "_".to_string(),
            data_file: PathBuf::from("/tmp/warden-store.json"),
            cache_refresh_interval: Duration::from_secs(300),
            max_concurrent_scans: 4,
            error_webhook_url: None,
            throttle_enabled: true,
            throttle: ThrottleConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (environment, test maps).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let default_prefix = lookup("WARDEN_DEFAULT_PREFIX")
            .and_then(non_empty)
            .unwrap_or(defaults.default_prefix);
        if default_prefix.chars().any(char::is_whitespace) {
            return Err(Error::Config(
                "WARDEN_DEFAULT_PREFIX must not contain whitespace".to_string(),
            ));
        }

        let data_file = lookup("WARDEN_DATA_FILE")
            .and_then(non_empty)
            .map(PathBuf::from)
            .unwrap_or(defaults.data_file);

        let cache_refresh_interval = parse_u64(&lookup, "WARDEN_CACHE_REFRESH_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.cache_refresh_interval);
        if cache_refresh_interval.is_zero() {
            return Err(Error::Config(
                "WARDEN_CACHE_REFRESH_SECS must be greater than zero".to_string(),
            ));
        }

        let max_concurrent_scans = parse_u64(&lookup, "WARDEN_MAX_CONCURRENT_SCANS")?
            .map(|v| v as usize)
            .unwrap_or(defaults.max_concurrent_scans)
            .max(1);

        let error_webhook_url = lookup("WARDEN_ERROR_WEBHOOK_URL").and_then(non_empty);

        let throttle_enabled = lookup("WARDEN_THROTTLE_ENABLED")
            .map(|s| parse_bool(&s))
            .unwrap_or(defaults.throttle_enabled);
        let throttle = ThrottleConfig {
            global_min_interval: parse_u64(&lookup, "WARDEN_THROTTLE_GLOBAL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.throttle.global_min_interval),
            per_channel_min_interval: parse_u64(&lookup, "WARDEN_THROTTLE_CHANNEL_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.throttle.per_channel_min_interval),
        };

        Ok(Self {
            default_prefix,
            data_file,
            cache_refresh_interval,
            max_concurrent_scans,
            error_webhook_url,
            throttle_enabled,
            throttle,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<u64>> {
    let Some(raw) = lookup(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<u64>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a non-negative integer, got {raw:?}")))
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
