use log::{info, warn};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::types::Pair;

pub const DEFAULT_API_BASE: &str = "https://rqonsjtbbk.execute-api.eu-central-1.amazonaws.com/Prod/";
pub const DEFAULT_SESSION_FILE: &str = "quiz-night-session.json";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(2000);
pub const DEFAULT_COUNTDOWN: Duration = Duration::from_secs(20);
pub const DEFAULT_QUESTIONS_PER_PAIR: u32 = 6;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
/// Stored values live this long, like the 180-day cookies the web client set.
pub const COOKIE_MAX_AGE: Duration = Duration::from_secs(180 * 24 * 60 * 60);

/// What happens to a question whose countdown ran out before the player picked an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpiryPolicy {
    /// Keep it on screen with input disabled until a newer question replaces it.
    #[default]
    Hold,
    /// After the grace period, clear it and count it as answered so it never comes back.
    Forfeit { after: Duration },
}

impl FromStr for ExpiryPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidValue {
            name: "QUIZ_EXPIRY_POLICY",
            expected: "`hold` or `forfeit:<seconds>`",
            value: s.to_string(),
        };
        match s.trim() {
            "hold" => Ok(ExpiryPolicy::Hold),
            "forfeit" => Ok(ExpiryPolicy::Forfeit {
                after: Duration::ZERO,
            }),
            other => {
                let secs = other.strip_prefix("forfeit:").ok_or_else(invalid)?;
                let secs = secs.parse::<u64>().map_err(|_| invalid())?;
                Ok(ExpiryPolicy::Forfeit {
                    after: Duration::from_secs(secs),
                })
            }
        }
    }
}

/// Settings for the player-side polling loop.
#[derive(Debug, Clone)]
pub struct PollConfig {
    pub interval: Duration,
    pub countdown: Duration,
    pub expiry: ExpiryPolicy,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            countdown: DEFAULT_COUNTDOWN,
            expiry: ExpiryPolicy::Hold,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base: String,
    pub api_key: Option<String>,
    pub session_file: PathBuf,
    pub request_timeout: Duration,
    pub questions_per_pair: u32,
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            api_key: None,
            session_file: PathBuf::from(DEFAULT_SESSION_FILE),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            questions_per_pair: DEFAULT_QUESTIONS_PER_PAIR,
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    /// Read settings from `QUIZ_*` environment variables, falling back to defaults.
    /// Call `dotenvy::dotenv()` first if a `.env` file should be honoured.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`Config::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let api_base = lookup("QUIZ_API_BASE").unwrap_or(defaults.api_base);
        let api_key = lookup("QUIZ_API_KEY").filter(|v| !v.is_empty());
        let session_file = lookup("QUIZ_SESSION_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.session_file);

        let poll_ms = parse_var(
            &lookup,
            "QUIZ_POLL_INTERVAL_MS",
            "a number of milliseconds",
            2000u64,
        )?;
        let countdown_secs =
            parse_var(&lookup, "QUIZ_COUNTDOWN_SECS", "a number of seconds", 20u64)?;
        let timeout_secs =
            parse_var(&lookup, "QUIZ_REQUEST_TIMEOUT_SECS", "a number of seconds", 10u64)?;
        let questions_per_pair = parse_var(
            &lookup,
            "QUIZ_QUESTIONS_PER_PAIR",
            "a positive number",
            DEFAULT_QUESTIONS_PER_PAIR,
        )?;
        if questions_per_pair == 0 {
            return Err(ConfigError::NoQuestions);
        }
        let expiry = match lookup("QUIZ_EXPIRY_POLICY") {
            Some(value) => value.parse()?,
            None => ExpiryPolicy::Hold,
        };

        if poll_ms == 0 {
            warn!("QUIZ_POLL_INTERVAL_MS is 0, using the default interval");
        }

        let config = Config {
            api_base,
            api_key,
            session_file,
            request_timeout: Duration::from_secs(timeout_secs),
            questions_per_pair,
            poll: PollConfig {
                interval: if poll_ms == 0 {
                    DEFAULT_POLL_INTERVAL
                } else {
                    Duration::from_millis(poll_ms)
                },
                countdown: Duration::from_secs(countdown_secs),
                expiry,
            },
        };
        info!(
            "Using API {} with session file {}",
            config.api_base,
            config.session_file.display()
        );
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                name,
                expected,
                value,
            }),
        None => Ok(default),
    }
}

/// The ordered list of pairs the replay walks through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roster {
    pairs: Vec<Pair>,
}

impl Roster {
    pub fn new(pairs: Vec<Pair>) -> Result<Self, ConfigError> {
        if pairs.is_empty() {
            return Err(ConfigError::EmptyRoster);
        }
        Ok(Self { pairs })
    }

    /// Load `[{"member": "...", "teammate": "..."}, ...]` from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::RosterIo {
            path: path.display().to_string(),
            source,
        })?;
        let pairs: Vec<Pair> =
            serde_json::from_str(&text).map_err(|source| ConfigError::RosterFormat {
                path: path.display().to_string(),
                source,
            })?;
        info!("Loaded {} pairs from {}", pairs.len(), path.display());
        Self::new(pairs)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Pair> {
        self.pairs.get(index)
    }
}
