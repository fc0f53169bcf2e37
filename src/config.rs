use std::env;
use std::path::PathBuf;

use crate::statsperform::DEFAULT_BASE_URL;

const CACHE_DIR: &str = "matchstats_backfill";
const DB_FILE: &str = "matchstats.sqlite";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_PARALLELISM: usize = 1;

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub outlet_key: Option<String>,
    pub base_url: String,
    pub proxy: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub feed: FeedSettings,
    pub db_path: Option<PathBuf>,
    pub schema_path: Option<PathBuf>,
    pub parallelism: usize,
}

impl Settings {
    /// Reads settings from the process environment. Call
    /// [`load_dotenv`] first so `.env` files are honored.
    pub fn from_env() -> Self {
        Self {
            feed: FeedSettings {
                outlet_key: env_non_empty("STATSPERFORM_API_KEY"),
                base_url: env_non_empty("STATSPERFORM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
                proxy: env_non_empty("STATSPERFORM_PROXY"),
                timeout_secs: env_non_empty("HTTP_TIMEOUT_SECS")
                    .and_then(|val| val.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_TIMEOUT_SECS)
                    .clamp(1, 600),
            },
            db_path: env_non_empty("MATCHSTATS_DB")
                .map(PathBuf::from)
                .or_else(default_db_path),
            schema_path: env_non_empty("STAT_SCHEMA_PATH").map(PathBuf::from),
            parallelism: env_non_empty("FETCH_PARALLELISM")
                .and_then(|val| val.parse::<usize>().ok())
                .unwrap_or(DEFAULT_PARALLELISM)
                .clamp(1, 32),
        }
    }
}

pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

pub fn app_cache_dir() -> Option<PathBuf> {
    if let Some(base) = env_non_empty("XDG_CACHE_HOME") {
        return Some(PathBuf::from(base).join(CACHE_DIR));
    }
    let home = env_non_empty("HOME")?;
    Some(PathBuf::from(home).join(".cache").join(CACHE_DIR))
}

pub fn default_db_path() -> Option<PathBuf> {
    app_cache_dir().map(|dir| dir.join(DB_FILE))
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
