use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde_json::Value;

use crate::feed_source::{FeedSource, MatchListing, parse_match_list_json};

/// Serves previously saved provider responses from a directory:
/// `match_<tmcl>.json` for listings and `matchstats_<match_id>.json` for
/// per-match documents.
#[derive(Debug, Clone)]
pub struct ReplayFeed {
    dir: PathBuf,
}

impl ReplayFeed {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self, name: &str) -> Result<String> {
        let path = self.dir.join(name);
        fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))
    }
}

impl FeedSource for ReplayFeed {
    fn fetch_match_list(&self, tournament_calendar_id: &str) -> Result<MatchListing> {
        let raw = self.read(&format!("match_{tournament_calendar_id}.json"))?;
        parse_match_list_json(&raw)
    }

    fn fetch_match_feed(&self, match_id: &str) -> Result<Value> {
        let raw = self.read(&format!("matchstats_{match_id}.json"))?;
        serde_json::from_str::<Value>(raw.trim())
            .with_context(|| format!("invalid matchstats json for {match_id}"))
    }
}
