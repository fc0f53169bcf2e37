use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use reqwest::blocking::Client;
use reqwest::header::USER_AGENT;
use serde_json::Value;
use tracing::debug;

use crate::config::FeedSettings;
use crate::feed_source::{FeedSource, MatchListing, parse_match_list};

pub const DEFAULT_BASE_URL: &str = "https://api.performfeeds.com/soccerdata";
const MATCH_LIST_PAGE_SIZE: u32 = 1000;

/// Blocking client for the StatsPerform soccerdata REST feeds.
pub struct StatsPerformClient {
    client: Client,
    base_url: String,
    outlet_key: String,
}

impl StatsPerformClient {
    pub fn new(settings: &FeedSettings) -> Result<Self> {
        let outlet_key = settings
            .outlet_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("STATSPERFORM_API_KEY is not set"))?;

        let mut builder = Client::builder().timeout(Duration::from_secs(settings.timeout_secs));
        if let Some(proxy) = settings.proxy.as_deref() {
            builder = builder.proxy(
                reqwest::Proxy::all(proxy).with_context(|| format!("invalid proxy url {proxy}"))?,
            );
        }
        let client = builder.build().context("failed to build http client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            outlet_key,
        })
    }

    pub fn match_list_url(&self, tournament_calendar_id: &str) -> String {
        format!(
            "{}/match/{}?_rt=b&_fmt=json&tmcl={}&_pgSz={}",
            self.base_url, self.outlet_key, tournament_calendar_id, MATCH_LIST_PAGE_SIZE
        )
    }

    pub fn match_stats_url(&self, match_id: &str) -> String {
        format!(
            "{}/matchstats/{}?_rt=b&_fmt=json&fx={}&detailed=yes&people=yes",
            self.base_url, self.outlet_key, match_id
        )
    }

    fn get_json(&self, url: &str) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, "matchstats_backfill/0.1")
            .send()
            .context("request failed")?;
        let status = resp.status();
        let body = resp.text().context("failed reading body")?;
        if !status.is_success() {
            return Err(anyhow!("http {}: {}", status, truncate(&body, 200)));
        }
        serde_json::from_str::<Value>(body.trim()).context("invalid feed json")
    }
}

impl FeedSource for StatsPerformClient {
    fn fetch_match_list(&self, tournament_calendar_id: &str) -> Result<MatchListing> {
        debug!(tmcl = tournament_calendar_id, "fetching match list");
        let value = self
            .get_json(&self.match_list_url(tournament_calendar_id))
            .with_context(|| format!("fetch match list for {tournament_calendar_id}"))?;
        parse_match_list(&value)
    }

    fn fetch_match_feed(&self, match_id: &str) -> Result<Value> {
        debug!(match_id, "fetching matchstats feed");
        self.get_json(&self.match_stats_url(match_id))
            .with_context(|| format!("fetch matchstats for {match_id}"))
    }
}

fn truncate(raw: &str, max: usize) -> &str {
    match raw.char_indices().nth(max) {
        Some((idx, _)) => &raw[..idx],
        None => raw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> FeedSettings {
        FeedSettings {
            outlet_key: Some("KEY".to_string()),
            base_url: "https://feeds.example/soccerdata/".to_string(),
            proxy: None,
            timeout_secs: 5,
        }
    }

    #[test]
    fn builds_feed_urls() {
        let client = StatsPerformClient::new(&settings()).unwrap();
        assert_eq!(
            client.match_list_url("tm1"),
            "https://feeds.example/soccerdata/match/KEY?_rt=b&_fmt=json&tmcl=tm1&_pgSz=1000"
        );
        assert_eq!(
            client.match_stats_url("fx9"),
            "https://feeds.example/soccerdata/matchstats/KEY?_rt=b&_fmt=json&fx=fx9&detailed=yes&people=yes"
        );
    }

    #[test]
    fn missing_key_is_rejected() {
        let mut s = settings();
        s.outlet_key = Some("  ".to_string());
        assert!(StatsPerformClient::new(&s).is_err());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("ab", 10), "ab");
    }
}
