use std::collections::BTreeMap;

use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::backfill_plan::{Aspect, PlanEntry, ProcessedMatchIndex, plan};
use crate::error::{NormalizeResult, SkipReason};
use crate::feed_source::FeedSource;
use crate::match_feed::RawMatchFeed;
use crate::player_rows::build_player_rows;
use crate::records::{PlayerRecord, TeamRecord};
use crate::stat_schema::StatSchema;
use crate::team_rows::build_team_rows;
use crate::warehouse::WarehouseSink;

#[derive(Debug, Clone, Copy)]
pub struct BackfillOptions {
    pub match_limit: Option<usize>,
    pub parallelism: usize,
    pub include_unplayed: bool,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            match_limit: None,
            parallelism: 1,
            include_unplayed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedMatch {
    pub match_id: String,
    pub aspects: Vec<Aspect>,
    pub reason: SkipReason,
    pub detail: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackfillSummary {
    pub tournament_calendar_id: String,
    pub matches_listed: usize,
    pub matches_unreadable: usize,
    pub matches_unplayed: usize,
    pub matches_planned: usize,
    pub matches_processed: usize,
    pub team_rows_written: usize,
    pub player_rows_written: usize,
    pub skipped: Vec<SkippedMatch>,
}

impl BackfillSummary {
    pub fn skipped_by_reason(&self) -> BTreeMap<&'static str, usize> {
        let mut out = BTreeMap::new();
        for item in &self.skipped {
            *out.entry(item.reason.as_str()).or_insert(0) += 1;
        }
        out
    }
}

enum EntryOutcome {
    Unavailable {
        reason: SkipReason,
        detail: String,
    },
    Built {
        team: Option<NormalizeResult<Vec<TeamRecord>>>,
        player: Option<NormalizeResult<Vec<PlayerRecord>>>,
    },
}

/// Lists the tournament calendar, diffs it against what the warehouse already
/// holds and processes the remainder.
pub fn run_backfill<F, S>(
    feed: &F,
    sink: &mut S,
    schema: &StatSchema,
    tournament_calendar_id: &str,
    options: BackfillOptions,
) -> Result<BackfillSummary>
where
    F: FeedSource,
    S: WarehouseSink,
{
    let listing = feed
        .fetch_match_list(tournament_calendar_id)
        .with_context(|| format!("list matches for tournament calendar {tournament_calendar_id}"))?;
    let listed = &listing.matches;
    let match_ids = listed
        .iter()
        .filter(|m| options.include_unplayed || m.is_played())
        .map(|m| m.id.as_str())
        .collect::<Vec<_>>();

    let done = ProcessedMatchIndex {
        team: sink
            .persisted_match_ids(Aspect::Team)
            .context("read persisted team match ids")?,
        player: sink
            .persisted_match_ids(Aspect::Player)
            .context("read persisted player match ids")?,
    };
    let work = plan(&match_ids, &done, options.match_limit);
    info!(
        tmcl = tournament_calendar_id,
        listed = listed.len(),
        unreadable = listing.unreadable,
        eligible = match_ids.len(),
        team_done = done.team.len(),
        player_done = done.player.len(),
        planned = work.len(),
        "backfill planned"
    );

    let mut summary = run_plan(feed, sink, schema, &work, options.parallelism)?;
    summary.tournament_calendar_id = tournament_calendar_id.to_string();
    summary.matches_listed = listed.len();
    summary.matches_unreadable = listing.unreadable;
    summary.matches_unplayed = listed.len() - match_ids.len();
    Ok(summary)
}

/// Processes every plan entry, then flushes each non-empty batch with a
/// single append. Per-match failures are recorded in the summary; only sink
/// failures are returned as errors.
pub fn run_plan<F, S>(
    feed: &F,
    sink: &mut S,
    schema: &StatSchema,
    work: &[PlanEntry],
    parallelism: usize,
) -> Result<BackfillSummary>
where
    F: FeedSource,
    S: WarehouseSink,
{
    let outcomes = if parallelism <= 1 {
        work.iter()
            .map(|entry| process_entry(feed, schema, entry))
            .collect::<Vec<_>>()
    } else {
        let pool = build_fetch_pool(parallelism);
        with_fetch_pool(&pool, || {
            work.par_iter()
                .map(|entry| process_entry(feed, schema, entry))
                .collect::<Vec<_>>()
        })
    };

    let mut summary = BackfillSummary {
        matches_planned: work.len(),
        ..BackfillSummary::default()
    };
    let mut team_batch = Vec::new();
    let mut player_batch = Vec::new();

    for (entry, outcome) in work.iter().zip(outcomes) {
        match outcome {
            EntryOutcome::Unavailable { reason, detail } => {
                warn!(match_id = %entry.match_id, %reason, %detail, "match skipped");
                summary.skipped.push(SkippedMatch {
                    match_id: entry.match_id.clone(),
                    aspects: Aspect::ALL.into_iter().filter(|a| entry.needs(*a)).collect(),
                    reason,
                    detail,
                });
            }
            EntryOutcome::Built { team, player } => {
                let mut complete = true;
                if let Some(result) = team {
                    match result {
                        Ok(rows) => team_batch.extend(rows),
                        Err(err) => {
                            complete = false;
                            warn!(match_id = %entry.match_id, aspect = "team", error = %err, "aspect skipped");
                            summary.skipped.push(SkippedMatch {
                                match_id: entry.match_id.clone(),
                                aspects: vec![Aspect::Team],
                                reason: err.reason(),
                                detail: err.to_string(),
                            });
                        }
                    }
                }
                if let Some(result) = player {
                    match result {
                        Ok(rows) => player_batch.extend(rows),
                        Err(err) => {
                            complete = false;
                            warn!(match_id = %entry.match_id, aspect = "player", error = %err, "aspect skipped");
                            summary.skipped.push(SkippedMatch {
                                match_id: entry.match_id.clone(),
                                aspects: vec![Aspect::Player],
                                reason: err.reason(),
                                detail: err.to_string(),
                            });
                        }
                    }
                }
                if complete {
                    summary.matches_processed += 1;
                }
            }
        }
    }

    if !team_batch.is_empty() {
        summary.team_rows_written = sink
            .append_team_rows(schema, &team_batch)
            .context("flush team rows")?;
    }
    if !player_batch.is_empty() {
        summary.player_rows_written = sink
            .append_player_rows(schema, &player_batch)
            .context("flush player rows")?;
    }

    info!(
        planned = summary.matches_planned,
        processed = summary.matches_processed,
        skipped = summary.skipped.len(),
        team_rows = summary.team_rows_written,
        player_rows = summary.player_rows_written,
        "backfill finished"
    );
    Ok(summary)
}

/// The fetched document lives only for this entry and is shared by both
/// builders.
fn process_entry<F: FeedSource>(feed: &F, schema: &StatSchema, entry: &PlanEntry) -> EntryOutcome {
    let value = match feed.fetch_match_feed(&entry.match_id) {
        Ok(value) => value,
        Err(err) => {
            return EntryOutcome::Unavailable {
                reason: SkipReason::FetchFailed,
                detail: format!("{err:#}"),
            };
        }
    };
    let raw = match RawMatchFeed::from_value(&value) {
        Ok(raw) => raw,
        Err(err) => {
            return EntryOutcome::Unavailable {
                reason: err.reason(),
                detail: err.to_string(),
            };
        }
    };
    if raw.match_id() != entry.match_id {
        return EntryOutcome::Unavailable {
            reason: SkipReason::MalformedMatchFeed,
            detail: format!("feed is for match {}", raw.match_id()),
        };
    }

    EntryOutcome::Built {
        team: entry.needs_team.then(|| build_team_rows(schema, &raw)),
        player: entry.needs_player.then(|| build_player_rows(schema, &raw)),
    }
}

fn build_fetch_pool(threads: usize) -> Option<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .ok()
}

fn with_fetch_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}
