pub mod backfill;
pub mod backfill_plan;
pub mod config;
pub mod error;
pub mod feed_source;
pub mod match_feed;
pub mod player_rows;
pub mod records;
pub mod replay_feed;
pub mod stat_schema;
pub mod statsperform;
pub mod team_rows;
pub mod warehouse;

pub use backfill::{BackfillOptions, BackfillSummary, SkippedMatch, run_backfill, run_plan};
pub use backfill_plan::{Aspect, PlanEntry, ProcessedMatchIndex, plan};
pub use error::{NormalizeError, SkipReason};
pub use feed_source::{FeedSource, MatchListing, MatchSummary};
pub use stat_schema::StatSchema;
pub use warehouse::{Warehouse, WarehouseSink};
