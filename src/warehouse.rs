use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params, params_from_iter};
use tracing::{debug, info};

use crate::backfill::BackfillSummary;
use crate::backfill_plan::Aspect;
use crate::records::{
    PLAYER_IDENTITY_COLUMNS, PlayerRecord, TEAM_IDENTITY_COLUMNS, TeamRecord,
    player_column_names, team_column_names,
};
use crate::stat_schema::{FieldSet, StatSchema};

pub const TEAM_TABLE: &str = "team_match_stats";
pub const PLAYER_TABLE: &str = "player_match_stats";
const META_COLUMNS: [&str; 2] = ["schema_fingerprint", "loaded_at"];

/// Write side of the pipeline. Appends never touch rows already stored.
pub trait WarehouseSink {
    fn persisted_match_ids(&self, aspect: Aspect) -> Result<HashSet<String>>;

    fn append_team_rows(&mut self, schema: &StatSchema, rows: &[TeamRecord]) -> Result<usize>;

    fn append_player_rows(&mut self, schema: &StatSchema, rows: &[PlayerRecord])
    -> Result<usize>;
}

pub fn table_for(aspect: Aspect) -> &'static str {
    match aspect {
        Aspect::Team => TEAM_TABLE,
        Aspect::Player => PLAYER_TABLE,
    }
}

/// SQLite-backed warehouse. The connection is owned by this handle and
/// closed when it is dropped.
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    pub fn open(path: &Path, schema: &StatSchema) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn =
            Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))?;
        Self::from_connection(conn, schema)
    }

    pub fn open_in_memory(schema: &StatSchema) -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        Self::from_connection(conn, schema)
    }

    fn from_connection(conn: Connection, schema: &StatSchema) -> Result<Self> {
        init_schema(&conn, schema)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn count_rows(&self, aspect: Aspect) -> Result<usize> {
        let sql = format!("SELECT COUNT(*) FROM {}", table_for(aspect));
        let n = self
            .conn
            .query_row(&sql, [], |row| row.get::<_, i64>(0))
            .with_context(|| format!("count rows in {}", table_for(aspect)))?;
        Ok(n as usize)
    }

    /// Stores the outcome of one backfill run in `ingest_runs`.
    pub fn record_run(
        &mut self,
        schema: &StatSchema,
        started_at: &str,
        summary: &BackfillSummary,
    ) -> Result<i64> {
        let skipped_json =
            serde_json::to_string(&summary.skipped).unwrap_or_else(|_| "[]".to_string());
        self.conn
            .execute(
                "INSERT INTO ingest_runs(
                    started_at, finished_at, tournament_calendar_id, schema_version,
                    schema_fingerprint, matches_listed, matches_planned, matches_processed,
                    team_rows_written, player_rows_written, skipped_json)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    started_at,
                    Utc::now().to_rfc3339(),
                    summary.tournament_calendar_id,
                    schema.version,
                    schema.fingerprint(),
                    summary.matches_listed as i64,
                    summary.matches_planned as i64,
                    summary.matches_processed as i64,
                    summary.team_rows_written as i64,
                    summary.player_rows_written as i64,
                    skipped_json,
                ],
            )
            .context("insert ingest run")?;
        Ok(self.conn.last_insert_rowid())
    }

    fn append(
        &mut self,
        table: &str,
        columns: &[String],
        rows: impl Iterator<Item = Vec<SqlValue>>,
    ) -> Result<usize> {
        let sql = insert_sql(table, columns);
        let tx = self.conn.transaction().context("begin append transaction")?;
        let mut written = 0usize;
        {
            let mut stmt = tx
                .prepare(&sql)
                .with_context(|| format!("prepare insert into {table}"))?;
            for values in rows {
                stmt.execute(params_from_iter(values))
                    .with_context(|| format!("insert into {table}"))?;
                written += 1;
            }
        }
        tx.commit().context("commit append transaction")?;
        debug!(table, rows = written, "appended rows");
        Ok(written)
    }
}

impl WarehouseSink for Warehouse {
    fn persisted_match_ids(&self, aspect: Aspect) -> Result<HashSet<String>> {
        let table = table_for(aspect);
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT DISTINCT match_id FROM {table}"))
            .with_context(|| format!("prepare match id query on {table}"))?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .with_context(|| format!("query match ids from {table}"))?;
        let mut out = HashSet::new();
        for row in rows {
            out.insert(row.context("decode match id")?);
        }
        Ok(out)
    }

    fn append_team_rows(&mut self, schema: &StatSchema, rows: &[TeamRecord]) -> Result<usize> {
        check_widths(rows.iter().map(|r| r.stats.len()), schema.team.len(), TEAM_TABLE)?;
        let columns = with_meta(team_column_names(&schema.team));
        let fingerprint = schema.fingerprint();
        let loaded_at = Utc::now().to_rfc3339();
        let values = rows.iter().map(|r| {
            let mut v = vec![
                text(&r.competition_id),
                text(&r.competition_name),
                text(&r.tournament_calendar_id),
                text(&r.tournament_calendar_name),
                text(&r.match_id),
                text(&r.match_date),
                text(&r.team_id),
                text(&r.team_name),
                text(&r.opponent_id),
                SqlValue::Integer(r.home.into()),
                opt_text(r.formation_used.as_deref()),
            ];
            v.extend(r.stats.values().iter().map(|x| SqlValue::Real(*x)));
            v.push(text(&fingerprint));
            v.push(text(&loaded_at));
            v
        });
        self.append(TEAM_TABLE, &columns, values)
    }

    fn append_player_rows(
        &mut self,
        schema: &StatSchema,
        rows: &[PlayerRecord],
    ) -> Result<usize> {
        check_widths(rows.iter().map(|r| r.stats.len()), schema.player.len(), PLAYER_TABLE)?;
        let columns = with_meta(player_column_names(&schema.player));
        let fingerprint = schema.fingerprint();
        let loaded_at = Utc::now().to_rfc3339();
        let values = rows.iter().map(|r| {
            let mut v = vec![
                text(&r.match_id),
                text(&r.match_date),
                text(&r.team_id),
                SqlValue::Integer(r.home.into()),
                text(&r.player_id),
                text(&r.match_name),
                text(&r.position),
                opt_text(r.position_side.as_deref()),
                SqlValue::Integer(r.is_sub.into()),
            ];
            v.extend(r.stats.values().iter().map(|x| SqlValue::Real(*x)));
            v.push(text(&fingerprint));
            v.push(text(&loaded_at));
            v
        });
        self.append(PLAYER_TABLE, &columns, values)
    }
}

pub fn init_schema(conn: &Connection, schema: &StatSchema) -> Result<()> {
    check_no_collisions(&schema.team, &TEAM_IDENTITY_COLUMNS)?;
    check_no_collisions(&schema.player, &PLAYER_IDENTITY_COLUMNS)?;

    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS team_match_stats (
            competition_id TEXT NOT NULL,
            competition_name TEXT NOT NULL,
            tournament_calendar_id TEXT NOT NULL,
            tournament_calendar_name TEXT NOT NULL,
            match_id TEXT NOT NULL,
            match_date TEXT NOT NULL,
            team_id TEXT NOT NULL,
            team_name TEXT NOT NULL,
            opponent_id TEXT NOT NULL,
            home INTEGER NOT NULL,
            formation_used TEXT NULL,
            schema_fingerprint TEXT NOT NULL,
            loaded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_team_match_stats_match ON team_match_stats(match_id);

        CREATE TABLE IF NOT EXISTS player_match_stats (
            match_id TEXT NOT NULL,
            match_date TEXT NOT NULL,
            team_id TEXT NOT NULL,
            home INTEGER NOT NULL,
            player_id TEXT NOT NULL,
            match_name TEXT NOT NULL,
            position TEXT NOT NULL,
            position_side TEXT NULL,
            is_sub INTEGER NOT NULL,
            schema_fingerprint TEXT NOT NULL,
            loaded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_player_match_stats_match ON player_match_stats(match_id);

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            tournament_calendar_id TEXT NOT NULL,
            schema_version TEXT NOT NULL,
            schema_fingerprint TEXT NOT NULL,
            matches_listed INTEGER NOT NULL,
            matches_planned INTEGER NOT NULL,
            matches_processed INTEGER NOT NULL,
            team_rows_written INTEGER NOT NULL,
            player_rows_written INTEGER NOT NULL,
            skipped_json TEXT NOT NULL
        );
        "#,
    )
    .context("create sqlite schema")?;

    sync_stat_columns(conn, TEAM_TABLE, &schema.team)?;
    sync_stat_columns(conn, PLAYER_TABLE, &schema.player)?;
    Ok(())
}

/// Adds a zero-defaulted REAL column for every schema field the table does
/// not have yet. Columns are never dropped, so rows written under older
/// schemas stay readable.
fn sync_stat_columns(conn: &Connection, table: &str, fields: &FieldSet) -> Result<()> {
    let existing = existing_columns(conn, table)?;
    let mut added = 0usize;
    for name in fields.names() {
        if existing.contains(name) {
            continue;
        }
        conn.execute_batch(&format!(
            "ALTER TABLE {table} ADD COLUMN {} REAL NOT NULL DEFAULT 0",
            quote_ident(name)
        ))
        .with_context(|| format!("add column {name} to {table}"))?;
        added += 1;
    }
    if added > 0 {
        info!(table, added, "added stat columns");
    }
    Ok(())
}

fn existing_columns(conn: &Connection, table: &str) -> Result<HashSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("read columns of {table}"))?;
    let mut out = HashSet::new();
    for row in rows {
        out.insert(row.context("decode column name")?);
    }
    Ok(out)
}

fn check_no_collisions(fields: &FieldSet, identity: &[&str]) -> Result<()> {
    for reserved in identity.iter().chain(META_COLUMNS.iter()) {
        if fields.names().iter().any(|n| n.eq_ignore_ascii_case(reserved)) {
            return Err(anyhow!("stat field {reserved:?} collides with a reserved column"));
        }
    }
    Ok(())
}

fn check_widths(widths: impl Iterator<Item = usize>, expected: usize, table: &str) -> Result<()> {
    for width in widths {
        if width != expected {
            return Err(anyhow!(
                "row for {table} has {width} stats but the schema has {expected}"
            ));
        }
    }
    Ok(())
}

fn with_meta(mut columns: Vec<String>) -> Vec<String> {
    columns.extend(META_COLUMNS.iter().map(|s| s.to_string()));
    columns
}

fn insert_sql(table: &str, columns: &[String]) -> String {
    let names = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    format!("INSERT INTO {table} ({names}) VALUES ({placeholders})")
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn text(s: &str) -> SqlValue {
    SqlValue::Text(s.to_string())
}

fn opt_text(s: Option<&str>) -> SqlValue {
    s.map(text).unwrap_or(SqlValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(team: &[&str], player: &[&str]) -> StatSchema {
        StatSchema::new(
            "test",
            team.iter().map(|s| s.to_string()).collect(),
            player.iter().map(|s| s.to_string()).collect(),
        )
        .unwrap()
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("goals"), "\"goals\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(
            insert_sql("t", &["a".to_string(), "b".to_string()]),
            "INSERT INTO t (\"a\", \"b\") VALUES (?1, ?2)"
        );
    }

    #[test]
    fn reserved_names_are_rejected() {
        let bad = schema(&["home"], &["minsPlayed"]);
        assert!(Warehouse::open_in_memory(&bad).is_err());
    }

    #[test]
    fn new_schema_fields_become_columns() {
        let v1 = schema(&["goals"], &["minsPlayed"]);
        let wh = Warehouse::open_in_memory(&v1).unwrap();
        let v2 = schema(&["goals", "saves"], &["minsPlayed", "touches"]);
        init_schema(wh.connection(), &v2).unwrap();

        let team_cols = existing_columns(wh.connection(), TEAM_TABLE).unwrap();
        assert!(team_cols.contains("saves"));
        let player_cols = existing_columns(wh.connection(), PLAYER_TABLE).unwrap();
        assert!(player_cols.contains("touches"));
        assert!(player_cols.contains("is_sub"));
    }
}
