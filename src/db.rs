//! SQLite sink for poll reports and lottery draws
//!
//! Tables (see `sql/`):
//! - `poll_reports` - INSERT, one row per applied poll
//! - `lottery_draws` - INSERT, append-only draw log

use {
    crate::{
        error::{TrackerError, TrackerResult},
        selection::Winner,
        session::PollReport,
    },
    async_trait::async_trait,
    rusqlite::Connection,
    std::{
        fs, io,
        path::Path,
        sync::{Arc, Mutex, MutexGuard},
    },
};

/// Writer for analytics output
#[async_trait]
pub trait ReportDbWriter: Send + Sync {
    /// Append one poll report
    async fn write_poll_report(&self, report: &PollReport) -> TrackerResult<()>;

    /// Append one lottery draw
    async fn write_draw(&self, mint: &str, winner: &Winner) -> TrackerResult<()>;
}

/// Run schema migrations from SQL files
///
/// Executes every `.sql` file in `schema_dir` in file-name order. Files must
/// use `IF NOT EXISTS` so the migration is idempotent.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> TrackerResult<()> {
    let schema_path = Path::new(schema_dir);

    if !schema_path.exists() {
        return Err(TrackerError::Persistence(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Schema directory not found: {}", schema_dir),
        )));
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;
    log::info!("📊 Enabled WAL mode for SQLite database");

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();

    sql_files.sort_by_key(|entry| entry.file_name());

    log::info!("🔧 Running schema migrations from: {}", schema_dir);

    for entry in sql_files {
        let path = entry.path();
        let filename = entry.file_name().to_string_lossy().into_owned();

        log::info!("   ├─ Executing: {}", filename);
        let sql_content = fs::read_to_string(&path)?;
        conn.execute_batch(&sql_content)?;
    }

    log::info!("✅ All schema migrations completed successfully");
    Ok(())
}

/// rusqlite-backed `ReportDbWriter`
pub struct SqliteReportWriter {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteReportWriter {
    /// Open a writer on an existing database
    ///
    /// The schema must already be in place (see `run_schema_migrations`).
    pub fn new(db_path: &str) -> TrackerResult<Self> {
        let conn = Connection::open(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> TrackerResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| {
            TrackerError::Persistence(io::Error::new(
                io::ErrorKind::Other,
                "sqlite connection lock poisoned",
            ))
        })
    }

    /// Number of stored poll reports for a mint
    pub fn count_reports(&self, mint: &str) -> TrackerResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM poll_reports WHERE mint = ?1",
            [mint],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Number of stored draws for an owner that triggered the streak bonus
    pub fn count_bonus_draws(&self, mint: &str, owner: &str) -> TrackerResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM lottery_draws WHERE mint = ?1 AND owner = ?2 AND bonus_triggered = 1",
            [mint, owner],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[async_trait]
impl ReportDbWriter for SqliteReportWriter {
    async fn write_poll_report(&self, report: &PollReport) -> TrackerResult<()> {
        let changes_json = serde_json::to_string(&report.changes)?;
        let top_stats_json = serde_json::to_string(&report.top_stats)?;
        let now = chrono::Utc::now().timestamp();

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO poll_reports (
                mint, poll, taken_at, holder_count,
                present, total, unchanged, full_exits, exited,
                still_present, gone_from_initial, new_since_last_poll, ever_new_entrants,
                changes_json, top_stats_json, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                report.mint,
                report.poll as i64,
                report.taken_at,
                report.holder_count as i64,
                report.changes.current,
                report.changes.total,
                report.changes.unchanged,
                report.changes.sold(100),
                report.changes.exited,
                report.top_stats.still_present as i64,
                report.top_stats.gone_from_initial as i64,
                report.top_stats.new_since_last_poll as i64,
                report.top_stats.ever_new_entrants as i64,
                changes_json,
                top_stats_json,
                now,
            ],
        )?;

        Ok(())
    }

    async fn write_draw(&self, mint: &str, winner: &Winner) -> TrackerResult<()> {
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO lottery_draws (
                mint, owner, amount, mode, streak, bonus_triggered,
                eligible_count, total_weight, chance_pct, drawn_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                mint,
                winner.owner,
                winner.amount.to_string(),
                winner.mode.to_string(),
                winner.streak,
                winner.bonus_triggered,
                winner.eligible_count as i64,
                winner.total_weight.to_string(),
                winner.chance_pct,
                winner.drawn_at,
            ],
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        selection::SelectionMode,
        session::{SessionSettings, TrackingSession},
        snapshot::{HolderBalance, Snapshot},
    };
    use tempfile::NamedTempFile;

    fn create_test_db() -> (NamedTempFile, SqliteReportWriter) {
        let temp_file = NamedTempFile::new().unwrap();
        let db_path = temp_file.path().to_str().unwrap().to_string();

        let mut conn = Connection::open(&db_path).unwrap();
        run_schema_migrations(&mut conn, concat!(env!("CARGO_MANIFEST_DIR"), "/sql")).unwrap();
        drop(conn);

        let writer = SqliteReportWriter::new(&db_path).unwrap();
        (temp_file, writer)
    }

    fn winner(owner: &str, streak: u32, bonus_triggered: bool) -> Winner {
        Winner {
            owner: owner.to_string(),
            amount: u64::MAX,
            mode: SelectionMode::Weighted,
            streak,
            bonus_triggered,
            eligible_count: 2,
            total_weight: u64::MAX as u128 + 10,
            chance_pct: 99.9,
            drawn_at: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_missing_schema_dir() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert!(run_schema_migrations(&mut conn, "/definitely/not/here").is_err());
    }

    #[test]
    fn test_migrations_are_idempotent() {
        let (temp, _writer) = create_test_db();
        let mut conn = Connection::open(temp.path()).unwrap();
        run_schema_migrations(&mut conn, concat!(env!("CARGO_MANIFEST_DIR"), "/sql")).unwrap();
    }

    #[tokio::test]
    async fn test_write_poll_report() {
        let (_temp, writer) = create_test_db();

        let mut session = TrackingSession::start("mint", SessionSettings::default());
        let snapshot = Snapshot::new("mint", 0, 1, vec![HolderBalance::new("A", 10)]);
        let report = session.apply_snapshot(&snapshot, 1).unwrap().unwrap();

        writer.write_poll_report(&report).await.unwrap();
        writer.write_poll_report(&report).await.unwrap();
        assert_eq!(writer.count_reports("mint").unwrap(), 2);
        assert_eq!(writer.count_reports("other").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_draw_keeps_large_amounts() {
        let (temp, writer) = create_test_db();

        writer.write_draw("mint", &winner("A", 2, false)).await.unwrap();
        writer.write_draw("mint", &winner("A", 3, true)).await.unwrap();
        assert_eq!(writer.count_bonus_draws("mint", "A").unwrap(), 1);

        let conn = Connection::open(temp.path()).unwrap();
        let amount: String = conn
            .query_row("SELECT amount FROM lottery_draws WHERE streak = 3", [], |row| row.get(0))
            .unwrap();
        assert_eq!(amount, u64::MAX.to_string());
    }
}
