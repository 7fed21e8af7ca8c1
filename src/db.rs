// 🗄️ Storage Engine - SQLite + WAL
//
// One connection per operation, dropped when the operation ends. Writes run
// in BEGIN IMMEDIATE transactions: the write lock is taken before the first
// read, so every read-decide-write sequence is serialized against all other
// writers. Lock waits are bounded by the busy timeout.

use crate::entities::{attendance, member, payment, AttendanceRecord, Member, PaymentObligation};
use crate::error::LedgerResult;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Shared handle to the membership database
///
/// Cheap to clone; holds no open connection.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    busy_timeout: Duration,
}

impl Store {
    /// Open (creating if needed) the database file at `path` and set up the schema
    ///
    /// The parent directory must already exist; `Config::open_store` creates it.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> LedgerResult<Self> {
        let path = path.as_ref().to_path_buf();

        let store = Store { path, busy_timeout };
        let conn = store.connect()?;
        setup_database(&conn)?;
        debug!(path = %store.path.display(), "Database initialized");

        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn connect(&self) -> rusqlite::Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Run a read-only operation on a fresh connection
    pub fn read<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Connection) -> LedgerResult<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Run `f` inside an immediate transaction
    ///
    /// Commits when `f` returns `Ok`. Any `Err` (storage or domain) and any
    /// panic drops the transaction, which rolls it back.
    pub fn write<T, F>(&self, f: F) -> LedgerResult<T>
    where
        F: FnOnce(&Transaction<'_>) -> LedgerResult<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    // ========================================================================
    // RAW TABLE SCANS (for dumps)
    // ========================================================================

    pub fn list_members(&self) -> LedgerResult<Vec<Member>> {
        self.read(|conn| Ok(member::all_members(conn)?))
    }

    pub fn list_attendance_records(&self) -> LedgerResult<Vec<AttendanceRecord>> {
        self.read(|conn| Ok(attendance::all_cursors(conn)?))
    }

    pub fn list_obligations(&self) -> LedgerResult<Vec<PaymentObligation>> {
        self.read(|conn| Ok(payment::all_obligations(conn)?))
    }
}

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery and concurrent readers
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS members (
            member_code TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            transport TEXT NOT NULL,
            fee INTEGER NOT NULL CHECK (fee > 0),
            registered_at TEXT NOT NULL
        );

        -- One cursor row per member, updated in place
        CREATE TABLE IF NOT EXISTS attendance_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_code TEXT NOT NULL UNIQUE,
            visit_number INTEGER NOT NULL CHECK (visit_number >= 0),
            timestamp TEXT NOT NULL,
            seq INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (member_code) REFERENCES members (member_code)
        );

        CREATE TABLE IF NOT EXISTS payment_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            member_code TEXT NOT NULL,
            payment_due INTEGER NOT NULL CHECK (payment_due > 0),
            paid INTEGER NOT NULL DEFAULT 0,
            timestamp TEXT NOT NULL,
            paid_at TEXT,
            FOREIGN KEY (member_code) REFERENCES members (member_code)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_payment_one_unpaid
            ON payment_log(member_code) WHERE paid = 0;

        CREATE INDEX IF NOT EXISTS idx_payment_member
            ON payment_log(member_code);

        CREATE INDEX IF NOT EXISTS idx_attendance_timestamp
            ON attendance_log(timestamp);

        CREATE INDEX IF NOT EXISTS idx_payment_timestamp
            ON payment_log(timestamp);",
    )?;

    add_attendance_seq(conn)?;

    Ok(())
}

/// Add `attendance_log.seq` to databases created before it existed
fn add_attendance_seq(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('attendance_log')")?;
    let columns = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;

    if !columns.iter().any(|c| c == "seq") {
        conn.execute_batch(
            "ALTER TABLE attendance_log ADD COLUMN seq INTEGER NOT NULL DEFAULT 0;
             UPDATE attendance_log SET seq = id;",
        )?;
        debug!("Added attendance_log.seq");
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// Store backed by a file in a temp dir; keep the dir alive for the test
    pub fn temp_store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("memberships.db"), Duration::from_secs(5)).unwrap();
        (dir, store)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_store;
    use super::*;
    use crate::entities::Transport;
    use crate::error::LedgerError;
    use chrono::Utc;

    fn seed_member(store: &Store, code: &str) {
        store
            .write(|tx| {
                member::insert_member(
                    tx,
                    &Member::new(code.to_string(), "Seed".to_string(), Transport::Bus, 100_000),
                )?;
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_setup_is_idempotent() {
        let (dir, store) = temp_store();
        seed_member(&store, "MEM-AAAAAAAAAAAA");

        // Re-opening must not drop or duplicate anything
        let reopened = Store::open(store.path(), Duration::from_secs(5)).unwrap();
        assert_eq!(reopened.list_members().unwrap().len(), 1);
        drop(dir);
    }

    #[test]
    fn test_write_rolls_back_on_error() {
        let (_dir, store) = temp_store();

        let result: LedgerResult<()> = store.write(|tx| {
            member::insert_member(
                tx,
                &Member::new("MEM-BBBBBBBBBBBB".to_string(), "Gone".to_string(), Transport::Travel, 50_000),
            )?;
            Err(LedgerError::Validation("abort".to_string()))
        });

        assert!(matches!(result, Err(LedgerError::Validation(_))));
        assert!(store.list_members().unwrap().is_empty());
    }

    #[test]
    fn test_one_cursor_row_per_member() {
        let (_dir, store) = temp_store();
        seed_member(&store, "MEM-CCCCCCCCCCCC");

        for visit in 1..=3 {
            store
                .write(|tx| {
                    attendance::upsert_cursor(
                        tx,
                        &AttendanceRecord {
                            member_code: "MEM-CCCCCCCCCCCC".to_string(),
                            visit_number: visit,
                            timestamp: Utc::now(),
                        },
                    )?;
                    Ok(())
                })
                .unwrap();
        }

        let records = store.list_attendance_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].visit_number, 3);
    }

    #[test]
    fn test_second_unpaid_obligation_rejected_by_index() {
        let (_dir, store) = temp_store();
        seed_member(&store, "MEM-DDDDDDDDDDDD");

        store
            .write(|tx| {
                payment::insert_obligation(tx, "MEM-DDDDDDDDDDDD", 500_000, Utc::now())?;
                Ok(())
            })
            .unwrap();

        let second = store.write(|tx| {
            payment::insert_obligation(tx, "MEM-DDDDDDDDDDDD", 500_000, Utc::now())?;
            Ok(())
        });

        let err = second.unwrap_err();
        assert!(err.is_constraint_violation());
        assert_eq!(store.list_obligations().unwrap().len(), 1);
    }

    #[test]
    fn test_cursor_requires_existing_member() {
        let (_dir, store) = temp_store();

        let result = store.write(|tx| {
            attendance::upsert_cursor(
                tx,
                &AttendanceRecord {
                    member_code: "MEM-NOPE00000000".to_string(),
                    visit_number: 1,
                    timestamp: Utc::now(),
                },
            )?;
            Ok(())
        });

        assert!(result.unwrap_err().is_constraint_violation());
    }

    #[test]
    fn test_equal_timestamps_order_by_latest_visit() {
        let (_dir, store) = temp_store();
        seed_member(&store, "MEM-EEEEEEEEEEEE");
        seed_member(&store, "MEM-FFFFFFFFFFFF");

        let at = crate::entities::now();
        let visit = |code: &str, visit_number: u32| {
            store
                .write(|tx| {
                    attendance::upsert_cursor(
                        tx,
                        &AttendanceRecord {
                            member_code: code.to_string(),
                            visit_number,
                            timestamp: at,
                        },
                    )?;
                    Ok(())
                })
                .unwrap();
        };

        // E's row is older, but E visited last
        visit("MEM-EEEEEEEEEEEE", 1);
        visit("MEM-FFFFFFFFFFFF", 1);
        visit("MEM-EEEEEEEEEEEE", 2);

        let codes: Vec<String> = store
            .list_attendance_records()
            .unwrap()
            .into_iter()
            .map(|r| r.member_code)
            .collect();
        assert_eq!(codes, vec!["MEM-EEEEEEEEEEEE", "MEM-FFFFFFFFFFFF"]);
    }

    #[test]
    fn test_setup_adds_seq_to_older_attendance_table() {
        let (dir, store) = temp_store();
        let path = dir.path().join("legacy.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE attendance_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                member_code TEXT NOT NULL UNIQUE,
                visit_number INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            );
            INSERT INTO attendance_log (member_code, visit_number, timestamp)
                VALUES ('MEM-AAAAAAAAAAAA', 2, '2024-01-01T00:00:00.000000Z');",
        )
        .unwrap();

        setup_database(&conn).unwrap();
        let seq: i64 = conn
            .query_row("SELECT seq FROM attendance_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(seq, 1);
        drop(store);
    }
}
