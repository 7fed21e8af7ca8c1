// 🚏 Attendance cursor - one mutable row per member
//
// attendance_log is NOT a history table: each member owns at most one row,
// updated in place on every visit and zeroed on settlement. The payment
// trigger reads visit_number from this row. `seq` is bumped on every upsert
// so equal timestamps still order by the latest visit.

use super::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    pub member_code: String,
    /// Visits since the last settlement
    pub visit_number: u32,
    /// Time of the last visit (or of the cycle creation)
    pub timestamp: DateTime<Utc>,
}

impl AttendanceRecord {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let ts_raw: String = row.get(2)?;
        Ok(AttendanceRecord {
            member_code: row.get(0)?,
            visit_number: row.get(1)?,
            timestamp: parse_timestamp(2, &ts_raw)?,
        })
    }
}

/// Outcome of a successfully recorded visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitResult {
    pub member_code: String,
    pub visit_number: u32,
    pub payment_triggered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<i64>,
}

/// Attendance report row (joined with the member name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub member_code: String,
    pub member_name: String,
    pub visit_number: u32,
}

// ============================================================================
// QUERIES
// ============================================================================

pub(crate) fn find_cursor(
    conn: &Connection,
    member_code: &str,
) -> rusqlite::Result<Option<AttendanceRecord>> {
    conn.query_row(
        "SELECT member_code, visit_number, timestamp
         FROM attendance_log
         WHERE member_code = ?1",
        [member_code],
        AttendanceRecord::from_row,
    )
    .optional()
}

/// Insert the member's cursor or move it forward in place
pub(crate) fn upsert_cursor(conn: &Connection, record: &AttendanceRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO attendance_log (member_code, visit_number, timestamp, seq)
         VALUES (?1, ?2, ?3, (SELECT COALESCE(MAX(seq), 0) + 1 FROM attendance_log))
         ON CONFLICT(member_code) DO UPDATE SET
             visit_number = excluded.visit_number,
             timestamp = excluded.timestamp,
             seq = excluded.seq",
        params![
            record.member_code,
            record.visit_number,
            format_timestamp(&record.timestamp),
        ],
    )?;
    Ok(())
}

/// Zero the cursor, keeping the row. Returns rows touched (0 or 1).
pub(crate) fn reset_cursor(conn: &Connection, member_code: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE attendance_log SET visit_number = 0 WHERE member_code = ?1",
        [member_code],
    )
}

pub(crate) fn all_cursors(conn: &Connection) -> rusqlite::Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT member_code, visit_number, timestamp
         FROM attendance_log
         ORDER BY timestamp DESC, seq DESC",
    )?;

    let records = stmt
        .query_map([], AttendanceRecord::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(records)
}

pub(crate) fn attendance_entries(conn: &Connection) -> rusqlite::Result<Vec<AttendanceEntry>> {
    let mut stmt = conn.prepare(
        "SELECT attendance_log.member_code, members.name, attendance_log.visit_number
         FROM attendance_log
         JOIN members ON attendance_log.member_code = members.member_code
         ORDER BY attendance_log.timestamp DESC, attendance_log.seq DESC",
    )?;

    let entries = stmt
        .query_map([], |row| {
            Ok(AttendanceEntry {
                member_code: row.get(0)?,
                member_name: row.get(1)?,
                visit_number: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_result_omits_missing_amount() {
        let result = VisitResult {
            member_code: "MEM-0123456789AB".to_string(),
            visit_number: 3,
            payment_triggered: false,
            payment_amount: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["visitNumber"], 3);
        assert_eq!(json["paymentTriggered"], false);
        assert!(json.get("paymentAmount").is_none());
    }
}
