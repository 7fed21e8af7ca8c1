// 💸 Payment obligations - owed once per five visits
//
// Lifecycle: inserted unpaid by the attendance ledger, flipped to paid by
// settlement, then frozen. The partial unique index on payment_log keeps at
// most one unpaid row per member.

use super::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentObligation {
    pub id: i64,
    pub member_code: String,
    pub amount_due: i64,
    pub paid: bool,
    /// When the obligation was raised
    pub timestamp: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
}

impl PaymentObligation {
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let ts_raw: String = row.get(4)?;
        let paid_at_raw: Option<String> = row.get(5)?;

        Ok(PaymentObligation {
            id: row.get(0)?,
            member_code: row.get(1)?,
            amount_due: row.get(2)?,
            paid: row.get(3)?,
            timestamp: parse_timestamp(4, &ts_raw)?,
            paid_at: paid_at_raw
                .as_deref()
                .map(|raw| parse_timestamp(5, raw))
                .transpose()?,
        })
    }
}

/// Outcome of a settlement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub member_code: String,
    pub amount_paid: i64,
}

/// Payment report row (joined with the member name)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEntry {
    pub member_code: String,
    pub member_name: String,
    pub amount_due: i64,
    pub paid: bool,
}

// ============================================================================
// QUERIES
// ============================================================================

const OBLIGATION_COLUMNS: &str = "id, member_code, payment_due, paid, timestamp, paid_at";

pub(crate) fn find_unpaid(
    conn: &Connection,
    member_code: &str,
) -> rusqlite::Result<Option<PaymentObligation>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM payment_log WHERE member_code = ?1 AND paid = 0",
            OBLIGATION_COLUMNS
        ),
        [member_code],
        PaymentObligation::from_row,
    )
    .optional()
}

pub(crate) fn insert_obligation(
    conn: &Connection,
    member_code: &str,
    amount_due: i64,
    timestamp: DateTime<Utc>,
) -> rusqlite::Result<PaymentObligation> {
    conn.execute(
        "INSERT INTO payment_log (member_code, payment_due, paid, timestamp)
         VALUES (?1, ?2, 0, ?3)",
        params![member_code, amount_due, format_timestamp(&timestamp)],
    )?;

    Ok(PaymentObligation {
        id: conn.last_insert_rowid(),
        member_code: member_code.to_string(),
        amount_due,
        paid: false,
        timestamp,
        paid_at: None,
    })
}

/// Flip one unpaid obligation to paid. Returns rows touched (0 or 1).
pub(crate) fn mark_paid(conn: &Connection, id: i64, paid_at: DateTime<Utc>) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE payment_log SET paid = 1, paid_at = ?1 WHERE id = ?2 AND paid = 0",
        params![format_timestamp(&paid_at), id],
    )
}

pub(crate) fn obligations_for(
    conn: &Connection,
    member_code: &str,
) -> rusqlite::Result<Vec<PaymentObligation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM payment_log WHERE member_code = ?1 ORDER BY timestamp DESC, id DESC",
        OBLIGATION_COLUMNS
    ))?;

    let obligations = stmt
        .query_map([member_code], PaymentObligation::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(obligations)
}

pub(crate) fn all_obligations(conn: &Connection) -> rusqlite::Result<Vec<PaymentObligation>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM payment_log ORDER BY timestamp DESC, id DESC",
        OBLIGATION_COLUMNS
    ))?;

    let obligations = stmt
        .query_map([], PaymentObligation::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(obligations)
}

pub(crate) fn payment_entries(conn: &Connection) -> rusqlite::Result<Vec<PaymentEntry>> {
    let mut stmt = conn.prepare(
        "SELECT payment_log.member_code, members.name, payment_log.payment_due, payment_log.paid
         FROM payment_log
         JOIN members ON payment_log.member_code = members.member_code
         ORDER BY payment_log.timestamp DESC, payment_log.id DESC",
    )?;

    let entries = stmt
        .query_map([], |row| {
            Ok(PaymentEntry {
                member_code: row.get(0)?,
                member_name: row.get(1)?,
                amount_due: row.get(2)?,
                paid: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}
