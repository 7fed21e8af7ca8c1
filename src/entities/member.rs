// 🪪 Member Entity - registered once, never edited
//
// The member code is the public identity handed to the member; the fee is
// captured at registration so later fee schedule changes never re-price
// an existing membership.

use super::{format_timestamp, now, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Prefix of every member code
pub const MEMBER_CODE_PREFIX: &str = "MEM-";

/// Hex digits after the prefix (4 bits each -> 48 bits)
pub const MEMBER_CODE_HEX_DIGITS: usize = 12;

// ============================================================================
// TRANSPORT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Bus,
    Travel,
}

impl Transport {
    pub const ALL: [Transport; 2] = [Transport::Bus, Transport::Travel];

    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Bus => "BUS",
            Transport::Travel => "TRAVEL",
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownTransport(pub String);

impl fmt::Display for UnknownTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown transport '{}'", self.0)
    }
}

impl std::error::Error for UnknownTransport {}

impl FromStr for Transport {
    type Err = UnknownTransport;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUS" => Ok(Transport::Bus),
            "TRAVEL" => Ok(Transport::Travel),
            _ => Err(UnknownTransport(s.trim().to_string())),
        }
    }
}

// ============================================================================
// MEMBER ENTITY
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    /// `MEM-` + 12 upper-case hex digits
    pub code: String,
    pub name: String,
    pub transport: Transport,
    /// Per-visit fee resolved from the fee schedule at registration
    pub fee: i64,
    pub registered_at: DateTime<Utc>,
}

impl Member {
    pub fn new(code: String, name: String, transport: Transport, fee: i64) -> Self {
        Member {
            code,
            name,
            transport,
            fee,
            registered_at: now(),
        }
    }

    /// Map a `members` row selected with [`MEMBER_COLUMNS`]
    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let transport_raw: String = row.get(2)?;
        let transport = transport_raw.parse::<Transport>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;
        let registered_raw: String = row.get(4)?;

        Ok(Member {
            code: row.get(0)?,
            name: row.get(1)?,
            transport,
            fee: row.get(3)?,
            registered_at: parse_timestamp(4, &registered_raw)?,
        })
    }
}

pub(crate) const MEMBER_COLUMNS: &str = "member_code, name, transport, fee, registered_at";

/// Generate a fresh member code from a v4 UUID
pub fn generate_member_code() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}{}",
        MEMBER_CODE_PREFIX,
        hex[..MEMBER_CODE_HEX_DIGITS].to_ascii_uppercase()
    )
}

// ============================================================================
// QUERIES
// ============================================================================

pub(crate) fn insert_member(conn: &Connection, member: &Member) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO members (member_code, name, transport, fee, registered_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            member.code,
            member.name,
            member.transport.as_str(),
            member.fee,
            format_timestamp(&member.registered_at),
        ],
    )?;
    Ok(())
}

pub(crate) fn find_member(conn: &Connection, code: &str) -> rusqlite::Result<Option<Member>> {
    conn.query_row(
        &format!("SELECT {} FROM members WHERE member_code = ?1", MEMBER_COLUMNS),
        [code],
        Member::from_row,
    )
    .optional()
}

pub(crate) fn all_members(conn: &Connection) -> rusqlite::Result<Vec<Member>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM members ORDER BY registered_at DESC, rowid DESC",
        MEMBER_COLUMNS
    ))?;

    let members = stmt
        .query_map([], Member::from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(members)
}
