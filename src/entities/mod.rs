// Entity Models - typed rows for the three ledger tables
//
// Each entity maps one table:
// - Member            -> members        (immutable after registration)
// - AttendanceRecord  -> attendance_log (one cursor row per member)
// - PaymentObligation -> payment_log    (append, then paid exactly once)

pub mod member;
pub mod attendance;
pub mod payment;

pub use member::{Member, Transport};
pub use attendance::{AttendanceEntry, AttendanceRecord, VisitResult};
pub use payment::{PaymentEntry, PaymentObligation, Settlement};

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;

/// Current time at the precision the database keeps
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Fixed-width RFC 3339 so that text order in SQLite is chronological order
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_text_sorts_chronologically() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 9, 23, 59, 59).unwrap();
        let later = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();

        let a = format_timestamp(&earlier);
        let b = format_timestamp(&later);

        assert_eq!(a, "2024-01-09T23:59:59.000000Z");
        assert!(a < b);
        assert_eq!(parse_timestamp(0, &b).unwrap(), later);
    }

    #[test]
    fn test_now_survives_storage_round_trip() {
        let ts = now();
        assert_eq!(parse_timestamp(0, &format_timestamp(&ts)).unwrap(), ts);
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(matches!(
            parse_timestamp(3, "yesterday"),
            Err(rusqlite::Error::FromSqlConversionFailure(3, Type::Text, _))
        ));
    }
}
