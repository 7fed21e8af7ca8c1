// 📋 Reports - table dumps and CSV export for the CLI

use crate::db::Store;
use crate::entities::{format_timestamp, AttendanceEntry, PaymentEntry};
use crate::error::LedgerResult;
use crate::Club;
use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;

/// Format an amount with thousands separators: 500000 -> "500,000"
pub fn format_amount(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if value < 0 {
        out.push('-');
    }
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ============================================================================
// TABLES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Members,
    AttendanceLog,
    PaymentLog,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Members, Table::AttendanceLog, Table::PaymentLog];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Members => "members",
            Table::AttendanceLog => "attendance_log",
            Table::PaymentLog => "payment_log",
        }
    }
}

impl FromStr for Table {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "members" => Ok(Table::Members),
            "attendance_log" | "attendance" => Ok(Table::AttendanceLog),
            "payment_log" | "payments" => Ok(Table::PaymentLog),
            other => anyhow::bail!("Unknown table '{}'", other),
        }
    }
}

/// Header row + string cells for one raw table
pub fn table_rows(store: &Store, table: Table) -> LedgerResult<(Vec<&'static str>, Vec<Vec<String>>)> {
    Ok(match table {
        Table::Members => (
            vec!["member_code", "name", "transport", "fee", "registered_at"],
            store
                .list_members()?
                .into_iter()
                .map(|m| {
                    vec![
                        m.code,
                        m.name,
                        m.transport.to_string(),
                        m.fee.to_string(),
                        format_timestamp(&m.registered_at),
                    ]
                })
                .collect(),
        ),
        Table::AttendanceLog => (
            vec!["member_code", "visit_number", "timestamp"],
            store
                .list_attendance_records()?
                .into_iter()
                .map(|r| vec![r.member_code, r.visit_number.to_string(), format_timestamp(&r.timestamp)])
                .collect(),
        ),
        Table::PaymentLog => (
            vec!["id", "member_code", "payment_due", "paid", "timestamp", "paid_at"],
            store
                .list_obligations()?
                .into_iter()
                .map(|o| {
                    vec![
                        o.id.to_string(),
                        o.member_code,
                        o.amount_due.to_string(),
                        o.paid.to_string(),
                        format_timestamp(&o.timestamp),
                        o.paid_at.as_ref().map(format_timestamp).unwrap_or_default(),
                    ]
                })
                .collect(),
        ),
    })
}

/// Render rows as a boxed text grid
pub fn render_grid(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let mut out = grid_separator(&widths, '-');
    out.push_str(&grid_row(&widths, headers.iter().copied()));
    out.push_str(&grid_separator(&widths, '='));
    for row in rows {
        out.push_str(&grid_row(&widths, row.iter().map(String::as_str)));
        out.push_str(&grid_separator(&widths, '-'));
    }
    out
}

fn grid_separator(widths: &[usize], fill: char) -> String {
    let mut line = String::from("+");
    for w in widths {
        line.extend(std::iter::repeat(fill).take(w + 2));
        line.push('+');
    }
    line.push('\n');
    line
}

fn grid_row<'a>(widths: &[usize], cells: impl Iterator<Item = &'a str>) -> String {
    let mut line = String::from("|");
    for (cell, w) in cells.zip(widths) {
        let _ = write!(line, " {:<width$} |", cell, width = w);
    }
    line.push('\n');
    line
}

/// Text dump of one table, in the shape the CLI prints
pub fn dump_table(store: &Store, table: Table) -> LedgerResult<String> {
    let (headers, rows) = table_rows(store, table)?;

    if rows.is_empty() {
        return Ok(format!("\nNo data found in {}\n", table.name()));
    }
    Ok(format!("\nData from {}\n{}", table.name(), render_grid(&headers, &rows)))
}

// ============================================================================
// CSV EXPORT
// ============================================================================

pub fn write_attendance_csv<W: io::Write>(writer: W, entries: &[AttendanceEntry]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for entry in entries {
        wtr.serialize(entry).context("Failed to write attendance row")?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_payments_csv<W: io::Write>(writer: W, entries: &[PaymentEntry]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for entry in entries {
        wtr.serialize(entry).context("Failed to write payment row")?;
    }
    wtr.flush()?;
    Ok(())
}

/// Reports the CLI can export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Report {
    Attendance,
    Payments,
}

impl FromStr for Report {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "attendance" => Ok(Report::Attendance),
            "payments" => Ok(Report::Payments),
            other => anyhow::bail!("Unknown report '{}' (expected attendance or payments)", other),
        }
    }
}

/// Write `report` to `path` as CSV, returning the number of rows
///
/// Rows are loaded before the file is created, so a failed query leaves an
/// existing file untouched.
pub fn export_csv(club: &Club, report: Report, path: &Path) -> Result<usize> {
    match report {
        Report::Attendance => {
            let entries = club.attendance.list_all()?;
            write_attendance_csv(create_export(path)?, &entries)?;
            Ok(entries.len())
        }
        Report::Payments => {
            let entries = club.payments.list_all()?;
            write_payments_csv(create_export(path)?, &entries)?;
            Ok(entries.len())
        }
    }
}

fn create_export(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AttendanceLedger;
    use crate::config::FeeSchedule;
    use crate::db::test_support::temp_store;
    use crate::registry::MemberRegistry;

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount(0), "0");
        assert_eq!(format_amount(999), "999");
        assert_eq!(format_amount(1_000), "1,000");
        assert_eq!(format_amount(500_000), "500,000");
        assert_eq!(format_amount(1_234_567), "1,234,567");
        assert_eq!(format_amount(-50_000), "-50,000");
    }

    #[test]
    fn test_render_grid_pads_columns() {
        let grid = render_grid(
            &["code", "n"],
            &[vec!["MEM-1".to_string(), "12".to_string()]],
        );

        let lines: Vec<&str> = grid.lines().collect();
        assert_eq!(lines[0], "+-------+----+");
        assert_eq!(lines[1], "| code  | n  |");
        assert_eq!(lines[2], "+=======+====+");
        assert_eq!(lines[3], "| MEM-1 | 12 |");
        assert_eq!(lines[4], "+-------+----+");
    }

    #[test]
    fn test_dump_empty_and_populated_tables() {
        let (_dir, store) = temp_store();

        assert_eq!(
            dump_table(&store, Table::PaymentLog).unwrap(),
            "\nNo data found in payment_log\n"
        );

        let registry = MemberRegistry::new(store.clone(), FeeSchedule::default());
        let member = registry.create_member("Budi", "BUS").unwrap();
        AttendanceLedger::new(store.clone()).record_visit(&member.code).unwrap();

        let dump = dump_table(&store, Table::AttendanceLog).unwrap();
        assert!(dump.starts_with("\nData from attendance_log\n"));
        assert!(dump.contains(&member.code));
        assert!(dump.contains("| 1 "));
    }

    #[test]
    fn test_table_names() {
        for table in Table::ALL {
            assert_eq!(table.name().parse::<Table>().unwrap(), table);
        }
        assert_eq!("payments".parse::<Table>().unwrap(), Table::PaymentLog);
        assert!("users".parse::<Table>().is_err());
    }

    #[test]
    fn test_csv_export() {
        let entries = vec![
            PaymentEntry {
                member_code: "MEM-0123456789AB".to_string(),
                member_name: "Budi".to_string(),
                amount_due: 500_000,
                paid: false,
            },
            PaymentEntry {
                member_code: "MEM-BA9876543210".to_string(),
                member_name: "Sari, Jr.".to_string(),
                amount_due: 250_000,
                paid: true,
            },
        ];

        let mut buf = Vec::new();
        write_payments_csv(&mut buf, &entries).unwrap();
        let text = String::from_utf8(buf).unwrap();

        assert_eq!(
            text,
            "memberCode,memberName,amountDue,paid\n\
             MEM-0123456789AB,Budi,500000,false\n\
             MEM-BA9876543210,\"Sari, Jr.\",250000,true\n"
        );
    }

    #[test]
    fn test_export_writes_payments_report() {
        let (dir, store) = temp_store();
        let club = Club::new(store, FeeSchedule::default());
        let member = club.registry.create_member("Budi", "BUS").unwrap();
        for _ in 0..5 {
            club.attendance.record_visit(&member.code).unwrap();
        }

        let path = dir.path().join("payments.csv");
        let rows = export_csv(&club, "payments".parse().unwrap(), &path).unwrap();

        assert_eq!(rows, 1);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("memberCode,memberName,amountDue,paid\n"));
        assert!(text.contains(&format!("{},Budi,500000,false", member.code)));
    }

    #[test]
    fn test_unknown_report_is_rejected() {
        let err = "attendence".parse::<Report>().unwrap_err();
        assert!(err.to_string().contains("Unknown report 'attendence'"));
        assert_eq!("attendance".parse::<Report>().unwrap(), Report::Attendance);
    }

    #[test]
    fn test_attendance_csv_empty_report() {
        let mut buf = Vec::new();
        write_attendance_csv(&mut buf, &[]).unwrap();
        // csv writes headers lazily, so an empty report is an empty file
        assert!(buf.is_empty());
    }
}
