use anyhow::{bail, Context, Result};
use std::env;
use std::path::Path;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use membership_ledger::{
    dump_table, export_csv, format_amount, Club, Config, LedgerError, Report, Store, Table,
};

const USAGE: &str = "Usage: membership-ledger <command>

Commands:
  init                                   Create the database schema
  fees                                   Show the fee schedule
  register <name> <transport>            Register a member (BUS | TRAVEL)
  visit <code>                           Record a visit
  pay <code>                             Settle the outstanding fee
  status <code>                          Show member, visit cursor and fee due
  attendance                             List visit cursors (most recent first)
  payments                               List fee obligations (most recent first)
  dump [members|attendance_log|payment_log]
                                         Print raw tables
  export <attendance|payments> <file>    Export a report as CSV";

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,membership_ledger=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = Config::from_env().context("Failed to load configuration")?;
    let store = config.open_store()?;
    let club = Club::new(store.clone(), config.fees.clone());

    let result = match (command.as_str(), &args[1..]) {
        ("init", []) => {
            println!("✓ Database ready at {}", store.path().display());
            Ok(())
        }
        ("fees", []) => {
            show_fees(&config);
            Ok(())
        }
        ("register", [name, transport]) => register(&club, name, transport),
        ("visit", [code]) => visit(&club, code),
        ("pay", [code]) => pay(&club, code),
        ("status", [code]) => status(&club, code),
        ("attendance", []) => list_attendance(&club),
        ("payments", []) => list_payments(&club),
        ("dump", []) => dump(&store, &Table::ALL),
        ("dump", [table]) => table.parse().and_then(|table: Table| dump(&store, &[table])),
        ("export", [report, path]) => export(&club, report, path),
        _ => bail!("Unrecognized command\n\n{}", USAGE),
    };

    if let Err(e) = &result {
        tracing::error!(command = %command, error = %e, "Command failed");
    }
    result
}

fn show_fees(config: &Config) {
    println!("Fee schedule (per visit, billed every 5 visits)");
    for (transport, fee) in config.fees.iter() {
        println!("  {:<8} {:>12}", transport, format_amount(fee));
    }
}

fn register(club: &Club, name: &str, transport: &str) -> Result<()> {
    let member = club.registry.create_member(name, transport)?;
    println!("✓ Registered {} ({})", member.name, member.transport);
    println!("  Member code: {}", member.code);
    println!("  Fee per visit: {}", format_amount(member.fee));
    Ok(())
}

fn visit(club: &Club, code: &str) -> Result<()> {
    match club.attendance.record_visit(code) {
        Ok(visit) => {
            println!("✓ Attendance recorded: visit #{}", visit.visit_number);
            if let Some(amount) = visit.payment_amount {
                println!("💰 Payment required: {}", format_amount(amount));
            }
            Ok(())
        }
        Err(LedgerError::PaymentRequired { amount_due, .. }) => {
            bail!(
                "Payment of {} required before recording additional attendance",
                format_amount(amount_due)
            )
        }
        Err(e) => Err(e.into()),
    }
}

fn pay(club: &Club, code: &str) -> Result<()> {
    let settlement = club.payments.settle(code)?;
    println!(
        "✓ Payment of {} processed for {}; visit count reset",
        format_amount(settlement.amount_paid),
        settlement.member_code
    );
    Ok(())
}

fn status(club: &Club, code: &str) -> Result<()> {
    let member = club.registry.get_member_by_code(code)?;
    println!("{} - {}", member.code, member.name);
    println!("  Transport: {} ({} per visit)", member.transport, format_amount(member.fee));

    match club.attendance.current_visit(&member.code)? {
        Some(cursor) => println!(
            "  Visits this cycle: {} (last update {})",
            cursor.visit_number,
            cursor.timestamp.format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("  Visits this cycle: 0 (no visits yet)"),
    }

    match club.payments.get_unpaid(&member.code)? {
        Some(due) => println!("  Payment due: {}", format_amount(due.amount_due)),
        None => println!("  Payment due: none"),
    }
    Ok(())
}

fn list_attendance(club: &Club) -> Result<()> {
    let entries = club.attendance.list_all()?;
    if entries.is_empty() {
        println!("No attendance recorded yet");
    }
    for entry in entries {
        println!("{:<18} {:<24} {:>3}", entry.member_code, entry.member_name, entry.visit_number);
    }
    Ok(())
}

fn list_payments(club: &Club) -> Result<()> {
    let entries = club.payments.list_all()?;
    if entries.is_empty() {
        println!("No payments recorded yet");
    }
    for entry in entries {
        println!(
            "{:<18} {:<24} {:>12} {}",
            entry.member_code,
            entry.member_name,
            format_amount(entry.amount_due),
            if entry.paid { "PAID" } else { "UNPAID" }
        );
    }
    Ok(())
}

fn dump(store: &Store, tables: &[Table]) -> Result<()> {
    for table in tables {
        print!("{}", dump_table(store, *table)?);
    }
    Ok(())
}

fn export(club: &Club, report: &str, path: &str) -> Result<()> {
    // Validate the report name before touching the target file
    let report: Report = report.parse()?;
    let rows = export_csv(club, report, Path::new(path))?;

    println!("✓ Exported {} rows to {}", rows, path);
    Ok(())
}
