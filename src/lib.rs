// Membership Ledger - Core Library
// Members, visit cursors and fee obligations for a transport-subscription club.
// Exposes all modules for use in the CLI, the API server, and tests.

pub mod error;
pub mod config;
pub mod db;
pub mod entities;
pub mod registry;   // Member Registry
pub mod attendance; // Attendance Ledger
pub mod payments;   // Payment Ledger
pub mod report;     // Table dumps + CSV export

// Re-export commonly used types
pub use error::{ConfigError, LedgerError, LedgerResult};
pub use config::{Config, FeeSchedule, VISITS_PER_CYCLE};
pub use db::{setup_database, Store};
pub use entities::{
    AttendanceEntry, AttendanceRecord, Member, PaymentEntry, PaymentObligation, Settlement,
    Transport, VisitResult,
};
pub use registry::MemberRegistry;
pub use attendance::AttendanceLedger;
pub use payments::PaymentLedger;
pub use report::{
    dump_table, export_csv, format_amount, write_attendance_csv, write_payments_csv, Report, Table,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The three ledger components wired to one store
#[derive(Debug, Clone)]
pub struct Club {
    pub registry: MemberRegistry,
    pub attendance: AttendanceLedger,
    pub payments: PaymentLedger,
}

impl Club {
    pub fn new(store: Store, fees: FeeSchedule) -> Self {
        Club {
            registry: MemberRegistry::new(store.clone(), fees),
            attendance: AttendanceLedger::new(store.clone()),
            payments: PaymentLedger::new(store),
        }
    }
}
