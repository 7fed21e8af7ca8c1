// 🚏 Attendance Ledger - visit recording + payment trigger
//
// record_visit() runs gate -> read cursor -> upsert -> maybe bill inside one
// immediate transaction. Two concurrent visits for the same member are
// serialized by the SQLite write lock, so only one of them can observe
// "nothing owed" before a cycle closes.

use crate::config::VISITS_PER_CYCLE;
use crate::db::Store;
use crate::entities::{attendance, now, payment, AttendanceEntry, AttendanceRecord, VisitResult};
use crate::error::{LedgerError, LedgerResult};
use crate::payments::create_obligation;
use crate::registry::require_member;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct AttendanceLedger {
    store: Store,
}

impl AttendanceLedger {
    pub fn new(store: Store) -> Self {
        AttendanceLedger { store }
    }

    /// Record one visit for `code`
    ///
    /// Errors: `NotFound` for an unknown code, `PaymentRequired` while an
    /// obligation is outstanding (nothing is recorded in that case).
    pub fn record_visit(&self, code: &str) -> LedgerResult<VisitResult> {
        let result = self.store.write(|tx| {
            let member = require_member(tx, code)?;

            if let Some(due) = payment::find_unpaid(tx, &member.code)? {
                return Err(LedgerError::PaymentRequired {
                    member_code: member.code,
                    amount_due: due.amount_due,
                });
            }

            let visit_number = match attendance::find_cursor(tx, &member.code)? {
                Some(cursor) => cursor.visit_number + 1,
                None => 1,
            };

            attendance::upsert_cursor(
                tx,
                &AttendanceRecord {
                    member_code: member.code.clone(),
                    visit_number,
                    timestamp: now(),
                },
            )?;

            let payment_amount = if visit_number % VISITS_PER_CYCLE == 0 {
                let amount = member.fee * i64::from(VISITS_PER_CYCLE);
                create_obligation(tx, &member.code, amount)?;
                Some(amount)
            } else {
                None
            };

            Ok(VisitResult {
                member_code: member.code,
                visit_number,
                payment_triggered: payment_amount.is_some(),
                payment_amount,
            })
        });

        match &result {
            Ok(visit) => info!(
                member_code = %visit.member_code,
                visit_number = visit.visit_number,
                payment_triggered = visit.payment_triggered,
                "Attendance recorded"
            ),
            Err(LedgerError::PaymentRequired { member_code, amount_due }) => warn!(
                member_code = %member_code,
                amount_due = amount_due,
                "Attendance refused: payment required"
            ),
            Err(_) => {}
        }

        result
    }

    /// The member's visit cursor; `None` before the first visit
    pub fn current_visit(&self, code: &str) -> LedgerResult<Option<AttendanceRecord>> {
        self.store.read(|conn| {
            let member = require_member(conn, code)?;
            Ok(attendance::find_cursor(conn, &member.code)?)
        })
    }

    /// Every cursor joined with the member name, most recent visit first
    pub fn list_all(&self) -> LedgerResult<Vec<AttendanceEntry>> {
        let entries = self.store.read(|conn| Ok(attendance::attendance_entries(conn)?))?;
        info!(count = entries.len(), "Retrieved attendance records");
        Ok(entries)
    }
}
