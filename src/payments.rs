// 💸 Payment Ledger - outstanding fees + settlement
//
// settle() is the only way to re-open the attendance gate: it flips the one
// unpaid obligation to paid and zeroes the member's visit cursor in the same
// immediate transaction, so a concurrent visit sees either both changes or
// neither.

use crate::db::Store;
use crate::entities::{attendance, now, payment, PaymentEntry, PaymentObligation, Settlement};
use crate::error::{LedgerError, LedgerResult};
use crate::registry::require_member;
use rusqlite::Connection;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct PaymentLedger {
    store: Store,
}

impl PaymentLedger {
    pub fn new(store: Store) -> Self {
        PaymentLedger { store }
    }

    /// The member's outstanding obligation, if any
    pub fn get_unpaid(&self, code: &str) -> LedgerResult<Option<PaymentObligation>> {
        self.store.read(|conn| Ok(payment::find_unpaid(conn, code.trim())?))
    }

    /// Pay the outstanding obligation and reset the visit cursor to 0
    pub fn settle(&self, code: &str) -> LedgerResult<Settlement> {
        let settlement = self.store.write(|tx| {
            let member = require_member(tx, code)?;

            let obligation = match payment::find_unpaid(tx, &member.code)? {
                Some(obligation) => obligation,
                None => return Err(LedgerError::NothingDue(member.code.clone())),
            };

            // Exactly one row flips; anything else means the row moved under us
            if payment::mark_paid(tx, obligation.id, now())? != 1 {
                return Err(LedgerError::NothingDue(member.code.clone()));
            }
            attendance::reset_cursor(tx, &member.code)?;

            Ok(Settlement {
                member_code: member.code,
                amount_paid: obligation.amount_due,
            })
        });

        match &settlement {
            Ok(done) => info!(
                member_code = %done.member_code,
                amount = done.amount_paid,
                "Payment settled, visit cycle reset"
            ),
            Err(LedgerError::NothingDue(member_code)) => {
                warn!(member_code = %member_code, "Settle refused: nothing due")
            }
            Err(_) => {}
        }

        settlement
    }

    /// Every obligation joined with the member name, most recent first
    pub fn list_all(&self) -> LedgerResult<Vec<PaymentEntry>> {
        let entries = self.store.read(|conn| Ok(payment::payment_entries(conn)?))?;
        info!(count = entries.len(), "Fetched payment records");
        Ok(entries)
    }

    /// One member's obligations, most recent first
    pub fn history(&self, code: &str) -> LedgerResult<Vec<PaymentObligation>> {
        self.store.read(|conn| {
            let member = require_member(conn, code)?;
            Ok(payment::obligations_for(conn, &member.code)?)
        })
    }
}

/// Raise a new unpaid obligation inside the caller's transaction
///
/// Only the attendance ledger calls this, when a visit closes a cycle. A
/// second unpaid row for the member is rejected by the storage index and
/// reported as `PaymentRequired`.
pub(crate) fn create_obligation(
    conn: &Connection,
    member_code: &str,
    amount_due: i64,
) -> LedgerResult<PaymentObligation> {
    match payment::insert_obligation(conn, member_code, amount_due, now()) {
        Ok(obligation) => {
            info!(member_code = %member_code, amount = amount_due, "Payment obligation created");
            Ok(obligation)
        }
        Err(e) => {
            let err = LedgerError::from(e);
            if err.is_constraint_violation() {
                let outstanding = payment::find_unpaid(conn, member_code)?;
                return Err(LedgerError::PaymentRequired {
                    member_code: member_code.to_string(),
                    amount_due: outstanding.map_or(amount_due, |o| o.amount_due),
                });
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::AttendanceLedger;
    use crate::config::FeeSchedule;
    use crate::db::test_support::temp_store;
    use crate::registry::MemberRegistry;

    fn setup() -> (tempfile::TempDir, MemberRegistry, AttendanceLedger, PaymentLedger) {
        let (dir, store) = temp_store();
        (
            dir,
            MemberRegistry::new(store.clone(), FeeSchedule::default()),
            AttendanceLedger::new(store.clone()),
            PaymentLedger::new(store),
        )
    }

    #[test]
    fn test_settle_with_nothing_due() {
        let (_dir, registry, _attendance, payments) = setup();
        let member = registry.create_member("Budi", "BUS").unwrap();

        let err = payments.settle(&member.code).unwrap_err();
        assert!(matches!(err, LedgerError::NothingDue(code) if code == member.code));
    }

    #[test]
    fn test_settle_unknown_member() {
        let (_dir, _registry, _attendance, payments) = setup();

        let err = payments.settle("MEM-000000000000").unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(_)));
    }

    #[test]
    fn test_settle_marks_paid_and_resets_cursor() {
        let (_dir, registry, attendance, payments) = setup();
        let member = registry.create_member("Sari", "TRAVEL").unwrap();

        for _ in 0..5 {
            attendance.record_visit(&member.code).unwrap();
        }

        let unpaid = payments.get_unpaid(&member.code).unwrap().unwrap();
        assert_eq!(unpaid.amount_due, 250_000);
        assert!(!unpaid.paid);

        let settlement = payments.settle(&member.code).unwrap();
        assert_eq!(settlement.amount_paid, 250_000);

        assert!(payments.get_unpaid(&member.code).unwrap().is_none());

        let cursor = attendance.current_visit(&member.code).unwrap().unwrap();
        assert_eq!(cursor.visit_number, 0);

        let history = payments.history(&member.code).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].paid);
        assert!(history[0].paid_at.is_some());

        // A second settle has nothing left to pay
        assert!(matches!(
            payments.settle(&member.code),
            Err(LedgerError::NothingDue(_))
        ));
    }

    #[test]
    fn test_paid_obligations_accumulate_as_history() {
        let (_dir, registry, attendance, payments) = setup();
        let member = registry.create_member("Budi", "BUS").unwrap();

        for _cycle in 0..2 {
            for _ in 0..5 {
                attendance.record_visit(&member.code).unwrap();
            }
            payments.settle(&member.code).unwrap();
        }

        let history = payments.history(&member.code).unwrap();
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|o| o.paid));
        assert!(history[0].id > history[1].id);
    }

    #[test]
    fn test_create_obligation_rejects_second_unpaid() {
        let (_dir, registry, _attendance, payments) = setup();
        let member = registry.create_member("Budi", "BUS").unwrap();

        payments
            .store
            .write(|tx| create_obligation(tx, &member.code, 500_000))
            .unwrap();

        let err = payments
            .store
            .write(|tx| create_obligation(tx, &member.code, 500_000))
            .unwrap_err();

        assert!(matches!(
            err,
            LedgerError::PaymentRequired { amount_due: 500_000, .. }
        ));
    }

    #[test]
    fn test_list_all_most_recent_first() {
        let (_dir, registry, attendance, payments) = setup();
        let first = registry.create_member("Budi", "BUS").unwrap();
        let second = registry.create_member("Sari", "TRAVEL").unwrap();

        for _ in 0..5 {
            attendance.record_visit(&first.code).unwrap();
        }
        for _ in 0..5 {
            attendance.record_visit(&second.code).unwrap();
        }
        payments.settle(&first.code).unwrap();

        let entries = payments.list_all().unwrap();
        assert_eq!(
            entries,
            vec![
                PaymentEntry {
                    member_code: second.code.clone(),
                    member_name: "Sari".to_string(),
                    amount_due: 250_000,
                    paid: false,
                },
                PaymentEntry {
                    member_code: first.code.clone(),
                    member_name: "Budi".to_string(),
                    amount_due: 500_000,
                    paid: true,
                },
            ]
        );
    }
}
