// 🪪 Member Registry - registration + lookup
//
// Registration is a single insert. The code generator is injectable so a
// collision can be reproduced; on collision nothing is written and the
// caller gets a retryable Conflict.

use crate::config::FeeSchedule;
use crate::db::Store;
use crate::entities::member::{self, generate_member_code};
use crate::entities::{Member, Transport};
use crate::error::{LedgerError, LedgerResult};
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

type CodeGenerator = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Clone)]
pub struct MemberRegistry {
    store: Store,
    fees: FeeSchedule,
    generate_code: CodeGenerator,
}

impl fmt::Debug for MemberRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemberRegistry")
            .field("store", &self.store)
            .field("fees", &self.fees)
            .finish_non_exhaustive()
    }
}

impl MemberRegistry {
    pub fn new(store: Store, fees: FeeSchedule) -> Self {
        Self::with_code_generator(store, fees, generate_member_code)
    }

    pub fn with_code_generator<G>(store: Store, fees: FeeSchedule, generate_code: G) -> Self
    where
        G: Fn() -> String + Send + Sync + 'static,
    {
        MemberRegistry {
            store,
            fees,
            generate_code: Arc::new(generate_code),
        }
    }

    pub fn fees(&self) -> &FeeSchedule {
        &self.fees
    }

    /// Register a new member
    ///
    /// Errors: `Validation` for a blank name or an unrecognized transport,
    /// `Conflict` if the generated code is already taken.
    pub fn create_member(&self, name: &str, transport: &str) -> LedgerResult<Member> {
        let name = name.trim();
        if name.is_empty() {
            return Err(LedgerError::Validation("name is required".to_string()));
        }
        if transport.trim().is_empty() {
            return Err(LedgerError::Validation("transport is required".to_string()));
        }

        let transport: Transport = transport
            .parse()
            .map_err(|e| LedgerError::Validation(format!("{}", e)))?;
        let fee = self.fees.fee_for(transport);

        let member = Member::new((self.generate_code)(), name.to_string(), transport, fee);

        let inserted = self.store.write(|tx| {
            member::insert_member(tx, &member)?;
            Ok(())
        });

        match inserted {
            Ok(()) => {
                info!(
                    member_code = %member.code,
                    transport = %member.transport,
                    fee = member.fee,
                    "New member registered"
                );
                Ok(member)
            }
            Err(e) if e.is_constraint_violation() => {
                warn!(member_code = %member.code, "Member code collision");
                Err(LedgerError::Conflict(member.code))
            }
            Err(e) => Err(e),
        }
    }

    pub fn get_member_by_code(&self, code: &str) -> LedgerResult<Member> {
        self.store.read(|conn| require_member(conn, code))
    }

    /// All members, most recently registered first
    pub fn list_members(&self) -> LedgerResult<Vec<Member>> {
        self.store.list_members()
    }
}

/// Look a member up on an open connection, `NotFound` when unknown
pub(crate) fn require_member(conn: &rusqlite::Connection, code: &str) -> LedgerResult<Member> {
    match member::find_member(conn, code.trim())? {
        Some(member) => Ok(member),
        None => {
            warn!(member_code = %code, "Member not found");
            Err(LedgerError::NotFound(code.to_string()))
        }
    }
}
