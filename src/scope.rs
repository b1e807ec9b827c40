//! # Ambient Transaction Scope
//!
//! Command handlers sometimes need several `append` calls — or an append plus
//! an outbox write — to commit or fail as one unit. A [`TransactionScope`]
//! makes one open transaction ambient for a flow of control: any
//! [`PostgresBackend`](crate::postgres::PostgresBackend) append that runs
//! inside [`TransactionScope::enter`] reuses the scope's transaction and
//! leaves commit/rollback to the scope owner.
//!
//! The slot is a `tokio::task_local!`, so it is isolated per call chain —
//! concurrent requests on the same runtime never see each other's scopes, and
//! there is no process- or thread-global state. Nested `enter` calls replace
//! the ambient slot for their duration and restore the outer one on exit;
//! only the outermost owner settles the transaction.
//!
//! A `ConcurrencyConflict` raised inside a scope propagates without rolling
//! anything back at this layer: whether a conflicting command aborts the
//! whole unit of work is the owner's policy. Note that PostgreSQL has aborted
//! the transaction at that point, so committing it will fail — the owner's
//! realistic choices are rollback or dropping the scope.
//!
//! # Example
//!
//! ```rust,ignore
//! let scope = TransactionScope::begin(backend.pool()).await?;
//! let result = scope
//!     .enter(async {
//!         store.append(reservation, None, None).await?;
//!         store.append(outbox_entry, None, None).await
//!     })
//!     .await;
//! match result {
//!     Ok(_) => scope.commit().await?,
//!     Err(_) => scope.rollback().await?,
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::error::{Error, Result};

/// The ambient slot: the transaction is `Some` while the scope is open and
/// taken out by `commit`/`rollback`.
pub(crate) type SharedTransaction = Arc<Mutex<Option<Transaction<'static, Postgres>>>>;

tokio::task_local! {
    static AMBIENT_TX: SharedTransaction;
}

/// An open transaction that can be made ambient for a flow of control.
///
/// Dropping a never-settled scope rolls the transaction back when its
/// connection returns to the pool.
pub struct TransactionScope {
    slot: SharedTransaction,
}

impl TransactionScope {
    /// Opens a transaction on the pool and wraps it in a scope.
    pub async fn begin(pool: &PgPool) -> Result<Self> {
        let tx = pool.begin().await?;
        Ok(Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        })
    }

    /// Runs `fut` with this scope ambient on the current task.
    ///
    /// Backend appends inside `fut` (including those behind further function
    /// calls) join the scope's transaction. Re-entering replaces any outer
    /// ambient scope for the duration and restores it afterwards.
    pub async fn enter<F: Future>(&self, fut: F) -> F::Output {
        AMBIENT_TX.scope(self.slot.clone(), fut).await
    }

    /// Commits the scope's transaction.
    ///
    /// # Errors
    ///
    /// [`Error::ScopeCompleted`] when the scope was already settled.
    pub async fn commit(self) -> Result<()> {
        let tx = self
            .slot
            .lock()
            .await
            .take()
            .ok_or(Error::ScopeCompleted)?;
        tx.commit().await?;
        Ok(())
    }

    /// Rolls the scope's transaction back.
    ///
    /// # Errors
    ///
    /// [`Error::ScopeCompleted`] when the scope was already settled.
    pub async fn rollback(self) -> Result<()> {
        let tx = self
            .slot
            .lock()
            .await
            .take()
            .ok_or(Error::ScopeCompleted)?;
        tx.rollback().await?;
        Ok(())
    }

    /// The scope ambient on the current task, if any.
    pub(crate) fn current() -> Option<SharedTransaction> {
        AMBIENT_TX.try_with(|slot| slot.clone()).ok()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Without `enter`, nothing is ambient — a scope on its own changes no
    /// behavior.
    #[tokio::test]
    async fn test_no_ambient_scope_by_default() {
        assert!(TransactionScope::current().is_none());
    }

    /// `enter` makes the slot visible inside the future and invisible after.
    #[tokio::test]
    async fn test_enter_scopes_the_slot() {
        let slot: SharedTransaction = Arc::new(Mutex::new(None));
        let scope = TransactionScope { slot: slot.clone() };

        let seen = scope
            .enter(async { TransactionScope::current().is_some() })
            .await;
        assert!(seen);
        assert!(TransactionScope::current().is_none());
    }

    /// Nested scopes replace the ambient slot and restore it on exit.
    #[tokio::test]
    async fn test_nested_enter_replaces_and_restores() {
        let outer_slot: SharedTransaction = Arc::new(Mutex::new(None));
        let inner_slot: SharedTransaction = Arc::new(Mutex::new(None));
        let outer = TransactionScope {
            slot: outer_slot.clone(),
        };
        let inner = TransactionScope {
            slot: inner_slot.clone(),
        };

        outer
            .enter(async {
                let before = TransactionScope::current().unwrap();
                assert!(Arc::ptr_eq(&before, &outer_slot));

                inner
                    .enter(async {
                        let ambient = TransactionScope::current().unwrap();
                        assert!(Arc::ptr_eq(&ambient, &inner_slot));
                    })
                    .await;

                let after = TransactionScope::current().unwrap();
                assert!(Arc::ptr_eq(&after, &outer_slot));
            })
            .await;
    }
}
