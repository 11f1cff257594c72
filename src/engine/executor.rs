//! All-or-nothing execution of a unit of work against a ledger store.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{LedgerError, LedgerResult, LedgerStore};

/// Boxed future returned by a unit of work, borrowing the transaction handle.
pub type TxFuture<'t, T> = Pin<Box<dyn Future<Output = LedgerResult<T>> + Send + 't>>;

/// Per-request context passed explicitly into the engine.
///
/// The label tags every log line of the attempt; the optional deadline
/// bounds the whole attempt from `begin` on (lock waits included).
#[derive(Debug, Clone)]
pub struct TxContext {
    label: String,
    deadline: Option<Instant>,
}

impl TxContext {
    /// Context labelled with a fresh request id and no deadline.
    pub fn new() -> Self {
        Self::named(Uuid::new_v4().to_string())
    }

    pub fn named(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}

impl Default for TxContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Lifecycle of a single transaction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    /// Not yet begun
    Pending,
    /// Writes issued, locks held
    InTransaction,
    /// Terminal: all effects visible
    Committed,
    /// Terminal: no residual effect
    RolledBack,
}

impl TxState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TxState::Committed | TxState::RolledBack)
    }

    pub fn can_transition_to(&self, next: TxState) -> bool {
        matches!(
            (self, next),
            (TxState::Pending, TxState::InTransaction)
                | (TxState::InTransaction, TxState::Committed)
                | (TxState::InTransaction, TxState::RolledBack)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TxState::Pending => "pending",
            TxState::InTransaction => "in_transaction",
            TxState::Committed => "committed",
            TxState::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for TxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Attempt<'a> {
    label: &'a str,
    state: TxState,
}

impl<'a> Attempt<'a> {
    fn new(label: &'a str) -> Self {
        Self {
            label,
            state: TxState::Pending,
        }
    }

    fn advance(&mut self, next: TxState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transaction transition {} -> {}",
            self.state,
            next
        );
        debug!(tx = self.label, from = %self.state, to = %next, "transaction state");
        self.state = next;
    }
}

/// Run `unit` inside a fresh transaction of `store`.
///
/// Commits when the unit succeeds. When it fails (or overruns the context
/// deadline) the transaction is rolled back and the original error is
/// returned; if the rollback fails as well, both errors are reported as
/// [`LedgerError::TransactionFailure`]. Exactly one of commit or rollback is
/// issued per call once the transaction is open.
///
/// The deadline also bounds `begin`, where a store may wait for its write
/// lock. Expiring there returns `DeadlineExceeded` with nothing to undo.
pub async fn exec_tx<S, T, F>(store: &S, ctx: &TxContext, unit: F) -> LedgerResult<T>
where
    S: LedgerStore,
    T: Send,
    F: for<'t> FnOnce(&'t mut S::Tx) -> TxFuture<'t, T> + Send,
{
    let mut attempt = Attempt::new(ctx.label());

    // Nothing is open yet if the deadline passes here, so nothing to undo.
    let mut tx = match within_deadline(ctx, store.begin()).await {
        Ok(tx) => tx,
        Err(err) => {
            warn!(tx = ctx.label(), error = %err, "begin failed");
            return Err(err);
        }
    };
    attempt.advance(TxState::InTransaction);

    let outcome = within_deadline(ctx, unit(&mut tx)).await;

    match outcome {
        Ok(value) => match store.commit(tx).await {
            Ok(()) => {
                attempt.advance(TxState::Committed);
                Ok(value)
            }
            Err(err) => {
                // The adapter discards a transaction whose COMMIT failed.
                attempt.advance(TxState::RolledBack);
                warn!(tx = ctx.label(), error = %err, "commit failed");
                Err(err)
            }
        },
        Err(err) => {
            attempt.advance(TxState::RolledBack);
            match store.rollback(tx).await {
                Ok(()) => {
                    debug!(tx = ctx.label(), error = %err, "rolled back");
                    Err(err)
                }
                Err(rollback) => {
                    error!(
                        tx = ctx.label(),
                        error = %err,
                        rollback_error = %rollback,
                        "rollback failed"
                    );
                    Err(LedgerError::TransactionFailure {
                        error: Box::new(err),
                        rollback: Box::new(rollback),
                    })
                }
            }
        }
    }
}

/// Await `fut`, giving up with `DeadlineExceeded` once the context deadline passes.
async fn within_deadline<T, F>(ctx: &TxContext, fut: F) -> LedgerResult<T>
where
    F: Future<Output = LedgerResult<T>>,
{
    match ctx.deadline() {
        Some(deadline) => tokio::time::timeout_at(deadline, fut)
            .await
            .unwrap_or_else(|_| Err(LedgerError::DeadlineExceeded)),
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        assert!(TxState::Pending.can_transition_to(TxState::InTransaction));
        assert!(TxState::InTransaction.can_transition_to(TxState::Committed));
        assert!(TxState::InTransaction.can_transition_to(TxState::RolledBack));

        assert!(!TxState::Pending.can_transition_to(TxState::Committed));
        assert!(!TxState::Committed.can_transition_to(TxState::RolledBack));
        assert!(!TxState::RolledBack.can_transition_to(TxState::InTransaction));
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TxState::Pending.is_terminal());
        assert!(!TxState::InTransaction.is_terminal());
        assert!(TxState::Committed.is_terminal());
        assert!(TxState::RolledBack.is_terminal());
    }

    #[test]
    fn test_context_labels() {
        let ctx = TxContext::named("tx 1");
        assert_eq!(ctx.label(), "tx 1");
        assert!(ctx.deadline().is_none());

        let a = TxContext::new();
        let b = TxContext::new();
        assert_ne!(a.label(), b.label());
    }

    #[tokio::test]
    async fn test_context_timeout_sets_deadline() {
        let before = Instant::now();
        let ctx = TxContext::named("slow").with_timeout(Duration::from_millis(250));
        let deadline = ctx.deadline().unwrap();
        assert!(deadline >= before + Duration::from_millis(250));
    }
}
