pub mod application;
pub mod cli;
pub mod domain;
pub mod engine;
pub mod logging;
pub mod storage;

pub use domain::*;
pub use engine::{LedgerError, LedgerStore, LedgerTx, TxContext, exec_tx, lock_order, transfer};
pub use storage::{MemoryStore, SqliteStore, StoreConfig};
