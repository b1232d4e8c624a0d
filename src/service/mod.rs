//! Application context shared by whatever serves ledger requests

pub mod context;

pub use context::{LedgerContext, LedgerError};
