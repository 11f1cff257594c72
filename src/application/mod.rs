// Application layer - the validation the transfer engine expects from its
// callers, plus account and history queries for the CLI.

pub mod error;
pub mod service;

pub use error::*;
pub use service::*;
