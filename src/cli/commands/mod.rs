//! CLI command implementations.

pub mod history;
pub mod init;
pub mod ledger;
pub mod plan;
pub mod run;
