pub mod config;
pub mod error;
pub mod frame;
pub mod ledger;
pub mod state;
pub mod target;
