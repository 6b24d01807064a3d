pub mod capture;
pub mod coordinator;
pub mod monitor;
