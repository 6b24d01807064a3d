pub mod hashed_writer;
pub mod sidecar;
pub mod verify;
