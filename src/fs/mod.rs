//! Filesystem helpers shared by the persistence layers.

pub mod locking;

pub use locking::{read_json, read_json_or_quarantine, write_json};
