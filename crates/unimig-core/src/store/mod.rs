//! Persistent storage: key helpers and the sled-backed EAV target.

pub mod key;
pub mod sled_target;

pub use key::{current_timestamp, MigrationId};
pub use sled_target::SledTarget;
