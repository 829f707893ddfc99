//! Pre- and post-migration validation.

pub mod finding;
pub mod validator;

pub use finding::{FindingStatus, Impact, ValidationFinding};
pub use validator::{MigrationValidator, ValidationConfig, ValidationReport};
