//! Registry of supervised jobs, keyed by resource name.
//!
//! At most one non-terminal job exists per resource ("update",
//! "download", ...). Different resources run concurrently. Finished jobs
//! stay visible for late observers until replaced or until their
//! retention window lapses with nobody watching.

pub mod error;
pub mod registry;

pub use error::JobsError;
pub use registry::{JobRegistry, RegistryConfig};
