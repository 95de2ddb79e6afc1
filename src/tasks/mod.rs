//! Background maintenance.

mod cleanup;

pub use cleanup::CleanupTask;
