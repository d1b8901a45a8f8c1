//! Configuration for crmlink.

pub mod paths;
pub mod settings;

pub use paths::Paths;
pub use settings::{ArchiveConfig, Config, QueueConfig};
