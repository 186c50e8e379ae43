//! Backend services consumed by the flow engine and the bridge.

pub mod booking;
pub mod catalog;
pub mod directory;
pub mod fuzzy;
pub mod info;
pub mod mock;
pub mod patient;
pub mod retry;
pub mod scenario;
pub mod speech;
pub mod stats;
pub mod types;

pub use catalog::ServiceCatalog;
pub use directory::{DirectoryApi, DirectoryClient};
pub use fuzzy::FuzzySearch;
pub use info::InfoBackend;
pub use speech::SpeechServices;
pub use stats::StatsWriter;
