//! Source loading: manifest parsing and the bounded reader pool

pub mod coordinator;
pub mod manifest;
pub mod worker;

pub use coordinator::SourceLoader;
pub use manifest::{RunManifest, read_completion_list};
