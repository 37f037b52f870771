// Public modules
pub mod bundle;
pub mod cli_version;
pub mod context;
pub mod defaults;
pub mod docs;
pub mod env;
pub mod error;
pub mod executor;
pub mod installer;
pub mod settings;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use context::CommandContext;
pub use error::{Error, ErrorCode, Result};
