//! Parsing and validation of `kiln.toml` project configuration files.
//!
//! The configuration names the build targets (architectures), the cache
//! directory, which plugin families emit cache debug lines, the compiler
//! plugins each package defines, and the files each package declares as
//! sources or assets.

#![warn(missing_docs)]

pub mod error;
pub mod loader;
pub mod types;

pub use error::ConfigError;
pub use loader::{load_config, load_config_from_str, CONFIG_FILE};
pub use types::*;
