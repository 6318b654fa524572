//! Caching compiler-plugin engine.
//!
//! Packages register compiler plugins for file extensions or exact
//! filenames. Each build cycle routes source files to their plugin, runs
//! every plugin once per target architecture, and reuses earlier results
//! through an in-memory cache backed by a persistent, per-plugin disk scope.
//! Changing a plugin's own source discards its instance and its cache
//! scope together.

#![warn(missing_docs)]

pub mod arch;
pub mod artifact;
pub mod builtin;
pub mod classifier;
pub mod compiler;
pub mod coordinator;
pub mod debug;
pub mod error;
pub mod gate;
pub mod input;
pub mod instance;
pub mod lifecycle;
mod multi;
pub mod project;
pub mod registry;
mod single;

pub use arch::{Arch, ArchTag};
pub use artifact::{Artifact, AssetOutput, CompiledFile, StaticAsset};
pub use classifier::{Environments, FileRole, PackageManifest, PackageManifestBuilder};
pub use compiler::{Compiler, ImportResolver, MultiFileCompiler, SingleFileCompiler};
pub use coordinator::{
    BuildEngine, BuildTarget, CancelToken, CycleResult, CycleStatus, EngineOptions, TargetOutput,
};
pub use debug::{CacheEvent, DebugFilter, EventLog};
pub use error::{CompileError, PluginError};
pub use gate::CycleId;
pub use input::{FileSet, InputFile};
pub use lifecycle::{factory, CompilerFactory, PluginDefinition, PluginManager};
pub use project::{Project, ProjectError, Snapshot, KILN_VERSION};
pub use registry::{Handle, PluginKey, PluginRegistry};
