//! The contract every compiler plugin satisfies.
//!
//! Plugins come in exactly two shapes. A [`SingleFileCompiler`] turns each
//! file into output on its own; a [`MultiFileCompiler`] compiles root files
//! that may read other files through an [`ImportResolver`]. The engine wraps
//! either shape in a caching layer, so plugins never see the cache.

use std::collections::{BTreeMap, BTreeSet};

use kiln_common::ContentHash;

use crate::arch::Arch;
use crate::artifact::Artifact;
use crate::error::CompileError;
use crate::input::{FileSet, InputFile};

/// A compiler that handles each file independently.
pub trait SingleFileCompiler: Send + Sync {
    /// Compiles one file for `arch`.
    fn compile(&self, file: &InputFile, arch: &Arch) -> Result<Artifact, CompileError>;

    /// Whether output is identical for every architecture. When `true`, one
    /// result is shared by all targets.
    fn architecture_independent(&self) -> bool {
        true
    }
}

/// A compiler whose roots may import other files.
pub trait MultiFileCompiler: Send + Sync {
    /// Whether `file` produces output of its own. Non-root files are only
    /// ever read as imports.
    fn is_root(&self, file: &InputFile) -> bool {
        let _ = file;
        true
    }

    /// Compiles a root. Every file read through `imports` becomes part of
    /// the root's dependency snapshot.
    fn compile(
        &self,
        root: &InputFile,
        imports: &mut ImportResolver<'_>,
        arch: &Arch,
    ) -> Result<Artifact, CompileError>;

    /// Whether output is identical for every architecture.
    fn architecture_independent(&self) -> bool {
        true
    }
}

/// A plugin's compiler, in one of the two supported shapes.
pub enum Compiler {
    /// Per-file compilation.
    Single(Box<dyn SingleFileCompiler>),
    /// Root compilation with tracked imports.
    Multi(Box<dyn MultiFileCompiler>),
}

impl Compiler {
    /// Whether the wrapped compiler shares output across architectures.
    pub fn declares_architecture_independence(&self) -> bool {
        match self {
            Compiler::Single(compiler) => compiler.architecture_independent(),
            Compiler::Multi(compiler) => compiler.architecture_independent(),
        }
    }
}

/// Gives a multi-file compiler access to sibling files and records what it
/// read.
pub struct ImportResolver<'a> {
    files: &'a FileSet,
    read: BTreeMap<String, ContentHash>,
    missing: BTreeSet<String>,
}

impl<'a> ImportResolver<'a> {
    /// Creates a resolver for compiling `root`; the root is always part of
    /// its own snapshot.
    pub fn new(files: &'a FileSet, root: &InputFile) -> Self {
        let mut read = BTreeMap::new();
        read.insert(root.path.clone(), root.fingerprint);
        Self {
            files,
            read,
            missing: BTreeSet::new(),
        }
    }

    /// Reads a file by project-relative path. Returns `None` if the file is
    /// not visible to this plugin.
    pub fn read(&mut self, path: &str) -> Option<&'a InputFile> {
        let Some(file) = self.files.get(path) else {
            self.missing.insert(path.to_string());
            return None;
        };
        self.read.insert(file.path.clone(), file.fingerprint);
        Some(file)
    }

    /// The files read so far with their fingerprints, and the paths that
    /// were asked for but absent, both in path order.
    pub fn into_parts(self) -> (Vec<(String, ContentHash)>, Vec<String>) {
        (
            self.read.into_iter().collect(),
            self.missing.into_iter().collect(),
        )
    }
}
