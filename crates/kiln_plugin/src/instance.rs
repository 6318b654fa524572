//! A live plugin: its compiler wrapped in the matching caching layer.

use std::sync::atomic::{AtomicU64, Ordering};

use kiln_cache::{CacheError, CacheStore};
use kiln_common::{ContentHash, PluginIdentity};
use rayon::prelude::*;

use crate::arch::Arch;
use crate::artifact::CompiledFile;
use crate::compiler::Compiler;
use crate::coordinator::CancelToken;
use crate::debug::{CacheDebug, CacheEvent};
use crate::error::CompileError;
use crate::gate::CycleId;
use crate::input::{FileSet, InputFile};
use crate::lifecycle::PluginDefinition;
use crate::multi::MultiFileCache;
use crate::registry::PluginKey;
use crate::single::{Lookup, SingleFileCache};

enum CachingCompiler {
    Single(SingleFileCache),
    Multi(MultiFileCache),
}

/// What one batch produced for one target.
#[derive(Debug, Default)]
pub struct BatchOutput {
    /// Successful outputs, in path order.
    pub compiled: Vec<CompiledFile>,
    /// Per-file failures, in path order.
    pub errors: Vec<CompileError>,
    /// Files this batch actually compiled, sorted.
    pub ran_on: Vec<String>,
}

/// One instantiation of a compiler plugin.
///
/// An instance lives as long as its defining source is unchanged. It owns
/// the in-memory cache and the disk scope named after its identity and
/// source fingerprint, and it counts the batches it has processed starting
/// from 1.
pub struct PluginInstance {
    key: PluginKey,
    identity: PluginIdentity,
    source_hash: ContentHash,
    invocations: AtomicU64,
    compiler: CachingCompiler,
    debug: CacheDebug,
}

impl PluginInstance {
    pub(crate) fn new(
        definition: &PluginDefinition,
        compiler: Compiler,
        store: &CacheStore,
        debug: CacheDebug,
    ) -> Self {
        let family = definition.family.as_str();
        let disk = store.scope(family, &definition.identity, definition.source_hash);
        let compiler = match compiler {
            Compiler::Single(inner) => CachingCompiler::Single(SingleFileCache::new(
                inner,
                family,
                disk,
                debug.clone(),
            )),
            Compiler::Multi(inner) => {
                CachingCompiler::Multi(MultiFileCache::new(inner, family, disk, &debug))
            }
        };
        Self {
            key: definition.key(),
            identity: definition.identity.clone(),
            source_hash: definition.source_hash,
            invocations: AtomicU64::new(0),
            compiler,
            debug,
        }
    }

    /// The plugin this instance belongs to.
    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    /// Debug family.
    pub fn family(&self) -> &str {
        &self.key.family
    }

    /// Identity of the defining package.
    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    /// Fingerprint of the defining source.
    pub fn source_hash(&self) -> ContentHash {
        self.source_hash
    }

    /// Number of batches processed so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }

    /// Whether one result serves every architecture.
    pub fn declares_architecture_independence(&self) -> bool {
        match &self.compiler {
            CachingCompiler::Single(cache) => cache.architecture_independent(),
            CachingCompiler::Multi(cache) => cache.architecture_independent(),
        }
    }

    /// Files a root read at its last successful compile, excluding itself.
    /// Always `None` for single-file plugins.
    pub fn imports_of(&self, path: &str) -> Option<Vec<String>> {
        match &self.compiler {
            CachingCompiler::Single(_) => None,
            CachingCompiler::Multi(cache) => cache.imports_of(path),
        }
    }

    /// Compiles or reuses every file in `files` for `arch`.
    ///
    /// Files run in parallel. Each batch counts as one invocation and emits
    /// one `Ran` event listing the files it compiled, which may be none.
    /// Once `cancel` fires, files not yet started are skipped. Results are
    /// held for `cycle` until it commits or is abandoned.
    pub fn process_batch(
        &self,
        cycle: CycleId,
        files: &FileSet,
        arch: &Arch,
        cancel: &CancelToken,
    ) -> BatchOutput {
        let invocation = self.invocations.fetch_add(1, Ordering::SeqCst) + 1;
        let candidates: Vec<&InputFile> = files.iter().filter(|f| self.is_root(f)).collect();

        let lookups: Vec<(&InputFile, Option<Lookup>)> = candidates
            .par_iter()
            .map(|file| {
                if cancel.is_cancelled() {
                    return (*file, None);
                }
                (*file, Some(self.lookup(cycle, file, files, arch)))
            })
            .collect();

        let mut output = BatchOutput::default();
        for (file, lookup) in lookups {
            let Some(lookup) = lookup else {
                continue;
            };
            if lookup.was_compiled() {
                output.ran_on.push(file.path.clone());
            }
            // A shared failure was already reported by the batch that ran it.
            let shared = matches!(lookup, Lookup::Shared(_));
            match lookup.into_result() {
                Ok(artifact) => output.compiled.push(CompiledFile {
                    path: file.path.clone(),
                    package: file.package.clone(),
                    artifact,
                }),
                Err(err) if !shared => output.errors.push(err),
                Err(_) => {}
            }
        }

        self.debug.emit(CacheEvent::Ran {
            family: self.key.family.clone(),
            invocation,
            files: output.ran_on.clone(),
            arch: arch.clone(),
        });
        output
    }

    fn is_root(&self, file: &InputFile) -> bool {
        match &self.compiler {
            CachingCompiler::Single(_) => true,
            CachingCompiler::Multi(cache) => cache.is_root(file),
        }
    }

    fn lookup(&self, cycle: CycleId, file: &InputFile, files: &FileSet, arch: &Arch) -> Lookup {
        match &self.compiler {
            CachingCompiler::Single(cache) => cache.process(cycle, file, arch),
            CachingCompiler::Multi(cache) => cache.process(cycle, file, files, arch),
        }
    }

    /// Commits what `cycle` compiled to memory and disk. Disk failures are
    /// returned; they never undo the in-memory commit.
    pub(crate) fn commit_cycle(&self, cycle: CycleId) -> Vec<CacheError> {
        match &self.compiler {
            CachingCompiler::Single(cache) => cache.commit(cycle),
            CachingCompiler::Multi(cache) => cache.commit(cycle),
        }
    }

    /// Drops what `cycle` compiled. Results another cycle shares survive.
    pub(crate) fn abandon_cycle(&self, cycle: CycleId) {
        match &self.compiler {
            CachingCompiler::Single(cache) => cache.abandon(cycle),
            CachingCompiler::Multi(cache) => cache.abandon(cycle),
        }
    }
}
