//! Caching wrapper around a [`SingleFileCompiler`].
//!
//! Entries are keyed by the file fingerprint plus the architecture tag. The
//! committed tier is an in-memory map backed by the plugin's disk scope;
//! disk entries are read lazily on a memory miss. Results compiled during a
//! cycle live in the in-flight map until the cycle commits.

use std::collections::HashMap;
use std::sync::Arc;

use kiln_cache::{CacheError, ScopedStore};
use kiln_common::{ContentHash, ContentHasher};
use parking_lot::RwLock;

use crate::arch::{Arch, ArchTag};
use crate::artifact::Artifact;
use crate::compiler::SingleFileCompiler;
use crate::debug::{CacheDebug, CacheEvent};
use crate::error::CompileError;
use crate::gate::{CycleId, InFlight};
use crate::input::InputFile;

type Key = (ContentHash, ArchTag);

#[derive(Clone)]
enum Produced {
    Loaded(Arc<Artifact>),
    Compiled(Result<Arc<Artifact>, CompileError>),
}

/// How a file's result was obtained.
#[derive(Clone, Debug)]
pub enum Lookup {
    /// Served from memory or disk.
    Cached(Arc<Artifact>),
    /// Compiled by this caller.
    Compiled(Result<Arc<Artifact>, CompileError>),
    /// Compiled earlier in this cycle, possibly by another target.
    Shared(Result<Arc<Artifact>, CompileError>),
}

impl Lookup {
    /// The result, however it was obtained.
    pub fn into_result(self) -> Result<Arc<Artifact>, CompileError> {
        match self {
            Lookup::Cached(artifact) => Ok(artifact),
            Lookup::Compiled(result) | Lookup::Shared(result) => result,
        }
    }

    /// Returns `true` if this caller ran the compiler.
    pub fn was_compiled(&self) -> bool {
        matches!(self, Lookup::Compiled(_))
    }
}

pub(crate) struct SingleFileCache {
    compiler: Box<dyn SingleFileCompiler>,
    independent: bool,
    family: String,
    memory: RwLock<HashMap<Key, Arc<Artifact>>>,
    pending: InFlight<Key, Produced>,
    disk: ScopedStore,
    debug: CacheDebug,
}

impl SingleFileCache {
    pub(crate) fn new(
        compiler: Box<dyn SingleFileCompiler>,
        family: &str,
        disk: ScopedStore,
        debug: CacheDebug,
    ) -> Self {
        Self {
            independent: compiler.architecture_independent(),
            compiler,
            family: family.to_string(),
            memory: RwLock::new(HashMap::new()),
            pending: InFlight::new(),
            disk,
            debug,
        }
    }

    pub(crate) fn architecture_independent(&self) -> bool {
        self.independent
    }

    /// Returns the result for `file` on `arch`, compiling at most once per
    /// key while the result is in flight.
    pub(crate) fn process(&self, cycle: CycleId, file: &InputFile, arch: &Arch) -> Lookup {
        let key = (file.fingerprint, ArchTag::for_arch(arch, self.independent));
        if let Some(artifact) = self.memory.read().get(&key) {
            return Lookup::Cached(Arc::clone(artifact));
        }
        let (produced, ran) = self
            .pending
            .get_or_run(cycle, key.clone(), || self.load_or_compile(file, arch, &key));
        match produced {
            Produced::Loaded(artifact) => Lookup::Cached(artifact),
            Produced::Compiled(result) if ran => Lookup::Compiled(result),
            Produced::Compiled(result) => Lookup::Shared(result),
        }
    }

    fn load_or_compile(&self, file: &InputFile, arch: &Arch, key: &Key) -> Produced {
        if let Some(artifact) = self.disk.read::<Artifact>(&disk_key(key)) {
            self.debug.emit(CacheEvent::Loaded {
                family: self.family.clone(),
                path: file.path.clone(),
            });
            let artifact = Arc::new(artifact);
            self.memory.write().insert(key.clone(), Arc::clone(&artifact));
            return Produced::Loaded(artifact);
        }
        Produced::Compiled(self.compiler.compile(file, arch).map(Arc::new))
    }

    /// Moves the successful compiles `cycle` obtained into memory and onto
    /// disk. Failed compiles are dropped so the next cycle retries them.
    pub(crate) fn commit(&self, cycle: CycleId) -> Vec<CacheError> {
        let mut failures = Vec::new();
        for (key, produced) in self.pending.finish(cycle) {
            let Produced::Compiled(Ok(artifact)) = produced else {
                continue;
            };
            if let Err(e) = self.disk.write(&disk_key(&key), &*artifact) {
                failures.push(e);
            }
            self.memory.write().insert(key, artifact);
        }
        failures
    }

    /// Discards what `cycle` obtained.
    pub(crate) fn abandon(&self, cycle: CycleId) {
        self.pending.discard(cycle);
    }

    #[cfg(test)]
    pub(crate) fn memory_len(&self) -> usize {
        self.memory.read().len()
    }
}

fn disk_key((fingerprint, tag): &Key) -> String {
    ContentHasher::new()
        .update_hash(fingerprint)
        .update_str(&tag.to_string())
        .finish()
        .to_string()
}
