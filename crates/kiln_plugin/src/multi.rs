//! Caching wrapper around a [`MultiFileCompiler`].
//!
//! Entries are keyed by root path (plus architecture tag) rather than by
//! content, and each remembers the fingerprints of every file the root read
//! when it was compiled, along with imports it asked for that did not exist.
//! A root is reused only while that snapshot still matches the current files.
//! The same check applies to results still in flight, since two cycles can
//! see different contents for one root path.
//!
//! All persisted entries are loaded when the cache is created, before any of
//! them is validated, so a `Loaded` line can precede a fresh compile of the
//! same root.

use std::collections::HashMap;
use std::sync::Arc;

use kiln_cache::{CacheError, ScopedStore};
use kiln_common::{ContentHash, ContentHasher};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::arch::{Arch, ArchTag};
use crate::artifact::Artifact;
use crate::compiler::{ImportResolver, MultiFileCompiler};
use crate::debug::{CacheDebug, CacheEvent};
use crate::error::CompileError;
use crate::gate::{CycleId, InFlight};
use crate::input::{FileSet, InputFile};
use crate::single::Lookup;

type Key = (String, ArchTag);

/// The files a compile of one root observed.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct Snapshot {
    root_hash: ContentHash,
    dependencies: Vec<(String, ContentHash)>,
    missing: Vec<String>,
}

impl Snapshot {
    fn is_current(&self, root: &InputFile, files: &FileSet) -> bool {
        self.root_hash == root.fingerprint
            && self.dependencies.iter().all(|(path, hash)| {
                files.get(path).map(|file| file.fingerprint) == Some(*hash)
            })
            && self.missing.iter().all(|path| files.get(path).is_none())
    }
}

/// A committed root.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct RootEntry {
    snapshot: Snapshot,
    artifact: Arc<Artifact>,
}

/// One compile of a root within a cycle, successful or not.
#[derive(Debug)]
struct Attempt {
    snapshot: Snapshot,
    result: Result<Arc<Artifact>, CompileError>,
}

#[derive(Serialize, Deserialize)]
struct StoredRoot {
    path: String,
    tag: ArchTag,
    entry: RootEntry,
}

pub(crate) struct MultiFileCache {
    compiler: Box<dyn MultiFileCompiler>,
    independent: bool,
    memory: RwLock<HashMap<Key, Arc<RootEntry>>>,
    pending: InFlight<Key, Arc<Attempt>>,
    disk: ScopedStore,
}

impl MultiFileCache {
    /// Creates the cache and loads every persisted root.
    pub(crate) fn new(
        compiler: Box<dyn MultiFileCompiler>,
        family: &str,
        disk: ScopedStore,
        debug: &CacheDebug,
    ) -> Self {
        let mut loaded: Vec<StoredRoot> = disk
            .keys()
            .iter()
            .filter_map(|key| disk.read::<StoredRoot>(key))
            .collect();
        loaded.sort_by(|a, b| (&a.path, &a.tag).cmp(&(&b.path, &b.tag)));

        let mut memory = HashMap::with_capacity(loaded.len());
        for stored in loaded {
            debug.emit(CacheEvent::Loaded {
                family: family.to_string(),
                path: stored.path.clone(),
            });
            memory.insert((stored.path, stored.tag), Arc::new(stored.entry));
        }

        Self {
            independent: compiler.architecture_independent(),
            compiler,
            memory: RwLock::new(memory),
            pending: InFlight::new(),
            disk,
        }
    }

    pub(crate) fn architecture_independent(&self) -> bool {
        self.independent
    }

    pub(crate) fn is_root(&self, file: &InputFile) -> bool {
        self.compiler.is_root(file)
    }

    /// Returns the result for root `file`, recompiling it if it or any
    /// recorded dependency changed.
    pub(crate) fn process(
        &self,
        cycle: CycleId,
        file: &InputFile,
        files: &FileSet,
        arch: &Arch,
    ) -> Lookup {
        let key = (file.path.clone(), ArchTag::for_arch(arch, self.independent));
        if let Some(entry) = self.memory.read().get(&key) {
            if entry.snapshot.is_current(file, files) {
                return Lookup::Cached(Arc::clone(&entry.artifact));
            }
        }
        let (attempt, ran) = self.pending.get_or_run_if(
            cycle,
            key,
            |attempt| attempt.snapshot.is_current(file, files),
            || Arc::new(self.compile(file, files, arch)),
        );
        let result = attempt.result.clone();
        if ran {
            Lookup::Compiled(result)
        } else {
            Lookup::Shared(result)
        }
    }

    fn compile(&self, file: &InputFile, files: &FileSet, arch: &Arch) -> Attempt {
        let mut imports = ImportResolver::new(files, file);
        let result = self.compiler.compile(file, &mut imports, arch).map(Arc::new);
        let (dependencies, missing) = imports.into_parts();
        Attempt {
            snapshot: Snapshot {
                root_hash: file.fingerprint,
                dependencies,
                missing,
            },
            result,
        }
    }

    /// Files other than `path` itself that the root read at its last
    /// successful compile.
    pub(crate) fn imports_of(&self, path: &str) -> Option<Vec<String>> {
        let memory = self.memory.read();
        let entry = memory
            .iter()
            .find(|((root, _), _)| root == path)
            .map(|(_, entry)| entry)?;
        Some(
            entry
                .snapshot
                .dependencies
                .iter()
                .filter(|(dep, _)| dep != path)
                .map(|(dep, _)| dep.clone())
                .collect(),
        )
    }

    /// Moves the successful compiles `cycle` obtained into memory and onto
    /// disk. A failed root keeps its previous entry and is retried next
    /// cycle.
    pub(crate) fn commit(&self, cycle: CycleId) -> Vec<CacheError> {
        let mut failures = Vec::new();
        for ((path, tag), attempt) in self.pending.finish(cycle) {
            let Ok(artifact) = &attempt.result else {
                continue;
            };
            let entry = RootEntry {
                snapshot: attempt.snapshot.clone(),
                artifact: Arc::clone(artifact),
            };
            let stored = StoredRoot {
                path: path.clone(),
                tag: tag.clone(),
                entry,
            };
            if let Err(e) = self.disk.write(&disk_key(&path, &tag), &stored) {
                failures.push(e);
            }
            self.memory.write().insert((path, tag), Arc::new(stored.entry));
        }
        failures
    }

    /// Discards what `cycle` obtained.
    pub(crate) fn abandon(&self, cycle: CycleId) {
        self.pending.discard(cycle);
    }
}

fn disk_key(path: &str, tag: &ArchTag) -> String {
    ContentHasher::new()
        .update_str(path)
        .update_str(&tag.to_string())
        .finish()
        .to_string()
}
